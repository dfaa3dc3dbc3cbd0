//! Error types for the safety layer.

/// Errors building [`TrustLists`](crate::TrustLists).
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    /// The same name appears in both lists. Trusted and blocked must be
    /// disjoint; there is no sensible precedence between them.
    #[error("player '{0}' is listed as both trusted and blocked")]
    Overlap(String),
}
