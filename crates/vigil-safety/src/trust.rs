//! Trusted and blocked player names.

use std::collections::HashSet;

use crate::TrustError;

/// Two disjoint sets of player names.
///
/// Trusted players are never threats. Blocked players are flagged in alerts
/// but otherwise treated like any other stranger. Matching is exact and
/// case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustLists {
    trusted: HashSet<String>,
    blocked: HashSet<String>,
}

impl TrustLists {
    /// Builds the lists, refusing any name that appears in both.
    pub fn new<T, B>(trusted: T, blocked: B) -> Result<Self, TrustError>
    where
        T: IntoIterator,
        T::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        let trusted: HashSet<String> =
            trusted.into_iter().map(Into::into).collect();
        let blocked: HashSet<String> =
            blocked.into_iter().map(Into::into).collect();

        // Report the smallest offending name so the error is stable.
        if let Some(name) = trusted.intersection(&blocked).min() {
            return Err(TrustError::Overlap(name.clone()));
        }

        Ok(Self { trusted, blocked })
    }

    /// Builds the lists from comma-separated input, as found in the
    /// environment.
    pub fn from_csv(trusted: &str, blocked: &str) -> Result<Self, TrustError> {
        Self::new(parse_csv(trusted), parse_csv(blocked))
    }

    pub fn is_trusted(&self, name: &str) -> bool {
        self.trusted.contains(name)
    }

    pub fn is_blocked(&self, name: &str) -> bool {
        self.blocked.contains(name)
    }

    pub fn trusted_count(&self) -> usize {
        self.trusted.len()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }
}

/// Splits on commas, trims each entry, and drops empties.
pub(crate) fn parse_csv(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_csv_trims_and_drops_empties() {
        let lists = TrustLists::from_csv(" alice, bob ,,", "mallory").unwrap();
        assert!(lists.is_trusted("alice"));
        assert!(lists.is_trusted("bob"));
        assert_eq!(lists.trusted_count(), 2);
        assert!(lists.is_blocked("mallory"));
        assert_eq!(lists.blocked_count(), 1);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let lists = TrustLists::from_csv("Alice", "").unwrap();
        assert!(lists.is_trusted("Alice"));
        assert!(!lists.is_trusted("alice"));
    }

    #[test]
    fn test_new_rejects_overlap() {
        let err = TrustLists::new(["zed", "amy"], ["zed", "amy", "eve"])
            .unwrap_err();
        assert_eq!(err, TrustError::Overlap("amy".into()));
    }

    #[test]
    fn test_default_is_empty() {
        let lists = TrustLists::default();
        assert!(!lists.is_trusted("anyone"));
        assert!(!lists.is_blocked("anyone"));
    }
}
