//! Device-code prompt capture.
//!
//! The game client prints its authentication prompt as a plain diagnostic
//! line, e.g.
//!
//! ```text
//! To sign in, use a web browser to open the page https://www.microsoft.com/link and use the code FJ2KXQ8Z to authenticate.
//! ```
//!
//! [`AuthCapture`] sits between the client and its real diagnostic sink,
//! looks at every complete line, and turns the prompt into an
//! [`AuthChallenge`] for the session manager. All other output passes
//! through unchanged, except for a couple of known-noisy warnings that are
//! dropped.

use std::io::{self, Write};
use std::sync::OnceLock;

use regex::Regex;
use tokio::sync::mpsc;
use vigil_protocol::AuthChallenge;

/// Substrings of diagnostic lines that are swallowed.
const NOISE: &[&str] = &["partial packet", "Ignoring block entities"];

/// Longest run without a newline that is held back; anything longer is
/// examined and passed on as if it were a complete line.
pub const MAX_PENDING_LINE: usize = 8 * 1024;

/// A challenge scraped from a client's diagnostics, tagged with that
/// client's generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedChallenge {
    pub generation: u64,
    pub challenge: AuthChallenge,
}

fn url_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"https?://[^\s<>]+").expect("url regex must compile")
    })
}

fn code_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)\bcode\s+([A-Za-z0-9]+)").expect("code regex must compile")
    })
}

/// Extracts a device-code challenge from one diagnostic line.
///
/// Needs both a URL and `code <ALNUM>` on the same line. The returned URL
/// has the code appended as an `otc` query parameter.
pub fn parse_challenge(line: &str) -> Option<AuthChallenge> {
    let url = url_regex()
        .find(line)?
        .as_str()
        .trim_end_matches(['.', ',', ';', ')', '"', '\'']);
    let code = code_regex().captures(line)?.get(1)?.as_str();

    let separator = if url.contains('?') { '&' } else { '?' };
    Some(AuthChallenge {
        url: format!("{url}{separator}otc={code}"),
        code: code.to_owned(),
    })
}

fn is_noise(line: &str) -> bool {
    NOISE.iter().any(|pattern| line.contains(pattern))
}

/// A line-buffered writer that scrapes device-code prompts.
///
/// Bytes are held until a newline arrives or [`MAX_PENDING_LINE`] is
/// reached; a trailing partial line is examined when the writer is dropped.
pub struct AuthCapture<W: Write> {
    inner: W,
    pending: Vec<u8>,
    generation: u64,
    challenges: mpsc::UnboundedSender<CapturedChallenge>,
}

impl<W: Write> AuthCapture<W> {
    pub fn new(
        inner: W,
        generation: u64,
        challenges: mpsc::UnboundedSender<CapturedChallenge>,
    ) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            generation,
            challenges,
        }
    }

    fn process_line(&mut self, line: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(line);
        if is_noise(&text) {
            tracing::trace!(line = %text.trim_end(), "suppressed client diagnostic");
            return Ok(());
        }
        self.inner.write_all(line)?;
        if let Some(challenge) = parse_challenge(&text) {
            tracing::info!(
                generation = self.generation,
                code = %challenge.code,
                "device-code authentication prompt captured"
            );
            let _ = self.challenges.send(CapturedChallenge {
                generation: self.generation,
                challenge,
            });
        }
        Ok(())
    }

    /// Runs `pending + chunk` through [`process_line`](Self::process_line).
    /// On failure `pending` is left as it was, so none of `chunk` counts as
    /// written.
    fn process_with_pending(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut line = std::mem::take(&mut self.pending);
        let held = line.len();
        line.extend_from_slice(chunk);
        if let Err(e) = self.process_line(&line) {
            line.truncate(held);
            self.pending = line;
            return Err(e);
        }
        Ok(())
    }
}

impl<W: Write> Write for AuthCapture<W> {
    /// Consumes at most one line per call and reports only what was
    /// handled, so a retried write never repeats output.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match buf.iter().position(|&b| b == b'\n') {
            Some(end) => {
                self.process_with_pending(&buf[..=end])?;
                Ok(end + 1)
            }
            None if self.pending.len() + buf.len() >= MAX_PENDING_LINE => {
                self.process_with_pending(buf)?;
                Ok(buf.len())
            }
            None => {
                self.pending.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Drop for AuthCapture<W> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let rest = std::mem::take(&mut self.pending);
        if self.process_line(&rest).and_then(|()| self.inner.flush()).is_err() {
            tracing::debug!("failed to flush trailing client diagnostics");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// A `Write` that appends into shared memory so tests can inspect it
    /// after the capture is dropped.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture() -> (
        AuthCapture<SharedSink>,
        SharedSink,
        mpsc::UnboundedReceiver<CapturedChallenge>,
    ) {
        let sink = SharedSink::default();
        let (tx, rx) = mpsc::unbounded_channel();
        (AuthCapture::new(sink.clone(), 3, tx), sink, rx)
    }

    #[test]
    fn test_parse_challenge_appends_otc_query() {
        let ch = parse_challenge(
            "open https://www.microsoft.com/link and use the code ABC123 to sign in",
        )
        .unwrap();
        assert_eq!(ch.url, "https://www.microsoft.com/link?otc=ABC123");
        assert_eq!(ch.code, "ABC123");
    }

    #[test]
    fn test_parse_challenge_extends_existing_query() {
        let ch = parse_challenge("visit https://example.com/device?lang=en, code ABC123")
            .unwrap();
        assert_eq!(ch.url, "https://example.com/device?lang=en&otc=ABC123");
    }

    #[test]
    fn test_parse_challenge_trims_sentence_punctuation() {
        let ch = parse_challenge("Code XY9 at http://auth.example/link.").unwrap();
        assert_eq!(ch.url, "http://auth.example/link?otc=XY9");
    }

    #[test]
    fn test_parse_challenge_needs_url_and_code() {
        assert!(parse_challenge("use the code ABC123").is_none());
        assert!(parse_challenge("see https://example.com for help").is_none());
    }

    #[test]
    fn test_capture_sends_challenge_and_passes_line_through() {
        let (mut cap, sink, mut rx) = capture();
        let line = "[msa] open https://www.microsoft.com/link and use the code ABC123\n";
        cap.write_all(line.as_bytes()).unwrap();

        let got = rx.try_recv().unwrap();
        assert_eq!(got.generation, 3);
        assert_eq!(got.challenge.code, "ABC123");
        assert_eq!(sink.contents(), line);
    }

    #[test]
    fn test_capture_buffers_partial_lines() {
        let (mut cap, sink, mut rx) = capture();
        cap.write_all(b"open https://www.microsoft.com/link and use ").unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(sink.contents(), "");

        cap.write_all(b"the code ZZ42\nnext").unwrap();
        assert_eq!(rx.try_recv().unwrap().challenge.code, "ZZ42");
        assert!(sink.contents().ends_with("ZZ42\n"));

        drop(cap);
        assert!(sink.contents().ends_with("\nnext"));
    }

    #[test]
    fn test_capture_swallows_noise() {
        let (mut cap, sink, _rx) = capture();
        let written = cap
            .write(b"Chunk size is 42 but only 7 was read ; partial packet\n")
            .unwrap();
        assert_eq!(written, 54);
        cap.write_all(b"Ignoring block entities as chunk failed to load\n")
            .unwrap();
        cap.write_all(b"keep me\n").unwrap();

        assert_eq!(sink.contents(), "keep me\n");
    }

    /// Fails exactly one `write`, after `ok_before_failure` successful ones.
    struct FlakySink {
        out: SharedSink,
        ok_before_failure: usize,
        failed: bool,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.failed && self.ok_before_failure == 0 {
                self.failed = true;
                return Err(io::Error::other("sink busy"));
            }
            self.ok_before_failure = self.ok_before_failure.saturating_sub(1);
            self.out.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_retry_after_sink_failure_does_not_repeat_lines() {
        let out = SharedSink::default();
        let sink = FlakySink {
            out: out.clone(),
            ok_before_failure: 1,
            failed: false,
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut cap = AuthCapture::new(sink, 1, tx);

        let mut rest: &[u8] = b"first\nsecond\n";
        let mut failures = 0;
        while !rest.is_empty() {
            match cap.write(rest) {
                Ok(n) => rest = &rest[n..],
                Err(_) => failures += 1,
            }
        }
        assert_eq!(failures, 1);
        assert_eq!(out.contents(), "first\nsecond\n");
    }

    #[test]
    fn test_write_failure_keeps_partial_line_pending() {
        let out = SharedSink::default();
        let sink = FlakySink {
            out: out.clone(),
            ok_before_failure: 0,
            failed: false,
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut cap = AuthCapture::new(sink, 1, tx);

        cap.write_all(b"hel").unwrap();
        let err = cap.write(b"lo\n").unwrap_err();
        assert_eq!(err.to_string(), "sink busy");
        assert_eq!(cap.write(b"lo\n").unwrap(), 3);
        assert_eq!(out.contents(), "hello\n");
    }

    #[test]
    fn test_write_passes_long_unterminated_output_through() {
        let (mut cap, sink, _rx) = capture();
        let blob = vec![b'x'; MAX_PENDING_LINE + 10];
        cap.write_all(&blob).unwrap();

        assert_eq!(sink.contents().len(), blob.len());
        assert!(cap.pending.is_empty());
    }

    #[test]
    fn test_capture_passes_ordinary_output_unchanged() {
        let (mut cap, sink, mut rx) = capture();
        cap.write_all(b"one\ntwo\r\nthree\n").unwrap();
        assert_eq!(sink.contents(), "one\ntwo\r\nthree\n");
        assert!(rx.try_recv().is_err());
    }
}
