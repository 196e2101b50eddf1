//! Configuration change token (the config ETag).
//!
//! The token is an opaque quoted string that changes on every bump. It is a
//! SHA-256 over a per-process random seed and a counter, so tokens from an
//! earlier process never match the current one.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct ChangeToken {
    seed: [u8; 16],
    counter: u64,
    current: String,
    /// Bumps are collected instead of applied while held.
    held: bool,
    pending: bool,
}

impl ChangeToken {
    pub fn new() -> Self {
        let mut token = Self {
            seed: rand::random(),
            counter: 0,
            current: String::new(),
            held: false,
            pending: false,
        };
        token.current = token.render();
        token
    }

    /// Current token, including the surrounding quotes.
    pub fn current(&self) -> &str {
        &self.current
    }

    /// True if a client-supplied `If-None-Match` value names the current token.
    ///
    /// Accepts `*`, comma separated lists and weak tags (`W/"..."`), which
    /// compare like strong ones.
    pub fn matches(&self, candidate: &str) -> bool {
        candidate.split(',').map(str::trim).any(|tag| {
            tag == "*" || tag.strip_prefix("W/").unwrap_or(tag) == self.current
        })
    }

    pub fn bump(&mut self) {
        if self.held {
            self.pending = true;
            return;
        }
        self.counter += 1;
        self.current = self.render();
        tracing::debug!(token = %self.current, "config change token updated");
    }

    /// Collects bumps until [`ChangeToken::release`].
    pub fn hold(&mut self) {
        self.held = true;
    }

    /// Applies every bump collected since [`ChangeToken::hold`] as one.
    pub fn release(&mut self) {
        self.held = false;
        if std::mem::take(&mut self.pending) {
            self.bump();
        }
    }

    fn render(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.seed);
        hasher.update(self.counter.to_be_bytes());
        let digest = hasher.finalize();
        format!("\"{}\"", hex::encode(&digest[..16]))
    }
}

impl Default for ChangeToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_bump_yields_a_new_token() {
        let mut token = ChangeToken::new();
        let first = token.current().to_string();
        token.bump();
        let second = token.current().to_string();
        token.bump();

        assert_ne!(first, second);
        assert_ne!(second, token.current());
        assert!(!token.matches(&first));
        assert!(token.matches(token.current()));
    }

    #[test]
    fn tokens_are_quoted_hex() {
        let token = ChangeToken::new();
        let raw = token.current();
        assert!(raw.starts_with('"') && raw.ends_with('"'));
        assert_eq!(raw.len(), 34);
    }

    #[test]
    fn if_none_match_lists_weak_tags_and_wildcard() {
        let token = ChangeToken::new();
        let current = token.current();

        assert!(token.matches(&format!("\"stale\", {current}")));
        assert!(token.matches(&format!("W/{current}")));
        assert!(token.matches(&format!(" \"a\" ,W/{current} ")));
        assert!(token.matches("*"));
        assert!(!token.matches("\"stale\", W/\"other\""));
        assert!(!token.matches(""));
    }

    #[test]
    fn held_bumps_are_applied_as_one() {
        let mut token = ChangeToken::new();
        let mut single = token.clone();
        single.bump();

        token.hold();
        token.bump();
        token.bump();
        assert_ne!(token.current(), single.current());

        token.release();
        assert_eq!(token.current(), single.current());

        token.hold();
        token.release();
        assert_eq!(token.current(), single.current());
    }

    #[test]
    fn separate_processes_do_not_share_tokens() {
        assert_ne!(ChangeToken::new().current(), ChangeToken::new().current());
    }
}
