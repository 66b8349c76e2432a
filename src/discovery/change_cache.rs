//! Last-seen content fingerprints for polling sources.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

fn fingerprint(content: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(content.as_bytes()));
    out
}

/// Keyed by `source` + `url`; each key is updated atomically.
#[derive(Debug, Default)]
pub struct ChangeCache {
    seen: RwLock<HashMap<String, [u8; 32]>>,
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(source: &str, url: &str) -> String {
        format!("{source}\u{1f}{url}")
    }

    /// Store the fingerprint and report whether it differs from the previous one.
    /// First sight of a key counts as changed.
    pub fn has_changed(&self, source: &str, url: &str, content: &str) -> bool {
        let fp = fingerprint(content);
        let mut m = self.seen.write().unwrap_or_else(PoisonError::into_inner);
        match m.insert(Self::key(source, url), fp) {
            Some(prev) => prev != fp,
            None => true,
        }
    }

    pub fn forget(&self, source: &str, url: &str) {
        self.seen
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Self::key(source, url));
    }

    pub fn len(&self) -> usize {
        self.seen.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
