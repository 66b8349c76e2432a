//! Title-prefix index bounding fuzzy comparison during corpus re-scans.
//!
//! Records are bucketed by the first significant word of their normalized
//! title; a record is only compared against its own bucket.

use std::collections::HashMap;
use uuid::Uuid;

use super::similarity::normalize_for_match;

const SKIP_WORDS: &[&str] = &["a", "an", "the", "new"];

/// Bucket key for a title, or `None` for titles with no usable word.
pub fn title_prefix(title: &str) -> Option<String> {
    normalize_for_match(title)
        .split(' ')
        .find(|w| {
            !w.is_empty() && !SKIP_WORDS.contains(w) && !w.chars().all(|c| c.is_ascii_digit())
        })
        .map(str::to_string)
}

#[derive(Debug, Default)]
pub struct TitlePrefixIndex {
    buckets: HashMap<String, Vec<Uuid>>,
    len: usize,
}

impl TitlePrefixIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Uuid, title: &str) {
        if let Some(k) = title_prefix(title) {
            self.buckets.entry(k).or_default().push(id);
            self.len += 1;
        }
    }

    /// Ids sharing the title's bucket, in insertion order.
    pub fn candidates(&self, title: &str) -> &[Uuid] {
        title_prefix(title)
            .and_then(|k| self.buckets.get(&k))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_skips_articles() {
        assert_eq!(title_prefix("The Sculpture Prize").as_deref(), Some("sculpture"));
        assert_eq!(title_prefix("  ...  ").as_deref(), None);
    }

    #[test]
    fn only_same_bucket_is_returned() {
        let mut idx = TitlePrefixIndex::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        idx.insert(a, "Residency in Oslo");
        idx.insert(b, "residency: Bergen");
        idx.insert(c, "Mural commission");
        assert_eq!(idx.candidates("Residency for painters"), &[a, b]);
        assert_eq!(idx.candidates("Photography award"), &[] as &[Uuid]);
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.bucket_count(), 2);
    }
}
