//! Template hashing for change-set naming.
//!
//! Change-set names embed a short digest of the template body so a change set
//! left on the backend can be traced back to the template that produced it.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::template::Template;

/// Length of the digest prefix used in names.
const SHORT_HASH_LEN: usize = 8;

/// Prefix of every change set Kiln creates.
pub const CHANGE_SET_PREFIX: &str = "kiln";

/// Hasher for template bodies.
#[derive(Debug, Default)]
pub struct TemplateHasher;

impl TemplateHasher {
    /// Creates a new template hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the SHA-256 digest of a template body as hex.
    #[must_use]
    pub fn hash_template(&self, template: &Template) -> String {
        let mut hasher = Sha256::new();
        hasher.update(template.body().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns a short version of a hash.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(SHORT_HASH_LEN).collect()
    }

    /// Builds a change-set name such as `kiln-20260101T120000-1a2b3c4d`.
    ///
    /// The result satisfies the backend naming rule: starts with a letter,
    /// letters, digits and hyphens only.
    #[must_use]
    pub fn change_set_name(&self, template: &Template, at: DateTime<Utc>) -> String {
        let hash = self.hash_template(template);
        format!(
            "{CHANGE_SET_PREFIX}-{}-{}",
            at.format("%Y%m%dT%H%M%S"),
            self.short_hash(&hash)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hash_deterministic() {
        let hasher = TemplateHasher::new();
        let a = Template::inline("Resources: {}");
        let b = Template::inline("Resources: {}");
        assert_eq!(hasher.hash_template(&a), hasher.hash_template(&b));
        assert_eq!(hasher.hash_template(&a).len(), 64);
    }

    #[test]
    fn test_change_set_name_format() {
        let hasher = TemplateHasher::new();
        let at = Utc
            .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
            .single()
            .expect("valid date");
        let name = hasher.change_set_name(&Template::inline("{}"), at);

        assert!(name.starts_with("kiln-20260102T030405-"));
        assert_eq!(name.len(), "kiln-20260102T030405-".len() + 8);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }
}
