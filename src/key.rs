//! Key normalization
//!
//! Every engine maps caller keys to storage keys the same way:
//! `prefix + sanitize(key)`, where every character outside `[A-Za-z0-9-]`
//! becomes `_`. The result is safe as a file name and as a memcached/Redis key,
//! and the prefix keeps differently-configured caches apart in a shared store.

/// Maps caller-supplied keys into prefixed, backend-safe storage keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyNormalizer {
    prefix: String,
}

impl KeyNormalizer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The configured namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Builds the storage key for `raw`.
    pub fn key(&self, raw: &str) -> String {
        let mut key = String::with_capacity(self.prefix.len() + raw.len());
        key.push_str(&self.prefix);
        key.extend(raw.chars().map(sanitize_char));
        key
    }

    /// Returns true if a storage key belongs to this namespace.
    #[inline]
    pub fn owns(&self, storage_key: &str) -> bool {
        storage_key.starts_with(&self.prefix)
    }
}

/// Replaces every character outside `[A-Za-z0-9-]` with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars().map(sanitize_char).collect()
}

#[inline]
fn sanitize_char(c: char) -> char {
    if c.is_ascii_alphanumeric() || c == '-' {
        c
    } else {
        '_'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_and_sanitize() {
        let keys = KeyNormalizer::new("app_");
        assert_eq!(keys.key("user-42"), "app_user-42");
        assert_eq!(keys.key("users/42:profile"), "app_users_42_profile");
        assert_eq!(keys.key("a b.c"), "app_a_b_c");
    }

    #[test]
    fn test_every_character_is_replaced() {
        assert_eq!(sanitize("../.."), "_____");
        assert_eq!(sanitize("café"), "caf_");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_empty_prefix() {
        let keys = KeyNormalizer::default();
        assert_eq!(keys.key("Foo_Bar"), "Foo_Bar");
        assert!(keys.owns("anything"));
    }

    #[test]
    fn test_owns() {
        let keys = KeyNormalizer::new("sessions_");
        assert!(keys.owns("sessions_abc"));
        assert!(!keys.owns("counters_abc"));
    }
}
