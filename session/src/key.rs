/// Maps logical session tokens to physical store keys under one namespace.
///
/// Prefixing is idempotent: a token that already carries the prefix is used
/// as-is, so `physical_key(physical_key(t)) == physical_key(t)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn physical_key(&self, token: &str) -> String {
        if token.starts_with(&self.prefix) {
            return token.to_owned();
        }
        format!("{}{}", self.prefix, token)
    }

    /// Token part of a key in this namespace, `None` for foreign keys.
    pub fn logical_token<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
    }

    pub fn owns(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn prefixes_bare_tokens() {
        let codec = KeyCodec::new("TEST_");
        assert_eq!(codec.physical_key("item0"), "TEST_item0");
    }

    #[test]
    fn keeps_already_prefixed_tokens() {
        let codec = KeyCodec::new("TEST_");
        assert_eq!(codec.physical_key("TEST_item0"), "TEST_item0");
    }

    #[test]
    fn logical_token_strips_only_own_prefix() {
        let codec = KeyCodec::new("cerebro");
        assert_eq!(codec.logical_token("cerebroabc"), Some("abc"));
        assert_eq!(codec.logical_token("TEST_abc"), None);
        assert!(codec.owns("cerebroabc"));
        assert!(!codec.owns("TEST_abc"));
    }

    #[test]
    fn empty_prefix_is_identity() {
        let codec = KeyCodec::new("");
        assert_eq!(codec.physical_key("abc"), "abc");
        assert!(codec.owns("anything"));
    }

    proptest! {
        #[test]
        fn physical_key_is_idempotent(prefix in "[a-zA-Z_:]{0,8}", token in "\\PC{0,24}") {
            let codec = KeyCodec::new(prefix);
            let once = codec.physical_key(&token);
            prop_assert_eq!(codec.physical_key(&once), once.clone());
            prop_assert!(codec.owns(&once));
        }
    }
}
