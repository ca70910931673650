//! Credentials shared by a backend's outbound requests.
//!
//! Every backend authenticates with a bearer-style header. The header value is a
//! personal token, an OAuth access token or an installation access token; the
//! kind of credential is the [`CredentialClass`], which is also the key the
//! [`RateLimiter`](crate::provider::RateLimiter) budgets calls under.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// The authentication method a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialClass {
    /// Personal access token.
    #[default]
    PersonalToken,
    /// OAuth access token.
    #[serde(rename = "oauth")]
    OAuth,
    /// App installation access token.
    Installation,
}

impl CredentialClass {
    /// All credential classes, in a stable order.
    pub const ALL: [CredentialClass; 3] = [
        CredentialClass::PersonalToken,
        CredentialClass::OAuth,
        CredentialClass::Installation,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialClass::PersonalToken => "personal_token",
            CredentialClass::OAuth => "oauth",
            CredentialClass::Installation => "installation",
        }
    }
}

impl fmt::Display for CredentialClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached credential that can be invalidated and replaced at runtime.
///
/// Clones share the same slot, so clearing the credential after a 401 is
/// visible to every holder (the backend, the provider and the engine).
#[derive(Clone)]
pub struct CredentialCache {
    class: CredentialClass,
    token: Arc<RwLock<Option<String>>>,
}

impl CredentialCache {
    pub fn new(class: CredentialClass, token: Option<String>) -> Self {
        Self {
            class,
            token: Arc::new(RwLock::new(token.filter(|t| !t.is_empty()))),
        }
    }

    #[must_use]
    pub fn class(&self) -> CredentialClass {
        self.class
    }

    /// The current token, if one is cached.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Drop the cached token. Requests fail with `AuthExpired` until a new one is set.
    pub fn clear(&self) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        if slot.take().is_some() {
            tracing::warn!(class = %self.class, "Cached credential invalidated");
        }
    }

    /// Install a new token.
    pub fn replace(&self, token: impl Into<String>) {
        let token = token.into();
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = (!token.is_empty()).then_some(token);
    }

    /// Build the `Authorization` header value with the given scheme (e.g. `Bearer`).
    #[must_use]
    pub fn authorization(&self, scheme: &str) -> Option<String> {
        self.token().map(|t| format!("{scheme} {t}"))
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("class", &self.class)
            .field("present", &self.is_present())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_is_shared_between_clones() {
        let cache = CredentialCache::new(CredentialClass::OAuth, Some("gho_abc".to_string()));
        let clone = cache.clone();

        assert_eq!(clone.authorization("Bearer"), Some("Bearer gho_abc".to_string()));
        cache.clear();
        assert!(!clone.is_present());
        assert_eq!(clone.authorization("Bearer"), None);

        clone.replace("gho_new");
        assert_eq!(cache.token(), Some("gho_new".to_string()));
    }

    #[test]
    fn test_empty_token_is_treated_as_absent() {
        let cache = CredentialCache::new(CredentialClass::PersonalToken, Some(String::new()));
        assert!(!cache.is_present());
        cache.replace("");
        assert!(!cache.is_present());
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let cache = CredentialCache::new(CredentialClass::Installation, Some("ghs_secret".into()));
        let debug = format!("{cache:?}");
        assert!(!debug.contains("ghs_secret"));
        assert!(debug.contains("Installation"));
    }

    #[test]
    fn test_credential_class_serde_names() {
        let parsed: CredentialClass = serde_json::from_str("\"oauth\"").unwrap();
        assert_eq!(parsed, CredentialClass::OAuth);
        assert_eq!(
            serde_json::to_string(&CredentialClass::PersonalToken).unwrap(),
            "\"personal_token\""
        );
        assert_eq!(CredentialClass::Installation.to_string(), "installation");
    }
}
