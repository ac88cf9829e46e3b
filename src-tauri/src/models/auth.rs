// Stored API credential models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer token handed over by the front-end after its identity SDK refreshes it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub token: String,
    pub updated_at: DateTime<Utc>,
}

impl StoredCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.token.trim().is_empty()
    }

    /// Last four characters, enough to tell tokens apart in the settings screen
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("…{tail}")
    }
}

/// Authentication status for the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    pub is_authenticated: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub token_hint: Option<String>,
}

impl AuthStatus {
    pub fn from_credential(credential: Option<&StoredCredential>) -> Self {
        match credential.filter(|c| c.is_usable()) {
            Some(c) => Self {
                is_authenticated: true,
                updated_at: Some(c.updated_at),
                token_hint: Some(c.hint()),
            },
            None => Self {
                is_authenticated: false,
                updated_at: None,
                token_hint: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_credential() {
        let credential = StoredCredential::new("eyJhbGciOi.abcd1234");
        let status = AuthStatus::from_credential(Some(&credential));
        assert!(status.is_authenticated);
        assert_eq!(status.token_hint.as_deref(), Some("…1234"));

        let blank = StoredCredential::new("  ");
        assert!(!AuthStatus::from_credential(Some(&blank)).is_authenticated);
        assert!(!AuthStatus::from_credential(None).is_authenticated);
    }

    #[test]
    fn test_short_token_hint() {
        assert_eq!(StoredCredential::new("ab").hint(), "…ab");
    }
}
