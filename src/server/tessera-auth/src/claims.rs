//! Verified token claims.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of token, from the `token_use` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    /// Identity token (profile claims, audience is the app client).
    Id,
    /// Access token (scopes, carries `client_id`).
    Access,
}

impl TokenUse {
    /// Parses the `token_use` claim.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "id" => Some(Self::Id),
            "access" => Some(Self::Access),
            _ => None,
        }
    }

    /// Claim value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Access => "access",
        }
    }
}

/// Claims of a token whose signature and standard claims have been checked.
///
/// Only [`TokenVerifier`](crate::TokenVerifier) produces values of this type.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedClaims {
    subject: String,
    username: String,
    issuer: String,
    expiry: u64,
    issued_at: u64,
    token_use: TokenUse,
    attributes: BTreeMap<String, serde_json::Value>,
}

impl VerifiedClaims {
    pub(crate) fn new(
        subject: String,
        username: String,
        issuer: String,
        expiry: u64,
        issued_at: u64,
        token_use: TokenUse,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            subject,
            username,
            issuer,
            expiry,
            issued_at,
            token_use,
            attributes,
        }
    }

    /// `sub` claim.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Username the token was issued to.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// `iss` claim.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Expiration (Unix seconds).
    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    /// Issue time (Unix seconds), zero when absent.
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// Token kind.
    pub fn token_use(&self) -> TokenUse {
        self.token_use
    }

    /// Every other claim, e.g. `email` or `custom:*` attributes.
    pub fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.attributes
    }

    /// Looks up a single non-standard claim.
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_use_parse() {
        assert_eq!(TokenUse::parse("id"), Some(TokenUse::Id));
        assert_eq!(TokenUse::parse("access"), Some(TokenUse::Access));
        assert_eq!(TokenUse::parse("refresh"), None);
        assert_eq!(TokenUse::parse("ID"), None);
    }

    #[test]
    fn test_token_use_serialization() {
        assert_eq!(serde_json::to_string(&TokenUse::Id).ok().as_deref(), Some("\"id\""));
        assert_eq!(TokenUse::Access.as_str(), "access");
    }
}
