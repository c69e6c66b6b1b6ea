//! RS256 token verifier.
//!
//! Validates tokens issued by the provider's user pool. The algorithm is
//! pinned to RS256; tokens declaring anything else are rejected before any
//! key lookup.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{AuthError, KeySetCache, TokenUse, VerifiedClaims};

const ALGORITHM: Algorithm = Algorithm::RS256;

/// `aud` may be a single string or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, value: &str) -> bool {
        match self {
            Audience::One(aud) => aud == value,
            Audience::Many(auds) => auds.iter().any(|aud| aud == value),
        }
    }
}

/// Claims as found in provider tokens.
#[derive(Debug, Deserialize)]
struct ProviderClaims {
    sub: String,
    iss: String,
    exp: u64,
    #[serde(default)]
    iat: u64,
    token_use: String,
    /// Present on id tokens.
    #[serde(rename = "cognito:username", default)]
    cognito_username: Option<String>,
    /// Present on access tokens.
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// Verifies provider-issued bearer tokens.
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    issuer: String,
    client_id: String,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier for tokens issued by `issuer` to app client
    /// `client_id`.
    pub fn new(keys: Arc<KeySetCache>, issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        // The audience lives in different claims depending on token_use and
        // is checked after decoding.
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            keys,
            issuer,
            client_id: client_id.into(),
            validation,
        }
    }

    /// Key-set cache used for lookups.
    pub fn key_set(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Verifies the signature and claims of `token`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`] for malformed, wrongly signed, expired or
    ///   foreign tokens
    /// - [`AuthError::KeyNotFound`] / [`AuthError::KeySetUnavailable`] when the
    ///   signing key cannot be resolved
    /// - [`AuthError::Cancelled`] when `cancel` fires during a key fetch
    pub async fn verify_and_parse(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<VerifiedClaims, AuthError> {
        let header = decode_header(token)
            .map_err(|e| AuthError::InvalidToken(format!("malformed token: {e}")))?;

        if header.alg != ALGORITHM {
            return Err(AuthError::InvalidToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing key id".into()))?;

        let key = self.keys.resolve(&kid, cancel).await?;

        let data = decode::<ProviderClaims>(token, key.decoding_key(), &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let claims = data.claims;

        // Checked again here so an expired token can never be returned, even
        // if the validation settings change.
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        if claims.exp <= now {
            return Err(AuthError::InvalidToken("token expired".into()));
        }

        let token_use = TokenUse::parse(&claims.token_use).ok_or_else(|| {
            AuthError::InvalidToken(format!("unknown token_use {:?}", claims.token_use))
        })?;

        let (bound_to_client, username) = match token_use {
            TokenUse::Id => (
                claims.aud.as_ref().is_some_and(|aud| aud.contains(&self.client_id)),
                claims.cognito_username,
            ),
            TokenUse::Access => (
                claims.client_id.as_deref() == Some(self.client_id.as_str()),
                claims.username,
            ),
        };

        if !bound_to_client {
            return Err(AuthError::InvalidToken(
                "token was not issued to this client".into(),
            ));
        }

        let username =
            username.ok_or_else(|| AuthError::InvalidToken("missing username claim".into()))?;

        debug!(kid = %kid, token_use = token_use.as_str(), "Token verified");

        let attributes: BTreeMap<_, _> = claims.extra.into_iter().collect();
        Ok(VerifiedClaims::new(
            claims.sub,
            username,
            claims.iss,
            claims.exp,
            claims.iat,
            token_use,
            attributes,
        ))
    }

    /// Issuer this verifier accepts.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Standard claims that must be present on every token.
    pub fn required_claims(&self) -> &HashSet<String> {
        &self.validation.required_spec_claims
    }
}
