//! Provider endpoint derivation.
//!
//! Everything the service talks to is derived from the region and user pool
//! id: the JSON API endpoint, the token issuer and the well-known key-set
//! document.

use url::Url;

use crate::AuthError;

/// Path of the key-set document below the issuer.
pub const WELL_KNOWN_KEYS_PATH: &str = ".well-known/jwks.json";

/// Service signing name of the provider.
pub const SERVICE_NAME: &str = "cognito-idp";

/// Provider URLs for one user pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    base: Url,
    region: String,
    pool_id: String,
}

impl ProviderEndpoints {
    /// Endpoints of the hosted provider in `region`.
    pub fn for_region(region: &str, pool_id: &str) -> Result<Self, AuthError> {
        if region.is_empty() || pool_id.is_empty() {
            return Err(AuthError::Configuration(
                "region and user pool id are required".into(),
            ));
        }

        let base = Url::parse(&format!("https://{SERVICE_NAME}.{region}.amazonaws.com"))
            .map_err(|e| AuthError::Configuration(format!("invalid region {region:?}: {e}")))?;

        Ok(Self {
            base,
            region: region.to_string(),
            pool_id: pool_id.to_string(),
        })
    }

    /// Endpoints rooted at an explicit base URL (emulators, tests).
    ///
    /// Plain `http` is refused unless `allow_http` is set.
    pub fn with_base_url(
        base_url: &str,
        region: &str,
        pool_id: &str,
        allow_http: bool,
    ) -> Result<Self, AuthError> {
        if region.is_empty() || pool_id.is_empty() {
            return Err(AuthError::Configuration(
                "region and user pool id are required".into(),
            ));
        }

        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| AuthError::Configuration(format!("invalid base url: {e}")))?;

        match base.scheme() {
            "https" => {},
            "http" if allow_http => {},
            other => {
                return Err(AuthError::Configuration(format!(
                    "scheme {other:?} not allowed for provider endpoint"
                )))
            },
        }

        Ok(Self {
            base,
            region: region.to_string(),
            pool_id: pool_id.to_string(),
        })
    }

    /// Region of the user pool.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// User pool id.
    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }

    /// Host (with port, if any) used for request signing.
    pub fn host(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// JSON API endpoint.
    pub fn api_url(&self) -> String {
        format!("{}/", self.root())
    }

    /// Expected `iss` claim of tokens issued by the pool.
    pub fn issuer(&self) -> String {
        format!("{}/{}", self.root(), self.pool_id)
    }

    /// Well-known key-set document.
    pub fn key_set_url(&self) -> String {
        format!("{}/{}", self.issuer(), WELL_KNOWN_KEYS_PATH)
    }

    fn root(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }
}
