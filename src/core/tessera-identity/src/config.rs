//! Provider client configuration.

use std::time::Duration;

use aws_credential_types::Credentials;
use tessera_auth::ProviderEndpoints;
use zeroize::Zeroizing;

use crate::IdentityError;

/// Configuration of a [`CognitoClient`](crate::CognitoClient).
#[derive(Clone)]
pub struct ProviderConfig {
    /// Region of the user pool, e.g. `eu-west-1`.
    pub region: String,
    /// User pool id.
    pub user_pool_id: String,
    /// App client id.
    pub app_client_id: String,
    /// App client secret, used for the secret hash.
    pub client_secret: Zeroizing<String>,
    /// IAM credentials for administrative calls. `None` uses the default
    /// AWS credential chain (environment, profile, instance role).
    pub credentials: Option<Credentials>,
    /// Base URL replacing the hosted provider (emulators, tests).
    pub endpoint: Option<String>,
    /// Accept a plain `http` endpoint override.
    pub allow_http: bool,
    /// Timeout of provider API calls.
    pub request_timeout: Duration,
    /// Timeout of key-set fetches.
    pub key_set_timeout: Duration,
}

impl ProviderConfig {
    /// Creates a configuration for the hosted provider.
    pub fn new(
        region: impl Into<String>,
        user_pool_id: impl Into<String>,
        app_client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            user_pool_id: user_pool_id.into(),
            app_client_id: app_client_id.into(),
            client_secret: Zeroizing::new(client_secret.into()),
            credentials: None,
            endpoint: None,
            allow_http: false,
            request_timeout: Duration::from_secs(10),
            key_set_timeout: Duration::from_secs(10),
        }
    }

    /// Uses static IAM credentials for administrative calls.
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "tessera-config",
        ));
        self
    }

    /// Points the client at another base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>, allow_http: bool) -> Self {
        self.endpoint = Some(endpoint.into());
        self.allow_http = allow_http;
        self
    }

    /// Sets the API call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the key-set fetch timeout.
    pub fn with_key_set_timeout(mut self, timeout: Duration) -> Self {
        self.key_set_timeout = timeout;
        self
    }

    /// Checks required settings and derives the provider URLs.
    pub fn endpoints(&self) -> Result<ProviderEndpoints, IdentityError> {
        if self.app_client_id.is_empty() {
            return Err(IdentityError::Configuration("app client id is required".into()));
        }
        if self.client_secret.is_empty() {
            return Err(IdentityError::Configuration("client secret is required".into()));
        }

        match &self.endpoint {
            Some(base) => ProviderEndpoints::with_base_url(
                base,
                &self.region,
                &self.user_pool_id,
                self.allow_http,
            ),
            None => ProviderEndpoints::for_region(&self.region, &self.user_pool_id),
        }
        .map_err(IdentityError::from)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("region", &self.region)
            .field("user_pool_id", &self.user_pool_id)
            .field("app_client_id", &self.app_client_id)
            .field("client_secret", &"[REDACTED]")
            .field("credentials", &self.credentials)
            .field("endpoint", &self.endpoint)
            .field("allow_http", &self.allow_http)
            .field("request_timeout", &self.request_timeout)
            .field("key_set_timeout", &self.key_set_timeout)
            .finish()
    }
}
