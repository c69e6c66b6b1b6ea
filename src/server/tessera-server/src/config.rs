//! Server configuration.
//!
//! Loaded from a TOML file. Secrets may come from the environment instead,
//! which takes precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tessera_api::PasswordPolicy;
use tessera_identity::ProviderConfig;

/// Environment variable overriding `identity.client_secret`.
pub const CLIENT_SECRET_ENV: &str = "TESSERA_CLIENT_SECRET";

/// Environment variable overriding `identity.secret_access_key`.
pub const SECRET_ACCESS_KEY_ENV: &str = "TESSERA_SECRET_ACCESS_KEY";

/// Root of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerSection,
    pub identity: IdentitySection,
    pub database: DatabaseSection,
    pub validation: ValidationSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentitySection {
    pub region: String,
    pub user_pool_id: String,
    pub app_client_id: String,
    pub client_secret: String,
    /// Static access key. When both keys are empty the default AWS
    /// credential chain is used.
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Base URL replacing the hosted provider.
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub request_timeout_secs: u64,
    pub key_set_timeout_secs: u64,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            region: String::new(),
            user_pool_id: String::new(),
            app_client_id: String::new(),
            client_secret: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            endpoint: None,
            allow_http: false,
            request_timeout_secs: 10,
            key_set_timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for IdentitySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySection")
            .field("region", &self.region)
            .field("user_pool_id", &self.user_pool_id)
            .field("app_client_id", &self.app_client_id)
            .field("client_secret", &"[REDACTED]")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("allow_http", &self.allow_http)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub data_dir: PathBuf,
    pub name: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            name: "tessera".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationSection {
    pub password: PasswordSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordSection {
    pub min_length: usize,
    pub max_length: usize,
    pub patterns: Vec<String>,
}

impl Default for PasswordSection {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 100,
            patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parses TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replaces secrets with values found through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(CLIENT_SECRET_ENV).filter(|s| !s.is_empty()) {
            self.identity.client_secret = secret;
        }
        if let Some(secret) = lookup(SECRET_ACCESS_KEY_ENV).filter(|s| !s.is_empty()) {
            self.identity.secret_access_key = secret;
        }
    }

    /// Checks that everything the server needs at startup is present.
    pub fn validate(&self) -> Result<()> {
        let identity = &self.identity;
        let required = [
            ("identity.region", &identity.region),
            ("identity.user_pool_id", &identity.user_pool_id),
            ("identity.app_client_id", &identity.app_client_id),
            ("identity.client_secret", &identity.client_secret),
        ];
        let missing: Vec<_> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            bail!("missing required settings: {}", missing.join(", "));
        }
        if identity.access_key_id.is_empty() != identity.secret_access_key.is_empty() {
            bail!("identity.access_key_id and identity.secret_access_key must be set together");
        }

        let password = &self.validation.password;
        if password.min_length == 0 || password.min_length > password.max_length {
            bail!(
                "validation.password: invalid length bounds {}..={}",
                password.min_length,
                password.max_length
            );
        }
        if self.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be positive");
        }
        Ok(())
    }

    /// Identity provider client settings.
    pub fn provider(&self) -> ProviderConfig {
        let identity = &self.identity;
        let mut config = ProviderConfig::new(
            &identity.region,
            &identity.user_pool_id,
            &identity.app_client_id,
            identity.client_secret.as_str(),
        )
        .with_request_timeout(Duration::from_secs(identity.request_timeout_secs))
        .with_key_set_timeout(Duration::from_secs(identity.key_set_timeout_secs));

        if !identity.access_key_id.is_empty() {
            config = config.with_credentials(&identity.access_key_id, &identity.secret_access_key);
        }

        if let Some(endpoint) = &identity.endpoint {
            config = config.with_endpoint(endpoint, identity.allow_http);
        }
        config
    }

    /// Compiled password policy.
    pub fn password_policy(&self) -> Result<PasswordPolicy> {
        let password = &self.validation.password;
        PasswordPolicy::new(password.min_length, password.max_length, &password.patterns)
            .context("invalid validation.password pattern")
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
