//! Provider signing-key cache.
//!
//! The provider publishes its token signing keys as a JSON Web Key Set. The
//! cache keeps the last good set as an immutable [`KeySet`] behind an
//! [`ArcSwap`], so verifications read it without locking and a refresh
//! replaces it in one pointer swap.
//!
//! Lookup rules:
//!
//! - A hit on the current snapshot is served directly.
//! - A miss triggers exactly one fetch followed by one more lookup; a second
//!   miss is [`AuthError::KeyNotFound`].
//! - A failed fetch is [`AuthError::KeySetUnavailable`] and leaves the
//!   previous snapshot in place.
//! - [`KeySetCache::invalidate`] marks the snapshot stale; the next lookup
//!   fetches first and keeps serving the stale keys if that fetch fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::AuthError;

/// Configuration for the key-set cache.
#[derive(Debug, Clone)]
pub struct KeySetConfig {
    /// Key-set document URL.
    pub url: String,

    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Maximum document size in bytes (default: 1 MB).
    pub max_document_size: usize,
}

impl KeySetConfig {
    /// Creates a configuration with default limits.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: Duration::from_secs(10),
            max_document_size: 1024 * 1024,
        }
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum document size.
    #[must_use]
    pub fn with_max_document_size(mut self, size: usize) -> Self {
        self.max_document_size = size;
        self
    }
}

/// A published RS256 verification key.
pub struct SigningKey {
    kid: String,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Key id.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Key material for signature verification.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &"RS256")
            .finish()
    }
}

/// Immutable snapshot of the provider's signing keys.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Option<Instant>,
}

impl KeySet {
    /// Builds a key set from a JWKS document.
    ///
    /// Keys without a key id, keys published for encryption, and non-RSA keys
    /// are skipped. An RSA key that cannot be decoded, or a repeated key id,
    /// makes the whole document malformed.
    pub fn from_jwks(document: &JwkSet) -> Result<Self, AuthError> {
        let mut keys = HashMap::with_capacity(document.keys.len());

        for jwk in &document.keys {
            let Some(kid) = jwk.common.key_id.as_deref() else {
                debug!("Skipping published key without kid");
                continue;
            };

            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                debug!(kid = %kid, "Skipping encryption key");
                continue;
            }

            let AlgorithmParameters::RSA(rsa) = &jwk.algorithm else {
                debug!(kid = %kid, "Skipping non-RSA key");
                continue;
            };

            if let Some(alg) = &jwk.common.key_algorithm {
                if *alg != KeyAlgorithm::RS256 {
                    debug!(kid = %kid, alg = ?alg, "Skipping RSA key for another algorithm");
                    continue;
                }
            }

            let decoding_key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|e| {
                AuthError::KeySetUnavailable(format!("malformed key material for {kid}: {e}"))
            })?;

            let key = Arc::new(SigningKey {
                kid: kid.to_string(),
                decoding_key,
            });
            if keys.insert(kid.to_string(), key).is_some() {
                return Err(AuthError::KeySetUnavailable(format!("duplicate key id {kid}")));
            }
        }

        Ok(Self {
            keys,
            fetched_at: Some(Instant::now()),
        })
    }

    /// Looks a key up by id.
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when the set holds no key.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids in the set.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// When the set was fetched, `None` for the initial empty set.
    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }
}

/// Cache of the provider's signing keys.
pub struct KeySetCache {
    http_client: reqwest::Client,
    config: KeySetConfig,
    snapshot: ArcSwap<KeySet>,
    stale: AtomicBool,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl KeySetCache {
    /// Creates an empty cache. The first lookup fetches the key set.
    pub fn new(config: KeySetConfig) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            config,
            snapshot: ArcSwap::from_pointee(KeySet::default()),
            stale: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Creates a cache and fetches the key set once, so configuration errors
    /// surface at startup.
    pub async fn connect(config: KeySetConfig) -> Result<Self, AuthError> {
        let cache = Self::new(config)?;
        cache.refresh(&CancellationToken::new()).await?;
        Ok(cache)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.snapshot.load_full()
    }

    /// Number of successful fetches so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Marks the snapshot stale so the next lookup fetches first.
    pub fn invalidate(&self) {
        debug!(url = %self.config.url, "Key set invalidated");
        self.stale.store(true, Ordering::Release);
    }

    /// Resolves a key id to a signing key.
    ///
    /// A lookup performs at most one fetch. A stale snapshot is refreshed
    /// first; a miss after that is final.
    pub async fn resolve(
        &self,
        kid: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<SigningKey>, AuthError> {
        let seen = self.generation();

        let stale_refresh = if self.stale.load(Ordering::Acquire) {
            let result = self.refresh_after(seen, cancel).await;
            match &result {
                Err(AuthError::Cancelled) => return Err(AuthError::Cancelled),
                Err(e) => warn!(error = %e, "Key set refresh failed, serving stale keys"),
                Ok(()) => {},
            }
            Some(result)
        } else {
            None
        };

        if let Some(key) = self.snapshot.load().get(kid) {
            return Ok(key);
        }

        match stale_refresh {
            Some(Err(e)) => return Err(e),
            Some(Ok(())) => return Err(AuthError::KeyNotFound { kid: kid.to_string() }),
            None => {},
        }

        debug!(kid = %kid, "Key id not in cached set, refreshing");
        self.refresh_after(seen, cancel).await?;

        self.snapshot
            .load()
            .get(kid)
            .ok_or_else(|| AuthError::KeyNotFound { kid: kid.to_string() })
    }

    /// Fetches the key set and swaps it in on success.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_swap(cancel).await
    }

    /// Refreshes unless another caller completed a refresh after generation
    /// `seen`, in which case that result is reused.
    async fn refresh_after(&self, seen: u64, cancel: &CancellationToken) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;
        if self.generation() != seen {
            debug!("Key set refreshed concurrently, reusing result");
            return Ok(());
        }
        self.fetch_and_swap(cancel).await
    }

    async fn fetch_and_swap(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let key_set = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            result = self.fetch() => result?,
        };

        info!(url = %self.config.url, keys = key_set.len(), "Key set refreshed");

        self.snapshot.store(Arc::new(key_set));
        self.stale.store(false, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn fetch(&self) -> Result<KeySet, AuthError> {
        let response = self
            .http_client
            .get(&self.config.url)
            .send()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::KeySetUnavailable(format!("HTTP status {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > self.config.max_document_size as u64 {
                return Err(AuthError::KeySetUnavailable(format!(
                    "document exceeds {} bytes",
                    self.config.max_document_size
                )));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(format!("failed to read body: {e}")))?;

        if body.len() > self.config.max_document_size {
            return Err(AuthError::KeySetUnavailable(format!(
                "document exceeds {} bytes",
                self.config.max_document_size
            )));
        }

        let document: JwkSet = serde_json::from_slice(&body)
            .map_err(|e| AuthError::KeySetUnavailable(format!("malformed key set: {e}")))?;

        KeySet::from_jwks(&document)
    }
}
