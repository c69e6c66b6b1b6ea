//! User lifecycle orchestration.

use std::future::Future;
use std::sync::Arc;

use tessera_identity::{AuthResult, Identity, IdentityProvider, Registration};
use tessera_storage::LocalUserStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::UserError;

/// Runs `operation` unless `cancel` fires first.
async fn race<T, E, F>(cancel: &CancellationToken, operation: F) -> Result<T, UserError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<UserError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UserError::Cancelled),
        result = operation => result.map_err(Into::into),
    }
}

/// Composes the identity provider with the local store.
///
/// Requests are independent; the service holds no per-user state. Nothing
/// is rolled back across the two systems: an account registered at the
/// provider whose local record could not be written stays registered.
#[derive(Clone)]
pub struct UserService {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn LocalUserStore>,
}

impl UserService {
    /// Creates a service over a provider and a local store.
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn LocalUserStore>) -> Self {
        Self { provider, store }
    }

    /// Registers a user with the provider, then records it locally.
    ///
    /// The returned identity is unconfirmed and carries the new local id.
    ///
    /// # Errors
    ///
    /// - [`UserError::RegistrationFailed`] when the provider refuses; the
    ///   store is not touched
    /// - [`UserError::LocalStoreConflict`] / [`UserError::LocalStoreUnavailable`]
    ///   when the provider accepted but the local write failed
    pub async fn create_user(
        &self,
        registration: Registration,
        cancel: &CancellationToken,
    ) -> Result<Identity, UserError> {
        let identity = registration.to_identity();
        debug!(username = %identity.username, "Creating user");

        race(cancel, self.provider.register(registration, cancel)).await?;

        let local_id = race(cancel, self.store.store_local_user(&identity.username))
            .await
            .inspect_err(|e| {
                warn!(
                    username = %identity.username,
                    error = %e,
                    "User registered with provider but local record was not written"
                );
            })?;

        info!(username = %identity.username, local_id, "User created");
        Ok(identity.with_local_id(local_id))
    }

    /// Confirms a registration. The local store is not consulted, so the
    /// returned identity has no local id.
    pub async fn confirm_user(
        &self,
        username: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<Identity, UserError> {
        race(cancel, self.provider.confirm_registration(username, code, cancel)).await?;

        info!(username = %username, "User confirmed");
        Ok(Identity {
            confirmed: true,
            ..Identity::new(username)
        })
    }

    /// Sends a new confirmation code.
    pub async fn resend_confirmation(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<(), UserError> {
        race(cancel, self.provider.resend_confirmation(username, cancel)).await
    }

    /// Returns whether the username is already registered with the provider.
    ///
    /// "Not found" is `Ok(false)`; any other provider failure is
    /// [`UserError::ExistenceCheckFailed`].
    pub async fn check_username_taken(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, UserError> {
        race(cancel, self.provider.username_exists(username, cancel)).await
    }

    /// Logs in and returns the id token.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<String, UserError> {
        Ok(self.login_session(username, password, cancel).await?.id_token)
    }

    /// Logs in and returns every token the provider issued.
    pub async fn login_session(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthResult, UserError> {
        let result = race(cancel, self.provider.authenticate(username, password, cancel)).await?;
        debug!(username = %username, "User logged in");
        Ok(result)
    }

    /// Returns whether `token` is a valid provider token.
    ///
    /// An invalid token is `Ok(false)`. Failures to obtain the signing keys
    /// and cancellation are errors, since they say nothing about the token.
    pub async fn verify_token(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, UserError> {
        match race(cancel, self.provider.verify_token(token, cancel)).await {
            Ok(claims) => {
                debug!(username = %claims.username(), "Token verified");
                Ok(true)
            },
            Err(UserError::InvalidToken { reason }) => {
                debug!(reason = %reason, "Token rejected");
                Ok(false)
            },
            Err(e) => Err(e),
        }
    }

    /// Returns the provider profile joined with the local id.
    ///
    /// # Errors
    ///
    /// [`UserError::ProfileIncomplete`] when the provider knows the user but
    /// the local store does not.
    pub async fn user_details(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Identity, UserError> {
        let profile = race(cancel, self.provider.fetch_profile(access_token, cancel)).await?;

        let local_id = match race(cancel, self.store.fetch_local_user(&profile.username)).await {
            Ok(id) if id > 0 => id,
            Ok(_) | Err(UserError::ProfileIncomplete { .. }) => {
                warn!(username = %profile.username, "No local record for provider user");
                return Err(UserError::ProfileIncomplete {
                    username: profile.username,
                });
            },
            Err(e) => return Err(e),
        };

        Ok(profile.with_local_id(local_id))
    }
}
