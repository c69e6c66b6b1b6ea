//! Identity provider capability.

use async_trait::async_trait;
use tessera_auth::VerifiedClaims;
use tokio_util::sync::CancellationToken;

use crate::{AuthResult, Identity, IdentityError, Registration};

/// Operations the user lifecycle needs from the identity provider.
///
/// Every call races `cancel` and fails with [`IdentityError::Cancelled`]
/// when it fires first.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Signs a new user up. The account stays unconfirmed until
    /// [`confirm_registration`](Self::confirm_registration) succeeds.
    async fn register(
        &self,
        registration: Registration,
        cancel: &CancellationToken,
    ) -> Result<(), IdentityError>;

    /// Confirms a sign-up with the code sent to the user.
    async fn confirm_registration(
        &self,
        username: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IdentityError>;

    /// Sends a new confirmation code.
    async fn resend_confirmation(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IdentityError>;

    /// Returns whether an account with this username exists.
    async fn username_exists(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, IdentityError>;

    /// Logs in with username and password.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthResult, IdentityError>;

    /// Fetches the profile of the user owning `access_token`.
    async fn fetch_profile(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Identity, IdentityError>;

    /// Verifies a token issued by the provider.
    async fn verify_token(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<VerifiedClaims, IdentityError>;
}
