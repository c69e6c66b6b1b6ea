//! Identity provider client on the Cognito user pools API.

use std::error::Error as StdError;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cognitoidentityprovider::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cognitoidentityprovider::operation::initiate_auth::InitiateAuthOutput;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client;
use tessera_auth::{KeySetCache, KeySetConfig, ProviderEndpoints, TokenVerifier, VerifiedClaims};
use tessera_crypto::secret_hash;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{AuthResult, Identity, IdentityError, IdentityProvider, ProviderConfig, Registration};

/// Provider error codes with a dedicated mapping.
mod codes {
    pub const USER_NOT_FOUND: &str = "UserNotFoundException";
    pub const USER_NOT_CONFIRMED: &str = "UserNotConfirmedException";
    pub const NOT_AUTHORIZED: &str = "NotAuthorizedException";
}

/// Failure of a single provider call, before it is mapped to the
/// operation's error.
#[derive(Debug)]
enum CallError {
    /// The provider answered with an error.
    Provider { code: String, message: String },
    /// The request could not be built, or did not complete.
    Transport(String),
    Cancelled,
}

impl CallError {
    fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + StdError + 'static,
        R: Debug,
    {
        let context = DisplayErrorContext(&err).to_string();
        match err.as_service_error() {
            Some(service) => CallError::Provider {
                code: service.code().unwrap_or("Unknown").to_string(),
                message: service.message().map_or(context, str::to_string),
            },
            None => CallError::Transport(context),
        }
    }

    fn is(&self, expected: &str) -> bool {
        matches!(self, CallError::Provider { code, .. } if code == expected)
    }

    fn reason(&self) -> String {
        match self {
            CallError::Provider { message, .. } => message.clone(),
            CallError::Transport(msg) => msg.clone(),
            CallError::Cancelled => "operation cancelled".to_string(),
        }
    }

    /// Maps to the operation's failure variant, keeping cancellation.
    fn into_error(self, failure: impl FnOnce(String) -> IdentityError) -> IdentityError {
        match self {
            CallError::Cancelled => IdentityError::Cancelled,
            other => failure(other.reason()),
        }
    }
}

fn attribute(name: &str, value: &str) -> Result<AttributeType, CallError> {
    AttributeType::builder()
        .name(name)
        .value(value)
        .build()
        .map_err(|e| CallError::Transport(format!("invalid attribute {name}: {e}")))
}

/// Client for a provider user pool.
pub struct CognitoClient {
    client: Client,
    endpoints: ProviderEndpoints,
    client_id: String,
    client_secret: Zeroizing<String>,
    verifier: TokenVerifier,
}

impl CognitoClient {
    /// Creates a client and fetches the pool's signing keys once.
    ///
    /// # Errors
    ///
    /// Fails on incomplete configuration or when the key set cannot be
    /// fetched.
    pub async fn connect(config: ProviderConfig) -> Result<Self, IdentityError> {
        let endpoints = config.endpoints()?;
        let keys = KeySetCache::connect(
            KeySetConfig::new(endpoints.key_set_url()).with_request_timeout(config.key_set_timeout),
        )
        .await?;

        let client = Self::with_key_set(config, endpoints, Arc::new(keys)).await;
        info!(
            region = %client.endpoints.region(),
            pool = %client.endpoints.pool_id(),
            "Identity provider client ready"
        );
        Ok(client)
    }

    /// Creates a client around an existing key-set cache.
    ///
    /// Calls are never retried and each one is bounded by
    /// `config.request_timeout`. Without static credentials the default AWS
    /// credential chain signs the administrative lookup.
    pub async fn with_key_set(
        config: ProviderConfig,
        endpoints: ProviderEndpoints,
        keys: Arc<KeySetCache>,
    ) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.request_timeout)
                    .build(),
            );
        if let Some(credentials) = config.credentials.clone() {
            loader = loader.credentials_provider(credentials);
        }
        if config.endpoint.is_some() {
            loader = loader.endpoint_url(endpoints.api_url().trim_end_matches('/'));
        }
        let sdk_config = loader.load().await;

        let verifier = TokenVerifier::new(keys, endpoints.issuer(), config.app_client_id.clone());

        Self {
            client: Client::new(&sdk_config),
            endpoints,
            client_id: config.app_client_id,
            client_secret: config.client_secret,
            verifier,
        }
    }

    /// Provider URLs in use.
    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    /// Token verifier bound to this pool and app client.
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    fn secret_hash(&self, username: &str) -> Result<String, CallError> {
        secret_hash(username, &self.client_id, &self.client_secret)
            .map_err(|e| CallError::Transport(format!("failed to compute secret hash: {e}")))
    }

    /// Awaits `request`, racing `cancel`.
    async fn call<T, E, R, F>(
        &self,
        operation: &'static str,
        request: F,
        cancel: &CancellationToken,
    ) -> Result<T, CallError>
    where
        F: Future<Output = Result<T, SdkError<E, R>>>,
        E: ProvideErrorMetadata + StdError + 'static,
        R: Debug,
    {
        debug!(operation, "Calling identity provider");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CallError::Cancelled),
            result = request => result,
        };

        result.map_err(|e| {
            let err = CallError::from_sdk(e);
            if let CallError::Provider { code, .. } = &err {
                debug!(operation, code = %code, "Identity provider rejected call");
            }
            err
        })
    }

    async fn sign_up(
        &self,
        registration: &Registration,
        cancel: &CancellationToken,
    ) -> Result<(), CallError> {
        let username = registration.username();

        let mut attributes = vec![attribute("email", registration.email())?];
        if let Some(phone_number) = registration.phone_number() {
            attributes.push(attribute("phone_number", phone_number)?);
        }

        let request = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .secret_hash(self.secret_hash(username)?)
            .username(username)
            .password(registration.password())
            .set_user_attributes(Some(attributes))
            .send();

        self.call("SignUp", request, cancel).await?;
        Ok(())
    }

    async fn confirm_sign_up(
        &self,
        username: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CallError> {
        let request = self
            .client
            .confirm_sign_up()
            .client_id(&self.client_id)
            .secret_hash(self.secret_hash(username)?)
            .username(username)
            .confirmation_code(code)
            .send();

        self.call("ConfirmSignUp", request, cancel).await?;
        Ok(())
    }

    async fn resend_confirmation_code(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CallError> {
        let request = self
            .client
            .resend_confirmation_code()
            .client_id(&self.client_id)
            .secret_hash(self.secret_hash(username)?)
            .username(username)
            .send();

        self.call("ResendConfirmationCode", request, cancel).await?;
        Ok(())
    }

    async fn initiate_auth(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<InitiateAuthOutput, CallError> {
        let request = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", username)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", self.secret_hash(username)?)
            .send();

        self.call("InitiateAuth", request, cancel).await
    }
}

#[async_trait]
impl IdentityProvider for CognitoClient {
    async fn register(
        &self,
        registration: Registration,
        cancel: &CancellationToken,
    ) -> Result<(), IdentityError> {
        self.sign_up(&registration, cancel)
            .await
            .map_err(|e| e.into_error(|reason| IdentityError::RegistrationFailed { reason }))?;

        info!(username = %registration.username(), "User registered with identity provider");
        Ok(())
    }

    async fn confirm_registration(
        &self,
        username: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IdentityError> {
        self.confirm_sign_up(username, code, cancel)
            .await
            .map_err(|e| e.into_error(|reason| IdentityError::ConfirmationFailed { reason }))?;

        info!(username = %username, "User confirmed");
        Ok(())
    }

    async fn resend_confirmation(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IdentityError> {
        self.resend_confirmation_code(username, cancel)
            .await
            .map_err(|e| e.into_error(|reason| IdentityError::ResendFailed { reason }))?;

        debug!(username = %username, "Confirmation code resent");
        Ok(())
    }

    async fn username_exists(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, IdentityError> {
        let request = self
            .client
            .admin_get_user()
            .user_pool_id(self.endpoints.pool_id())
            .username(username)
            .send();

        match self.call("AdminGetUser", request, cancel).await {
            Ok(_) => Ok(true),
            Err(e) if e.is(codes::USER_NOT_FOUND) => Ok(false),
            Err(e) => Err(e.into_error(|reason| IdentityError::ExistenceCheckFailed { reason })),
        }
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthResult, IdentityError> {
        let output = self
            .initiate_auth(username, password, cancel)
            .await
            .map_err(|e| {
                if e.is(codes::USER_NOT_CONFIRMED) {
                    IdentityError::UserNotConfirmed { reason: e.reason() }
                } else {
                    e.into_error(|reason| IdentityError::AuthenticationFailed { reason })
                }
            })?;

        let Some(result) = output.authentication_result else {
            let challenge = output
                .challenge_name
                .as_ref()
                .map_or("unknown", |c| c.as_str());
            warn!(username = %username, challenge = %challenge, "Login answered with a challenge");
            return Err(IdentityError::AuthenticationFailed {
                reason: format!("challenge {challenge} is not supported"),
            });
        };

        let (Some(id_token), Some(access_token)) = (result.id_token, result.access_token) else {
            return Err(IdentityError::AuthenticationFailed {
                reason: "provider returned no tokens".into(),
            });
        };

        debug!(username = %username, "User authenticated");
        Ok(AuthResult {
            id_token,
            access_token,
            refresh_token: result.refresh_token,
            expires_in: i64::from(result.expires_in),
        })
    }

    async fn fetch_profile(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Identity, IdentityError> {
        let request = self.client.get_user().access_token(access_token).send();

        let output = self
            .call("GetUser", request, cancel)
            .await
            .map_err(|e| {
                if e.is(codes::NOT_AUTHORIZED) {
                    IdentityError::InvalidToken(e.reason())
                } else {
                    e.into_error(IdentityError::ProfileUnavailable)
                }
            })?;

        let mut identity = Identity::new(output.username());
        for attribute in output.user_attributes() {
            let value = attribute.value().unwrap_or_default();
            match attribute.name() {
                "email" => identity.email = value.to_string(),
                "phone_number" => identity.phone_number = value.to_string(),
                "email_verified" => identity.confirmed = value.parse().unwrap_or(false),
                _ => {},
            }
        }

        Ok(identity)
    }

    async fn verify_token(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<VerifiedClaims, IdentityError> {
        Ok(self.verifier.verify_and_parse(token, cancel).await?)
    }
}
