//! Identity data types.

use serde::Serialize;
use zeroize::Zeroizing;

/// A user as known to the provider, optionally joined with the local id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Unique, immutable username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Phone number, empty when not set.
    pub phone_number: String,
    /// Whether the provider considers the account confirmed.
    pub confirmed: bool,
    /// Local numeric id, when the local store has been consulted.
    pub local_id: Option<i64>,
}

impl Identity {
    /// Creates an unconfirmed identity with no local id.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Sets the local id.
    pub fn with_local_id(mut self, id: i64) -> Self {
        self.local_id = Some(id);
        self
    }
}

/// Sign-up input.
///
/// The password is zeroized when the registration is dropped.
pub struct Registration {
    username: String,
    email: String,
    phone_number: Option<String>,
    password: Zeroizing<String>,
}

impl Registration {
    /// Creates a registration without a phone number.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            phone_number: None,
            password: Zeroizing::new(password.into()),
        }
    }

    /// Sets the phone number. An empty number is treated as absent.
    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        let phone_number = phone_number.into();
        self.phone_number = (!phone_number.is_empty()).then_some(phone_number);
        self
    }

    /// Username to register.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Email address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Phone number, if any.
    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    /// Password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Identity this registration will produce, before confirmation.
    pub fn to_identity(&self) -> Identity {
        Identity {
            username: self.username.clone(),
            email: self.email.clone(),
            phone_number: self.phone_number.clone().unwrap_or_default(),
            confirmed: false,
            local_id: None,
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("phone_number", &self.phone_number)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Tokens returned by a successful login.
#[derive(Clone, Serialize)]
pub struct AuthResult {
    /// Id token.
    pub id_token: String,
    /// Access token.
    pub access_token: String,
    /// Refresh token, when issued.
    pub refresh_token: Option<String>,
    /// Lifetime of the id and access tokens in seconds.
    pub expires_in: i64,
}

impl std::fmt::Debug for AuthResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResult")
            .field("id_token", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
