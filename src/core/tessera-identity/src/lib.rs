//! # Tessera Identity
//!
//! Client for the external identity provider.
//!
//! The [`IdentityProvider`] trait is the capability the user lifecycle is
//! written against; [`CognitoClient`] implements it with the AWS SDK. Every
//! user-scoped call carries the client secret hash and tokens are verified
//! locally against the pool's published keys.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cognito;
pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use cognito::CognitoClient;
pub use config::ProviderConfig;
pub use error::IdentityError;
pub use provider::IdentityProvider;
pub use types::{AuthResult, Identity, Registration};
