//! # Tessera Auth
//!
//! Verification of bearer tokens issued by the identity provider.
//!
//! - [`KeySetCache`] fetches the provider's published signing keys and keeps
//!   them as an atomically swapped snapshot.
//! - [`TokenVerifier`] checks RS256 signatures against that cache and the
//!   standard claims, producing [`VerifiedClaims`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claims;
pub mod endpoints;
pub mod error;
pub mod keyset;
pub mod verifier;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use claims::{TokenUse, VerifiedClaims};
pub use endpoints::ProviderEndpoints;
pub use error::AuthError;
pub use keyset::{KeySet, KeySetCache, KeySetConfig, SigningKey};
pub use verifier::TokenVerifier;
