//! # Tessera Crypto
//!
//! Keyed-hash primitive used to talk to the identity provider: the client
//! secret hash attached to every user-scoped provider call.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod secret_hash;

pub use error::CryptoError;
pub use secret_hash::secret_hash;
