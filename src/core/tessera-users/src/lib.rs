//! # Tessera Users
//!
//! User lifecycle on top of the identity provider and the local store.
//!
//! An account moves from unregistered to pending confirmation to confirmed.
//! The state lives in the provider and is observed, never persisted here.
//! The local store only maps usernames to numeric ids.
//!
//! All failures are reported as a [`UserError`], whose [`ErrorKind`] is the
//! stable classification transports key their responses on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod service;

pub use error::{ErrorKind, UserError};
pub use service::UserService;

pub use tessera_identity::{AuthResult, Identity, Registration};
