//! # Tessera Storage
//!
//! Local user store abstraction.
//!
//! The identity provider owns credentials and profile attributes; the local
//! store only maps a username to the numeric id the rest of the platform
//! keys its data on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;

pub use backend::LocalUserStore;
pub use error::StorageError;
pub use memory::MemoryUserStore;
