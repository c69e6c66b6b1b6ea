//! Client secret hash.
//!
//! Every provider call that names a user must carry
//! `base64(HMAC-SHA256(client_secret, username || client_id))`. The provider
//! recomputes it from the username in the same request, so the exact bytes
//! hashed here must be the bytes sent on the wire.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Computes the secret hash for `username` under the given app client.
///
/// Empty arguments are a caller bug: the provider would reject the request
/// anyway, so this is checked in debug builds only.
pub fn secret_hash(
    username: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, CryptoError> {
    debug_assert!(!username.is_empty(), "secret hash requires a username");
    debug_assert!(!client_id.is_empty(), "secret hash requires a client id");
    debug_assert!(!client_secret.is_empty(), "secret hash requires a client secret");

    let mut mac = <HmacSha256 as Mac>::new_from_slice(client_secret.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
