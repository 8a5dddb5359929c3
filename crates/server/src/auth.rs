//! Router and auth pipeline (C3): HMAC body verification and API-key
//! validation. Route resolution itself lives in
//! `alertbridge_core::rules::resolve_route`.

use alertbridge_core::error::RelayError;
use alertbridge_core::rules::{ApiKeys, Hmac, HmacAlgorithm};
use axum::http::HeaderMap;
use hmac::{Hmac as HmacImpl, Mac};
use sha1::Sha1;
use sha2::Sha256;

/// Verify `route.verify_hmac` against the raw request body. The secret is
/// resolved from the environment variable named by `hmac.secret_env`; a
/// missing secret is an auth failure, never a silent pass.
pub fn verify_hmac(hmac: &Hmac, headers: &HeaderMap, raw_body: &[u8]) -> Result<(), RelayError> {
    let secret = std::env::var(&hmac.secret_env)
        .map_err(|_| RelayError::Auth(format!("hmac secret env {:?} is not set", hmac.secret_env)))?;

    let header_value = headers
        .get(hmac.header.as_str())
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| RelayError::Auth(format!("missing signature header {:?}", hmac.header)))?;

    // Accept `<algo>=<hexdigest>` or a bare hex digest.
    let digest_hex = header_value
        .split_once('=')
        .map(|(_, d)| d)
        .unwrap_or(header_value);

    let computed = match hmac.algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac = HmacImpl::<Sha256>::new_from_slice(secret.as_bytes())
                .map_err(|e| RelayError::Internal(format!("invalid hmac secret: {e}")))?;
            mac.update(raw_body);
            hex::encode(mac.finalize().into_bytes())
        }
        HmacAlgorithm::Sha1 => {
            let mut mac = HmacImpl::<Sha1>::new_from_slice(secret.as_bytes())
                .map_err(|e| RelayError::Internal(format!("invalid hmac secret: {e}")))?;
            mac.update(raw_body);
            hex::encode(mac.finalize().into_bytes())
        }
    };

    if constant_time_eq(computed.as_bytes(), digest_hex.as_bytes()) {
        Ok(())
    } else {
        Err(RelayError::Auth("signature mismatch".to_string()))
    }
}

/// Validate an API key presented via `X-API-Key` or `Authorization: Bearer`.
/// When `api_keys.required` is false, a missing key is accepted but a
/// present, invalid one is still rejected.
pub fn verify_api_key(api_keys: &ApiKeys, headers: &HeaderMap) -> Result<(), RelayError> {
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        });

    match presented {
        Some(key) => {
            let matches = api_keys
                .keys
                .iter()
                .any(|entry| constant_time_eq(entry.key.as_bytes(), key.as_bytes()));
            if matches {
                Ok(())
            } else {
                Err(RelayError::Auth("invalid API key".to_string()))
            }
        }
        None if api_keys.required => Err(RelayError::Auth("missing API key".to_string())),
        None => Ok(()),
    }
}

/// Fold-XOR constant-time comparison; avoids short-circuiting on length
/// differences that would otherwise leak timing information.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
