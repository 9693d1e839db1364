//! Record body encoding.
//!
//! Records are stored as field-named JSON so any reader can decode them
//! regardless of field order.

use crate::error::{RmaError, RmaResult};
use crate::rma::Rma;

/// Encodes `rma`, rejecting bodies larger than `max_bytes`.
///
/// # Errors
/// Returns [`RmaError::Corrupt`] if serialization fails or the body is too
/// large.
pub fn encode(rma: &Rma, max_bytes: usize) -> RmaResult<Vec<u8>> {
    let bytes = serde_json::to_vec(rma)
        .map_err(|e| RmaError::corrupt(rma.rmano.as_str(), format!("cannot encode: {e}")))?;
    if bytes.len() > max_bytes {
        return Err(RmaError::corrupt(
            rma.rmano.as_str(),
            format!("encoded record is {} bytes, limit is {max_bytes}", bytes.len()),
        ));
    }
    Ok(bytes)
}

/// Decodes a stored body. `location` names the record in error messages.
///
/// # Errors
/// Returns [`RmaError::Corrupt`] if the bytes are not a valid record.
pub fn decode(location: &str, bytes: &[u8]) -> RmaResult<Rma> {
    serde_json::from_slice(bytes)
        .map_err(|e| RmaError::corrupt(location, format!("cannot decode: {e}")))
}
