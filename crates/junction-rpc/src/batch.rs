//! Batch normalization: reduce a raw payload to a uniform request list.

use crate::error::RpcError;
use crate::types::Request;

/// Parse a raw payload into a list of request envelopes.
///
/// A trimmed payload starting with `[` and ending with `]` is treated as
/// a batch; anything else parses as a single request wrapped in a
/// one-element list, with the returned flag recording which shape the
/// caller must serialize back. An empty array is a valid batch of zero.
///
/// Malformed JSON yields [`RpcError::Parse`], which the transport turns
/// into a single protocol-level error response with a null id.
pub fn normalize(payload: &[u8]) -> Result<(Vec<Request>, bool), RpcError> {
    let trimmed = payload.trim_ascii();
    if trimmed.starts_with(b"[") && trimmed.ends_with(b"]") {
        let requests: Vec<Request> = serde_json::from_slice(trimmed)
            .map_err(|e| RpcError::parse(format!("JSON could not be decoded: {e}")))?;
        Ok((requests, true))
    } else {
        let request: Request = serde_json::from_slice(trimmed)
            .map_err(|e| RpcError::parse(format!("JSON could not be decoded: {e}")))?;
        Ok((vec![request], false))
    }
}
