//! Per-call context carried through decode, handle, and encode.

use tokio_util::sync::CancellationToken;

use crate::types::RequestId;

/// Context handed to every codec stage.
///
/// Carries the request's correlation id and a cancellation token. The
/// token is a child of the owning transport's token, so connection
/// teardown is observable by in-flight handlers that choose to check it;
/// handlers that ignore it are not forcibly terminated.
#[derive(Clone, Debug)]
pub struct CallContext {
    request_id: Option<RequestId>,
    cancel: CancellationToken,
}

impl CallContext {
    /// Context rooted at the given cancellation token, with no request id
    /// bound yet.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            request_id: None,
            cancel,
        }
    }

    /// Derive a per-request context carrying `id`, with a child token.
    pub fn for_request(&self, id: Option<RequestId>) -> Self {
        Self {
            request_id: id,
            cancel: self.cancel.child_token(),
        }
    }

    /// The correlation id of the request being served, if any.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// The cancellation token for this call.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the owning transport has been torn down.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
