//! AI-rewrite collaborator contract.

use std::fmt;
use std::future::Future;

/// A reported rewrite failure: a literal error string, never a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteFailure {
    pub message: String,
}

impl RewriteFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RewriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RewriteFailure {}

/// The AI-rewrite service: single-text rewrite and ordered batch rewrite.
///
/// Failures are recoverable and retryable by re-invocation; callers surface
/// the message to the operator and leave state untouched.
pub trait Rewriter: Send + Sync {
    fn rewrite(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<String, RewriteFailure>> + Send;

    fn rewrite_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<String, RewriteFailure>> + Send;
}
