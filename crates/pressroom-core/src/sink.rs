//! Outbound display sink contract.
//!
//! The workflow engine renders toward a chat platform through this trait.
//! Failures are classified so the engine can distinguish a no-op edit from a
//! markup rejection (which triggers the escaped-plain-text fallback) from
//! everything else.

use std::fmt;
use std::future::Future;

use crate::model::{ContentKind, RenderMode};

/// Classified sink failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The platform reported the content as unchanged; a no-op, not an error.
    Unchanged,
    /// The sink rejected the markup; callers fall back to escaped plain text
    /// for that single render.
    MarkupRejected,
    Other(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Unchanged => write!(f, "content unchanged"),
            SinkError::MarkupRejected => write!(f, "markup rejected by sink"),
            SinkError::Other(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// One inline action offered on a displayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    /// Opaque command routed back through the inbound source.
    pub command: String,
}

impl Action {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
        }
    }
}

/// Action rows attached to a displayed message.
pub type ActionRows = Vec<Vec<Action>>;

/// Chat-platform outbound sink.
pub trait OutboundSink: Send + Sync {
    /// Sends a text message; returns the platform message handle.
    fn send_text(
        &self,
        target: i64,
        text: &str,
        mode: RenderMode,
        actions: Option<&ActionRows>,
    ) -> impl Future<Output = Result<i64, SinkError>> + Send;

    /// Sends media by platform handle with a caption.
    fn send_media(
        &self,
        target: i64,
        kind: ContentKind,
        media_handle: &str,
        caption: &str,
        mode: RenderMode,
        actions: Option<&ActionRows>,
    ) -> impl Future<Output = Result<i64, SinkError>> + Send;

    /// Edits a previously sent text message in place.
    fn edit_text(
        &self,
        target: i64,
        message_id: i64,
        text: &str,
        mode: RenderMode,
        actions: Option<&ActionRows>,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Edits the caption of a previously sent media message.
    fn edit_caption(
        &self,
        target: i64,
        message_id: i64,
        caption: &str,
        mode: RenderMode,
        actions: Option<&ActionRows>,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}
