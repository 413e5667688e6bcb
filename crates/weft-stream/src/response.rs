// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Response channel between the writer actor and the HTTP host.
//!
//! The writer sends exactly one [`ResponsePart::Head`] followed by any
//! number of body chunks. Dropping the [`ResponseStream`] is how the host
//! reports an aborted connection.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::RenderError;

/// Content type of every streamed page.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code.
    pub status: u16,
    /// `Location` header, set for redirects.
    pub location: Option<String>,
    /// `Content-Type` header, if any.
    pub content_type: Option<&'static str>,
}

impl ResponseHead {
    /// `200 OK` with an HTML body.
    pub fn ok_html() -> Self {
        Self {
            status: 200,
            location: None,
            content_type: Some(HTML_CONTENT_TYPE),
        }
    }

    /// `302 Found` to `location`, no body.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            location: Some(location.into()),
            content_type: None,
        }
    }

    /// Whether this head is a 3xx redirect.
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// One piece of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    /// Status and headers; always first.
    Head(ResponseHead),
    /// A chunk of body bytes.
    Body(Bytes),
}

/// Create a response channel holding up to `capacity` unread parts.
pub fn response_channel(capacity: usize) -> (ResponseWriter, ResponseStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ResponseWriter {
            tx,
            head_sent: false,
        },
        ResponseStream { rx },
    )
}

/// Writing half, owned by the streaming writer.
#[derive(Debug)]
pub struct ResponseWriter {
    tx: mpsc::Sender<ResponsePart>,
    head_sent: bool,
}

impl ResponseWriter {
    /// Whether the head went out.
    pub fn head_sent(&self) -> bool {
        self.head_sent
    }

    /// Send the head. Sending a second head is a no-op.
    pub(crate) async fn send_head(&mut self, head: ResponseHead) -> Result<(), RenderError> {
        if self.head_sent {
            return Ok(());
        }
        self.head_sent = true;
        self.send(ResponsePart::Head(head)).await
    }

    /// Send a body chunk; empty chunks are skipped.
    pub(crate) async fn send_body(&mut self, chunk: String) -> Result<(), RenderError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.send(ResponsePart::Body(Bytes::from(chunk))).await
    }

    async fn send(&self, part: ResponsePart) -> Result<(), RenderError> {
        self.tx.send(part).await.map_err(|_| RenderError::Aborted)
    }

    /// Resolves once the host dropped the [`ResponseStream`].
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    /// Whether the host dropped the [`ResponseStream`].
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Reading half, owned by the HTTP host.
#[derive(Debug)]
pub struct ResponseStream {
    rx: mpsc::Receiver<ResponsePart>,
}

impl ResponseStream {
    /// Next part, or `None` once the writer finished.
    pub async fn recv(&mut self) -> Option<ResponsePart> {
        self.rx.recv().await
    }
}
