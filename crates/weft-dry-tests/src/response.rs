// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Response collection and page inspection.

use weft_proto::html::DESCRIPTOR_PREFIX;
use weft_proto::{ComponentDescriptor, STREAM_TERMINATOR};
use weft_stream::{ResponseHead, ResponsePart, ResponseStream};

/// Everything a [`ResponseStream`] delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedResponse {
    /// The head, if one was sent.
    pub head: Option<ResponseHead>,
    /// Body chunks in arrival order.
    pub chunks: Vec<String>,
}

impl CollectedResponse {
    /// Status code, if a head was sent.
    pub fn status(&self) -> Option<u16> {
        self.head.as_ref().map(|h| h.status)
    }

    /// `Location` header, if any.
    pub fn location(&self) -> Option<&str> {
        self.head.as_ref().and_then(|h| h.location.as_deref())
    }

    /// Whole body.
    pub fn body(&self) -> String {
        self.chunks.concat()
    }

    /// Whether the body ends with the stream terminator.
    pub fn is_terminated(&self) -> bool {
        self.body().ends_with(STREAM_TERMINATOR)
    }

    /// Preamble descriptors in the body, in document order.
    pub fn descriptors(&self) -> Vec<ComponentDescriptor> {
        descriptors_in(&self.body())
    }
}

/// Drain `stream` until the writer finishes.
pub async fn collect_response(mut stream: ResponseStream) -> CollectedResponse {
    let mut collected = CollectedResponse::default();
    while let Some(part) = stream.recv().await {
        match part {
            ResponsePart::Head(head) => collected.head = Some(head),
            ResponsePart::Body(bytes) => collected
                .chunks
                .push(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }
    collected
}

/// Preamble descriptors in `html`, skipping epilogues and unparsable comments.
pub fn descriptors_in(html: &str) -> Vec<ComponentDescriptor> {
    let mut found = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find(DESCRIPTOR_PREFIX) {
        let after = &rest[start + DESCRIPTOR_PREFIX.len()..];
        let Some(end) = after.find("-->") else {
            break;
        };
        if let Some(descriptor) = ComponentDescriptor::parse_json(&after[..end]) {
            if !descriptor.is_epilogue() {
                found.push(descriptor);
            }
        }
        rest = &after[end + 3..];
    }
    found
}
