// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! HTML framing for the streaming wire format.
//!
//! ```text
//! <!--Blazor:{descriptor}-->                 descriptor (comment embedding)
//! <!--bl:{payload}--> … <!--/bl:{payload}--> boundary marker pair
//! <template blazor-component-id="{id}">…</template>   out-of-band update
//! <template type="redirection">{url}</template>       out-of-band redirect
//! <template type="error">{message}</template>         out-of-band error
//! <blazor-ssr-end></blazor-ssr-end>                    stream terminator
//! ```
//!
//! A marker payload is either a [`BoundaryMarkerKey`] (interactive boundary)
//! or a decimal component id (streaming component). Keys always contain two
//! separators, ids never contain one, so the two cannot be confused.
//!
//! Payloads are percent-escaped inside markers (`%`, `-`, `<`, `>` and `!`
//! become `%XX`) so a developer key can never end or reopen the comment.
//! [`MarkerPair::boundary_key`] undoes the escaping.

use std::fmt::Write as _;
use std::ops::Range;

use crate::marker_key::{BoundaryMarkerKey, MarkerKeyGrammar};

/// Prefix of an open boundary marker comment.
pub const OPEN_MARKER_PREFIX: &str = "<!--bl:";
/// Prefix of a close boundary marker comment.
pub const CLOSE_MARKER_PREFIX: &str = "<!--/bl:";
/// Prefix of a descriptor comment.
pub const DESCRIPTOR_PREFIX: &str = "<!--Blazor:";
/// Written once when the stream closes; nothing may follow it.
pub const STREAM_TERMINATOR: &str = "<blazor-ssr-end></blazor-ssr-end>";

const COMMENT_END: &str = "-->";

/// Escape text content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    push_text(&mut out, text);
    out
}

/// Append `text` to `out`, escaping `&`, `<` and `>`.
pub fn push_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// Escape a double-quoted attribute value.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    push_attribute(&mut out, value);
    out
}

/// Append `value` to `out`, escaping it for a double-quoted attribute.
pub fn push_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// `<!--bl:{payload}-->`, with the payload escaped.
pub fn push_open_marker(out: &mut String, payload: &dyn std::fmt::Display) {
    out.push_str(OPEN_MARKER_PREFIX);
    push_marker_payload(out, &payload.to_string());
    out.push_str(COMMENT_END);
}

/// `<!--/bl:{payload}-->`, with the payload escaped.
pub fn push_close_marker(out: &mut String, payload: &dyn std::fmt::Display) {
    out.push_str(CLOSE_MARKER_PREFIX);
    push_marker_payload(out, &payload.to_string());
    out.push_str(COMMENT_END);
}

/// Escape `payload` for use inside a marker comment.
pub fn encode_marker_payload(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    push_marker_payload(&mut out, payload);
    out
}

fn push_marker_payload(out: &mut String, payload: &str) {
    for c in payload.chars() {
        match c {
            '%' | '-' | '<' | '>' | '!' => {
                let _ = write!(out, "%{:02X}", u32::from(c));
            }
            _ => out.push(c),
        }
    }
}

/// Inverse of [`encode_marker_payload`].
///
/// Returns `None` for a truncated or non-hex escape, or bytes that are not UTF-8.
pub fn decode_marker_payload(payload: &str) -> Option<String> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = payload.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// `<!--Blazor:{json}-->`; `json` must come from
/// [`ComponentDescriptor::encode_comment`](crate::ComponentDescriptor::encode_comment).
pub fn push_descriptor_comment(out: &mut String, json: &str) {
    out.push_str(DESCRIPTOR_PREFIX);
    out.push_str(json);
    out.push_str(COMMENT_END);
}

/// Out-of-band update for one component. `html` is emitted verbatim.
pub fn component_fragment(component_id: u64, html: &str) -> String {
    format!("<template blazor-component-id=\"{component_id}\">{html}</template>")
}

/// Out-of-band redirect to an absolute URL.
pub fn redirection_fragment(url: &str) -> String {
    format!("<template type=\"redirection\">{}</template>", escape_text(url))
}

/// Out-of-band error report; `message` is escaped.
pub fn error_fragment(message: &str) -> String {
    format!("<template type=\"error\">{}</template>", escape_text(message))
}

/// One open/close marker pair found by [`MarkerScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPair {
    /// Escaped text between `bl:` and `-->`, identical on both markers.
    pub payload: String,
    /// Byte range of the content between the two markers.
    pub inner: Range<usize>,
    /// Number of enclosing pairs.
    pub depth: usize,
}

impl MarkerPair {
    /// The unescaped payload as a boundary key under `grammar`.
    pub fn boundary_key(&self, grammar: MarkerKeyGrammar) -> Option<BoundaryMarkerKey> {
        grammar.try_parse(&decode_marker_payload(&self.payload)?)
    }

    /// The payload as a streaming component id.
    pub fn component_id(&self) -> Option<u64> {
        if self.payload.is_empty() || !self.payload.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.payload.parse().ok()
    }
}

/// Why a marker scan failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// A close marker without a matching open marker on top of the stack.
    #[error("close marker '{payload}' at byte {offset} does not match an open marker")]
    Unmatched {
        /// Payload of the stray close marker.
        payload: String,
        /// Byte offset of the close marker.
        offset: usize,
    },
    /// Open markers left at end of input.
    #[error("{count} marker(s) left open")]
    Unclosed {
        /// How many were left open.
        count: usize,
    },
    /// A marker comment without `-->`.
    #[error("unterminated marker comment at byte {offset}")]
    Unterminated {
        /// Byte offset of the marker.
        offset: usize,
    },
}

/// Pairs boundary markers in emitted HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerScanner {
    grammar: MarkerKeyGrammar,
}

impl MarkerScanner {
    /// Scanner using the [`FreeTrailingSegment`](MarkerKeyGrammar::FreeTrailingSegment) grammar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scanner using `grammar` for [`boundary_keys`](Self::boundary_keys).
    pub fn with_grammar(grammar: MarkerKeyGrammar) -> Self {
        Self { grammar }
    }

    /// Every marker pair in `html`, in order of their close markers.
    pub fn scan(&self, html: &str) -> Result<Vec<MarkerPair>, ScanError> {
        let mut open: Vec<(String, usize)> = Vec::new();
        let mut pairs = Vec::new();
        let mut cursor = 0;
        while let Some(found) = html[cursor..].find("<!--") {
            let start = cursor + found;
            let rest = &html[start..];
            let (is_close, prefix_len) = if rest.starts_with(OPEN_MARKER_PREFIX) {
                (false, OPEN_MARKER_PREFIX.len())
            } else if rest.starts_with(CLOSE_MARKER_PREFIX) {
                (true, CLOSE_MARKER_PREFIX.len())
            } else {
                // Some other comment: skip past it.
                cursor = match rest.find(COMMENT_END) {
                    Some(end) => start + end + COMMENT_END.len(),
                    None => html.len(),
                };
                continue;
            };
            let body_start = start + prefix_len;
            let end = html[body_start..]
                .find(COMMENT_END)
                .ok_or(ScanError::Unterminated { offset: start })?;
            let payload = &html[body_start..body_start + end];
            let after = body_start + end + COMMENT_END.len();
            if is_close {
                match open.pop() {
                    Some((p, inner_start)) if p == payload => pairs.push(MarkerPair {
                        payload: p,
                        inner: inner_start..start,
                        depth: open.len(),
                    }),
                    _ => {
                        return Err(ScanError::Unmatched {
                            payload: payload.to_owned(),
                            offset: start,
                        })
                    }
                }
            } else {
                open.push((payload.to_owned(), after));
            }
            cursor = after;
        }
        if !open.is_empty() {
            return Err(ScanError::Unclosed { count: open.len() });
        }
        Ok(pairs)
    }

    /// Boundary keys of every pair whose payload parses under this scanner's grammar.
    pub fn boundary_keys(&self, html: &str) -> Result<Vec<BoundaryMarkerKey>, ScanError> {
        Ok(self
            .scan(html)?
            .iter()
            .filter_map(|pair| pair.boundary_key(self.grammar))
            .collect())
    }
}
