// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Component descriptors: what a client runtime mounts at a boundary.
//!
//! A prerendered boundary carries two descriptors. The *preamble* opens the
//! boundary with the full record; the *epilogue* carries only the
//! `prerenderId` and closes it. A boundary that is not prerendered carries
//! the preamble alone.
//!
//! Server descriptors keep identity and parameters inside a protected
//! payload; only `kind`, `sequence`, `prerenderId` and `key` travel in the
//! clear. WebAssembly descriptors are fully plaintext since no server secret
//! is involved. Auto descriptors carry both halves.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::marker_key::BoundaryMarkerKey;
use crate::protect::{Clock, DataProtector, ProtectError};
use crate::render_mode::RenderMode;
use crate::{Parameter, TypeIdentity};

/// Purpose string scoping protected server descriptors.
pub const SERVER_DESCRIPTOR_PURPOSE: &str = "weft.components.server-descriptor.v1";

/// Default validity window of a protected server descriptor.
pub const DEFAULT_DESCRIPTOR_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Which runtime a descriptor targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorKind {
    /// Server-hosted component.
    Server,
    /// Client-hosted component.
    WebAssembly,
    /// Either runtime; the client chooses.
    Auto,
}

impl DescriptorKind {
    fn for_mode(mode: RenderMode) -> Result<Self, DescriptorError> {
        match mode {
            RenderMode::Server { .. } => Ok(DescriptorKind::Server),
            RenderMode::WebAssembly { .. } => Ok(DescriptorKind::WebAssembly),
            RenderMode::Auto { .. } => Ok(DescriptorKind::Auto),
            RenderMode::Static => Err(DescriptorError::UnsupportedRenderMode {
                mode: mode.display_name(),
            }),
        }
    }

    fn has_server_half(self) -> bool {
        matches!(self, DescriptorKind::Server | DescriptorKind::Auto)
    }

    fn has_client_half(self) -> bool {
        matches!(self, DescriptorKind::WebAssembly | DescriptorKind::Auto)
    }
}

/// Name and declared type of one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    /// Parameter name.
    pub name: String,
    /// Type name; `None` when the value is null.
    pub type_name: Option<String>,
    /// Assembly of the type; `None` when the value is null.
    pub assembly_name: Option<String>,
}

impl ParameterDefinition {
    fn of(parameter: &Parameter) -> Self {
        Self {
            name: parameter.name.clone(),
            type_name: parameter.type_identity.as_ref().map(|t| t.name.clone()),
            assembly_name: parameter.type_identity.as_ref().map(|t| t.assembly.clone()),
        }
    }
}

/// Plaintext sealed inside a server descriptor's protected payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerComponentPayload {
    /// Issue time, Unix seconds.
    pub timestamp: i64,
    /// Identifies the response that issued the descriptor.
    pub invocation_id: String,
    /// Position among the server descriptors of this invocation, from 0.
    pub sequence: u64,
    /// Assembly of the component type.
    pub assembly_name: String,
    /// Component type name.
    pub type_name: String,
    /// Parameter names and types.
    pub parameter_definitions: Vec<ParameterDefinition>,
    /// Parameter values, index-aligned with the definitions.
    pub parameter_values: Vec<Value>,
}

/// Errors raised while building or encoding a descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// The render mode has no client runtime to describe.
    #[error("render mode '{mode}' is not supported for interactive boundaries")]
    UnsupportedRenderMode {
        /// Display name of the offending mode.
        mode: &'static str,
    },
    /// JSON encoding failed.
    #[error("descriptor encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    /// The protection engine failed; passed through unchanged.
    #[error(transparent)]
    Protection(#[from] ProtectError),
}

/// Full in-memory record of one descriptor.
///
/// Only [`encode_comment`](Self::encode_comment) and
/// [`encode_attribute`](Self::encode_attribute) decide what leaves the
/// server; holding a field here does not mean it is exposed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComponentDescriptor {
    /// Target runtime; `None` on an epilogue.
    pub kind: Option<DescriptorKind>,
    /// Assembly of the component type.
    pub assembly_name: Option<String>,
    /// Component type name.
    pub type_name: Option<String>,
    /// Per-response boundary sequence.
    pub sequence: Option<u64>,
    /// Pairs a preamble with its epilogue; set only when prerendering.
    pub prerender_id: Option<String>,
    /// Marker key of the framed boundary.
    pub key: Option<BoundaryMarkerKey>,
    /// Parameter names and types.
    pub parameter_definitions: Option<Vec<ParameterDefinition>>,
    /// Parameter values.
    pub parameter_values: Option<Vec<Value>>,
    /// Protected server payload.
    pub protected_payload: Option<Vec<u8>>,
    /// Invocation that issued the server payload.
    pub invocation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Embedding {
    Comment,
    Attribute,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Embedded<T> {
    Json(T),
    Base64(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<DescriptorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assembly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prerender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameter_definitions: Option<Embedded<Vec<ParameterDefinition>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameter_values: Option<Embedded<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protected_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
}

fn embed<T: Serialize + Clone>(
    value: &T,
    embedding: Embedding,
) -> Result<Embedded<T>, DescriptorError> {
    match embedding {
        Embedding::Comment => Ok(Embedded::Json(value.clone())),
        Embedding::Attribute => Ok(Embedded::Base64(STANDARD.encode(serde_json::to_vec(value)?))),
    }
}

fn unembed<T: for<'de> Deserialize<'de>>(value: Embedded<T>) -> Option<T> {
    match value {
        Embedded::Json(v) => Some(v),
        Embedded::Base64(text) => {
            let bytes = STANDARD.decode(text).ok()?;
            serde_json::from_slice(&bytes).ok()
        }
    }
}

impl ComponentDescriptor {
    /// The epilogue closing `preamble`: same `prerenderId`, nothing else.
    pub fn epilogue_of(preamble: &ComponentDescriptor) -> ComponentDescriptor {
        ComponentDescriptor {
            prerender_id: preamble.prerender_id.clone(),
            ..ComponentDescriptor::default()
        }
    }

    /// True for an epilogue record.
    pub fn is_epilogue(&self) -> bool {
        self.kind.is_none()
    }

    fn wire(&self, embedding: Embedding) -> Result<WireDescriptor, DescriptorError> {
        let Some(kind) = self.kind else {
            return Ok(WireDescriptor {
                prerender_id: self.prerender_id.clone(),
                ..WireDescriptor::default()
            });
        };
        let mut wire = WireDescriptor {
            kind: Some(kind),
            sequence: self.sequence,
            prerender_id: self.prerender_id.clone(),
            key: self.key.as_ref().map(ToString::to_string),
            ..WireDescriptor::default()
        };
        if kind.has_server_half() {
            wire.protected_payload = self.protected_payload.as_ref().map(|p| STANDARD.encode(p));
        }
        if kind.has_client_half() {
            wire.assembly_name = self.assembly_name.clone();
            wire.type_name = self.type_name.clone();
            wire.parameter_definitions = self
                .parameter_definitions
                .as_ref()
                .map(|d| embed(d, embedding))
                .transpose()?;
            wire.parameter_values = self
                .parameter_values
                .as_ref()
                .map(|v| embed(v, embedding))
                .transpose()?;
        }
        Ok(wire)
    }

    /// JSON for embedding as HTML comment text.
    ///
    /// Parameters stay raw JSON. `<`, `>` and `&` are escaped as JSON unicode
    /// escapes so no value can terminate the comment.
    pub fn encode_comment(&self) -> Result<String, DescriptorError> {
        let json = serde_json::to_string(&self.wire(Embedding::Comment)?)?;
        Ok(json
            .replace('<', "\\u003c")
            .replace('>', "\\u003e")
            .replace('&', "\\u0026"))
    }

    /// JSON for embedding in an HTML attribute value (already attribute-escaped).
    ///
    /// Parameter definitions and values become base64 of their UTF-8 JSON.
    pub fn encode_attribute(&self) -> Result<String, DescriptorError> {
        let json = serde_json::to_string(&self.wire(Embedding::Attribute)?)?;
        Ok(crate::html::escape_attribute(&json))
    }

    /// Parse either embedding back into a descriptor.
    ///
    /// Returns `None` for malformed input (bad JSON, bad base64, bad key);
    /// never panics. Nothing parsed here is trusted: server payloads still
    /// have to pass [`ServerDescriptorVerifier`](crate::ServerDescriptorVerifier).
    pub fn parse_json(text: &str) -> Option<ComponentDescriptor> {
        let wire: WireDescriptor = serde_json::from_str(text).ok()?;
        let key = match wire.key {
            Some(k) => Some(BoundaryMarkerKey::try_parse(&k)?),
            None => None,
        };
        let protected_payload = match wire.protected_payload {
            Some(p) => Some(STANDARD.decode(p).ok()?),
            None => None,
        };
        let parameter_definitions = match wire.parameter_definitions {
            Some(d) => Some(unembed(d)?),
            None => None,
        };
        let parameter_values = match wire.parameter_values {
            Some(v) => Some(unembed(v)?),
            None => None,
        };
        Some(ComponentDescriptor {
            kind: wire.kind,
            assembly_name: wire.assembly_name,
            type_name: wire.type_name,
            sequence: wire.sequence,
            prerender_id: wire.prerender_id,
            key,
            parameter_definitions,
            parameter_values,
            protected_payload,
            invocation_id: wire.invocation_id,
        })
    }
}

/// What is being mounted at one boundary.
#[derive(Debug, Clone, Copy)]
pub struct MountRequest<'a> {
    /// Component type.
    pub type_identity: &'a TypeIdentity,
    /// Declared render mode.
    pub render_mode: RenderMode,
    /// Marker key framing the boundary.
    pub key: &'a BoundaryMarkerKey,
    /// Parameters the client must pass on activation.
    pub parameters: &'a [Parameter],
}

/// Issues descriptors for one response.
///
/// Owns the per-response boundary sequence (incremented once per emitted
/// boundary, whatever its kind) and the per-invocation server sequence that
/// is sealed inside protected payloads.
pub struct DescriptorFactory {
    protector: Arc<dyn DataProtector>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
    invocation_id: String,
    next_sequence: u64,
    next_server_sequence: u64,
}

impl std::fmt::Debug for DescriptorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorFactory")
            .field("invocation_id", &self.invocation_id)
            .field("next_sequence", &self.next_sequence)
            .field("next_server_sequence", &self.next_server_sequence)
            .finish_non_exhaustive()
    }
}

impl DescriptorFactory {
    /// Factory with a fresh invocation id.
    pub fn new(protector: Arc<dyn DataProtector>, clock: Arc<dyn Clock>, lifetime: Duration) -> Self {
        Self {
            protector,
            clock,
            lifetime,
            invocation_id: Uuid::new_v4().simple().to_string(),
            next_sequence: 0,
            next_server_sequence: 0,
        }
    }

    /// Invocation id sealed into every server payload of this response.
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Number of preambles issued so far.
    pub fn issued(&self) -> u64 {
        self.next_sequence
    }

    /// Build the opening descriptor for a boundary mount.
    ///
    /// `prerender_id` is populated iff `prerendering`. Server and Auto modes
    /// seal a [`ServerComponentPayload`] through the protector; protector
    /// failures propagate unchanged and consume no sequence number.
    pub fn build_preamble(
        &mut self,
        mount: &MountRequest<'_>,
        prerendering: bool,
    ) -> Result<ComponentDescriptor, DescriptorError> {
        let kind = DescriptorKind::for_mode(mount.render_mode)?;
        let definitions: Vec<ParameterDefinition> =
            mount.parameters.iter().map(ParameterDefinition::of).collect();
        let values: Vec<Value> = mount.parameters.iter().map(|p| p.value.clone()).collect();

        let mut descriptor = ComponentDescriptor {
            kind: Some(kind),
            assembly_name: Some(mount.type_identity.assembly.clone()),
            type_name: Some(mount.type_identity.name.clone()),
            sequence: Some(self.next_sequence),
            prerender_id: prerendering.then(|| Uuid::new_v4().simple().to_string()),
            key: Some(mount.key.clone()),
            parameter_definitions: Some(definitions.clone()),
            parameter_values: Some(values.clone()),
            protected_payload: None,
            invocation_id: None,
        };

        if kind.has_server_half() {
            let payload = ServerComponentPayload {
                timestamp: self.clock.now().unix_timestamp(),
                invocation_id: self.invocation_id.clone(),
                sequence: self.next_server_sequence,
                assembly_name: mount.type_identity.assembly.clone(),
                type_name: mount.type_identity.name.clone(),
                parameter_definitions: definitions,
                parameter_values: values,
            };
            let plaintext = serde_json::to_vec(&payload)?;
            let sealed =
                self.protector
                    .protect(SERVER_DESCRIPTOR_PURPOSE, &plaintext, self.lifetime)?;
            descriptor.protected_payload = Some(sealed);
            descriptor.invocation_id = Some(self.invocation_id.clone());
            self.next_server_sequence += 1;
        }

        self.next_sequence += 1;
        Ok(descriptor)
    }

    /// The epilogue for `preamble`.
    pub fn build_epilogue(preamble: &ComponentDescriptor) -> ComponentDescriptor {
        ComponentDescriptor::epilogue_of(preamble)
    }
}
