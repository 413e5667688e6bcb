// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire protocol for weft's streaming server renderer.
//!
//! Everything in this crate is synchronous and allocation-only: it describes
//! *what* goes on the wire, not *when*. The streaming core (`weft-stream`)
//! decides when to emit the pieces defined here.
//!
//! # Contents
//!
//! - [`render_mode`] - the closed set of render modes and interactive kinds
//! - [`marker_key`] - boundary marker keys and their two text grammars
//! - [`descriptor`] - component descriptors (what the client runtime mounts)
//! - [`protect`] - the protection port and a keyed reference protector
//! - [`verify`] - server-side verification of descriptors echoed by clients
//! - [`html`] - HTML framing (markers, out-of-band templates) and a marker scanner
#![forbid(unsafe_code)]

pub mod descriptor;
pub mod html;
pub mod marker_key;
pub mod protect;
pub mod render_mode;
pub mod verify;

pub use descriptor::{
    ComponentDescriptor, DescriptorError, DescriptorFactory, DescriptorKind, MountRequest,
    ParameterDefinition, ServerComponentPayload, DEFAULT_DESCRIPTOR_LIFETIME,
    SERVER_DESCRIPTOR_PURPOSE,
};
pub use html::{MarkerPair, MarkerScanner, ScanError, STREAM_TERMINATOR};
pub use marker_key::{BoundaryMarkerKey, ComponentKey, LocationHash, MarkerKeyGrammar};
pub use protect::{Clock, DataProtector, FixedClock, KeyedProtector, ProtectError, SystemClock};
pub use render_mode::{InteractiveKind, RenderMode};
pub use verify::{ServerDescriptorVerifier, VerifyError};

use serde::{Deserialize, Serialize};

/// Identity of a component or parameter type.
///
/// `assembly` names the unit the type ships in (crate, bundle, module) and
/// `name` the type within it. The pair is what a client runtime needs to
/// locate the type again.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeIdentity {
    /// Shipping unit that contains the type.
    pub assembly: String,
    /// Type name within the shipping unit.
    pub name: String,
}

impl TypeIdentity {
    /// Build an identity from its two parts.
    pub fn new(assembly: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            assembly: assembly.into(),
            name: name.into(),
        }
    }

    /// `assembly/name`, used for hashing and diagnostics.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.assembly, self.name)
    }
}

impl std::fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.assembly, self.name)
    }
}

/// One named parameter supplied to a component.
///
/// `type_identity` is `None` when the value is JSON `null`; the client cannot
/// infer a type from a missing value and the descriptor says so explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name as declared by the component.
    pub name: String,
    /// Declared type of the value, if the value is non-null.
    pub type_identity: Option<TypeIdentity>,
    /// JSON encoding of the value.
    pub value: serde_json::Value,
}

impl Parameter {
    /// A typed, non-null parameter.
    pub fn new(
        name: impl Into<String>,
        type_identity: TypeIdentity,
        value: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            type_identity: Some(type_identity),
            value,
        }
    }

    /// A parameter whose value is `null`.
    pub fn null(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_identity: None,
            value: serde_json::Value::Null,
        }
    }
}
