// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Streaming server rendering for weft.
//!
//! One HTTP response is produced by one [`StreamingWriter`] actor. The tree
//! renderer (an external collaborator behind [`TreeRenderer`]) reaches the
//! writer only through a [`RenderSink`], whose calls become messages on a
//! single-consumer queue. The writer processes those messages strictly in
//! arrival order, so tracker, mirror and descriptor state never need a lock.
//!
//! ```text
//! Orchestrator ─► TreeRenderer ──RenderSink──► StreamingWriter ─► ResponseWriter ─► host
//!                                                 │
//!                                    QuiescenceTracker, TreeMirror,
//!                                    InteractivityBoundary, DescriptorFactory
//! ```
#![forbid(unsafe_code)]

mod boundary;
mod compose;
mod error;
mod modes;
mod orchestrator;
mod quiescence;
mod renderer;
mod response;
mod tree;
mod url;
mod writer;

pub use boundary::{get_component_marker_key, InteractivityBoundary, IssuedBoundary, OpenBoundary};
pub use error::{ComponentError, ConfigurationError, ErrorDetail, RenderError, GENERIC_ERROR_MESSAGE};
pub use modes::{ConfiguredRenderModes, InvokedRenderModes};
pub use orchestrator::{
    BootstrapAssets, Completion, EndpointOptions, Orchestrator, PreparedRender, RenderOutcome,
    RenderRequest,
};
pub use quiescence::{QuiescenceSignal, QuiescenceState, QuiescenceTracker, Region, TaskId};
pub use renderer::{RenderEvent, RenderSink, RootComponent, TreeRenderer};
pub use response::{response_channel, ResponseHead, ResponsePart, ResponseStream, ResponseWriter};
pub use tree::{ComponentId, ComponentInfo, Frame, RenderBatch, TreeMirror};
pub use url::resolve_url;
pub use writer::{StreamingWriter, WriterState};

pub use weft_proto::{
    BoundaryMarkerKey, ComponentKey, InteractiveKind, Parameter, RenderMode, TypeIdentity,
};
