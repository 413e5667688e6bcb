// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Top-level entry point: one call renders one response.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, instrument};
use weft_proto::{
    Clock, DataProtector, DescriptorFactory, InteractiveKind, Parameter, SystemClock,
    DEFAULT_DESCRIPTOR_LIFETIME,
};

use crate::compose::BoundaryContext;
use crate::error::{ComponentError, ErrorDetail, RenderError};
use crate::modes::{ConfiguredRenderModes, InvokedRenderModes};
use crate::quiescence::{QuiescenceSignal, Region, TaskId};
use crate::renderer::{RenderSink, RootComponent, TreeRenderer};
use crate::response::ResponseWriter;
use crate::tree::ComponentId;
use crate::writer::{StreamingWriter, WriterConfig};

/// Client runtime scripts referenced when a response invokes a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAssets {
    /// Script for the server-hosted runtime.
    pub server_script: String,
    /// Script for the WebAssembly runtime.
    pub webassembly_script: String,
}

impl BootstrapAssets {
    /// Script path for `kind`.
    pub fn script_for(&self, kind: InteractiveKind) -> &str {
        match kind {
            InteractiveKind::Server => &self.server_script,
            InteractiveKind::WebAssembly => &self.webassembly_script,
        }
    }
}

impl Default for BootstrapAssets {
    fn default() -> Self {
        Self {
            server_script: "/_framework/weft.server.js".to_owned(),
            webassembly_script: "/_framework/weft.webassembly.js".to_owned(),
        }
    }
}

/// Endpoint-level settings shared by every response it renders.
#[derive(Clone)]
pub struct EndpointOptions {
    /// Registered providers; `None` leaves the endpoint unconstrained.
    pub configured: Option<ConfiguredRenderModes>,
    /// Seals server descriptors.
    pub protector: Arc<dyn DataProtector>,
    /// Timestamps sealed payloads.
    pub clock: Arc<dyn Clock>,
    /// Validity window of sealed payloads.
    pub descriptor_lifetime: Duration,
    /// Error fragment policy.
    pub error_detail: ErrorDetail,
    /// Client runtime scripts.
    pub bootstrap: BootstrapAssets,
}

impl std::fmt::Debug for EndpointOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointOptions")
            .field("configured", &self.configured)
            .field("descriptor_lifetime", &self.descriptor_lifetime)
            .field("error_detail", &self.error_detail)
            .field("bootstrap", &self.bootstrap)
            .finish_non_exhaustive()
    }
}

impl EndpointOptions {
    /// Unconstrained endpoint using `protector`, the system clock and defaults.
    pub fn new(protector: Arc<dyn DataProtector>) -> Self {
        Self {
            configured: None,
            protector,
            clock: Arc::new(SystemClock),
            descriptor_lifetime: DEFAULT_DESCRIPTOR_LIFETIME,
            error_detail: ErrorDetail::default(),
            bootstrap: BootstrapAssets::default(),
        }
    }

    /// Constrain the endpoint to `configured`.
    pub fn with_configured(mut self, configured: ConfiguredRenderModes) -> Self {
        self.configured = Some(configured);
        self
    }

    /// Use `clock` for descriptor timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `detail` for error fragments.
    pub fn with_error_detail(mut self, detail: ErrorDetail) -> Self {
        self.error_detail = detail;
        self
    }

    /// Use `lifetime` for sealed payloads.
    pub fn with_descriptor_lifetime(mut self, lifetime: Duration) -> Self {
        self.descriptor_lifetime = lifetime;
        self
    }

    /// Use `bootstrap` for client runtime scripts.
    pub fn with_bootstrap(mut self, bootstrap: BootstrapAssets) -> Self {
        self.bootstrap = bootstrap;
        self
    }
}

/// What to render for one request.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Root component.
    pub root: RootComponent,
    /// Root parameters.
    pub parameters: Vec<Parameter>,
    /// Absolute request URI; navigation targets resolve against it.
    pub base_uri: String,
    /// Hold the first flush until every task settled, streaming ones included.
    pub await_quiescence: bool,
    /// Treat every task as non-streaming for this response.
    pub prevent_streaming: bool,
}

impl RenderRequest {
    /// Streaming render of `root` at `base_uri` with no parameters.
    pub fn new(root: RootComponent, base_uri: impl Into<String>) -> Self {
        Self {
            root,
            parameters: Vec::new(),
            base_uri: base_uri.into(),
            await_quiescence: false,
            prevent_streaming: false,
        }
    }
}

/// How a response ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Terminator written.
    Completed,
    /// Navigation ended the response.
    Redirected {
        /// Absolute target.
        location: String,
        /// `false`: 302 with `Location`; `true`: redirection fragment in a 200 body.
        after_commit: bool,
    },
}

/// Result of a successful render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    /// How the response ended.
    pub completion: Completion,
    /// Interactive kinds the response used.
    pub invoked: InvokedRenderModes,
    /// Out-of-band fragments written after the initial flush.
    pub fragments: usize,
    /// Root component id.
    pub root: ComponentId,
}

/// Renders responses for one endpoint.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    options: Arc<EndpointOptions>,
}

impl Orchestrator {
    /// Orchestrator for an endpoint configured by `options`.
    pub fn new(options: EndpointOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Endpoint settings.
    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    /// Set up a render without starting it.
    ///
    /// Nothing runs until [`PreparedRender::run`]; the returned value can
    /// hand out a [`QuiescenceSignal`] first.
    pub fn prepare<R: TreeRenderer>(
        &self,
        mut renderer: R,
        request: RenderRequest,
        response: ResponseWriter,
    ) -> PreparedRender {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = RenderSink::new(tx);
        let root = renderer.assign_root_component_id(&request.root);
        let boundaries = BoundaryContext::new(
            self.options.configured,
            DescriptorFactory::new(
                Arc::clone(&self.options.protector),
                Arc::clone(&self.options.clock),
                self.options.descriptor_lifetime,
            ),
        );
        let config = WriterConfig {
            root,
            base_uri: request.base_uri,
            await_quiescence: request.await_quiescence,
            prevent_streaming: request.prevent_streaming,
            error_detail: self.options.error_detail,
            bootstrap: self.options.bootstrap.clone(),
        };
        let mut writer = StreamingWriter::new(rx, response, boundaries, config);
        let root_task = TaskId::next();
        writer.begin_task(root_task, Region::NonStreaming);
        let root_render = renderer.render_root_component(root, request.parameters, sink.clone());
        PreparedRender {
            writer,
            sink,
            root_task,
            root_render,
        }
    }

    /// Render one response into `response`.
    pub async fn render<R: TreeRenderer>(
        &self,
        renderer: R,
        request: RenderRequest,
        response: ResponseWriter,
    ) -> Result<RenderOutcome, RenderError> {
        self.prepare(renderer, request, response).run().await
    }
}

/// A render that has been set up but not started.
pub struct PreparedRender {
    writer: StreamingWriter,
    sink: RenderSink,
    root_task: TaskId,
    root_render: BoxFuture<'static, Result<(), ComponentError>>,
}

impl std::fmt::Debug for PreparedRender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedRender")
            .field("writer", &self.writer)
            .field("root_task", &self.root_task)
            .finish_non_exhaustive()
    }
}

impl PreparedRender {
    /// Observer for this response's quiescence.
    pub fn quiescence(&self) -> QuiescenceSignal {
        self.writer.quiescence()
    }

    /// Start the root render and drive the writer to completion.
    ///
    /// When the writer finishes for any reason, outstanding subtree tasks
    /// are cancelled and the root render is aborted.
    #[instrument(skip_all, fields(root_task = %self.root_task))]
    pub async fn run(self) -> Result<RenderOutcome, RenderError> {
        let PreparedRender {
            writer,
            sink,
            root_task,
            root_render,
        } = self;
        let root = sink.run_task(root_task, root_render);
        drop(sink);
        let result = writer.run().await;
        root.abort();
        debug!("root render released");
        result
    }
}
