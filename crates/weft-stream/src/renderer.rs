// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Port to the tree renderer, and the sink through which it reaches the writer.

use std::future::Future;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use weft_proto::{ComponentKey, Parameter, TypeIdentity};

use crate::error::ComponentError;
use crate::quiescence::{Region, TaskId};
use crate::tree::{ComponentId, RenderBatch};

/// The component a response is rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct RootComponent {
    /// Root component type.
    pub type_identity: TypeIdentity,
    /// Developer key of the root, usually none.
    pub key: ComponentKey,
}

impl RootComponent {
    /// Root of type `type_identity` with no key.
    pub fn new(type_identity: TypeIdentity) -> Self {
        Self {
            type_identity,
            key: ComponentKey::None,
        }
    }
}

/// The component tree renderer.
///
/// One instance serves one response. The future returned by
/// [`render_root_component`](Self::render_root_component) is the root's
/// render task: the response cannot flush before it resolves. Work that
/// outlives it must be registered through the [`RenderSink`].
pub trait TreeRenderer: Send + 'static {
    /// Assign the id of the root component.
    fn assign_root_component_id(&mut self, root: &RootComponent) -> ComponentId;

    /// Render the root component, reporting every batch through `sink`.
    fn render_root_component(
        &mut self,
        id: ComponentId,
        parameters: Vec<Parameter>,
        sink: RenderSink,
    ) -> BoxFuture<'static, Result<(), ComponentError>>;
}

/// Message from the renderer side to the writer actor.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// A subtree task became pending.
    TaskStarted {
        /// Task handle.
        task: TaskId,
        /// Partition it belongs to.
        region: Region,
    },
    /// A subtree task settled.
    TaskSettled {
        /// Task handle.
        task: TaskId,
    },
    /// A render batch.
    Batch(RenderBatch),
    /// A component asked to navigate to `url` (relative or absolute).
    Navigate {
        /// Navigation target.
        url: String,
    },
    /// Component logic failed.
    Failed(ComponentError),
    /// The renderer has nothing more to say.
    EndOfStream,
}

/// The renderer's handle on the writer.
///
/// Cloneable and `Send`; every call becomes a [`RenderEvent`] processed by
/// the writer in arrival order. Calls after the writer finished are dropped.
#[derive(Debug, Clone)]
pub struct RenderSink {
    tx: mpsc::UnboundedSender<RenderEvent>,
}

impl RenderSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<RenderEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: RenderEvent) {
        if self.tx.send(event).is_err() {
            debug!("render event dropped: writer finished");
        }
    }

    /// Report a render batch.
    pub fn update_display(&self, batch: RenderBatch) {
        self.send(RenderEvent::Batch(batch));
    }

    /// Navigate to `url`, resolved against the request's base URI.
    pub fn navigate(&self, url: impl Into<String>) {
        self.send(RenderEvent::Navigate { url: url.into() });
    }

    /// Report a component failure.
    pub fn fail(&self, error: ComponentError) {
        self.send(RenderEvent::Failed(error));
    }

    /// Register a pending task in `region`.
    pub fn begin(&self, region: Region) -> TaskId {
        let task = TaskId::next();
        self.send(RenderEvent::TaskStarted { task, region });
        task
    }

    /// Register a pending streaming task.
    pub fn begin_streaming(&self) -> TaskId {
        self.begin(Region::Streaming)
    }

    /// Register a pending non-streaming task.
    pub fn begin_non_streaming(&self) -> TaskId {
        self.begin(Region::NonStreaming)
    }

    /// Settle a task registered with [`begin`](Self::begin).
    pub fn settle(&self, task: TaskId) {
        self.send(RenderEvent::TaskSettled { task });
    }

    /// Declare the stream complete.
    pub fn complete(&self) {
        self.send(RenderEvent::EndOfStream);
    }

    /// Run `work` as a tracked subtree task in `region`.
    ///
    /// A failure is reported with [`fail`](Self::fail). The task settles
    /// when `work` resolves. If the response is aborted first, `work` is
    /// dropped and nothing is reported.
    pub fn spawn_subtree<F>(&self, region: Region, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), ComponentError>> + Send + 'static,
    {
        let task = self.begin(region);
        self.run_task(task, work)
    }

    pub(crate) fn run_task<F>(&self, task: TaskId, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), ComponentError>> + Send + 'static,
    {
        let sink = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = sink.closed() => {
                    debug!(%task, "subtree cancelled");
                }
                result = work => {
                    if let Err(error) = result {
                        sink.fail(error);
                    }
                    sink.settle(task);
                }
            }
        })
    }

    /// Resolves once the writer finished (completed, failed or aborted).
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    /// Whether the writer finished.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
