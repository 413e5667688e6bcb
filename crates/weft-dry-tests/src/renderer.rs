// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tree renderers for tests.

use std::future::Future;

use futures_util::future::BoxFuture;
use weft_proto::Parameter;
use weft_stream::{ComponentError, ComponentId, RenderBatch, RenderSink, RootComponent, TreeRenderer};

/// Renderer whose root render is a closure.
///
/// The closure receives the root id, the root parameters and the sink,
/// and returns the root render future.
pub struct FnRenderer<F> {
    root: ComponentId,
    render: F,
}

impl<F> std::fmt::Debug for FnRenderer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnRenderer")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl<F> FnRenderer<F> {
    /// Renderer assigning `root` as the root id.
    pub fn new<Fut>(root: u64, render: F) -> Self
    where
        F: FnMut(ComponentId, Vec<Parameter>, RenderSink) -> Fut,
        Fut: Future<Output = Result<(), ComponentError>>,
    {
        Self {
            root: ComponentId(root),
            render,
        }
    }
}

impl<F, Fut> TreeRenderer for FnRenderer<F>
where
    F: FnMut(ComponentId, Vec<Parameter>, RenderSink) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ComponentError>> + Send + 'static,
{
    fn assign_root_component_id(&mut self, _root: &RootComponent) -> ComponentId {
        self.root
    }

    fn render_root_component(
        &mut self,
        id: ComponentId,
        parameters: Vec<Parameter>,
        sink: RenderSink,
    ) -> BoxFuture<'static, Result<(), ComponentError>> {
        Box::pin((self.render)(id, parameters, sink))
    }
}

/// Renderer that reports one batch from the root render and finishes.
#[derive(Debug, Clone)]
pub struct StaticRenderer {
    root: ComponentId,
    batch: RenderBatch,
}

impl StaticRenderer {
    /// Renderer reporting `batch` under root id `root`.
    pub fn new(root: u64, batch: RenderBatch) -> Self {
        Self {
            root: ComponentId(root),
            batch,
        }
    }
}

impl TreeRenderer for StaticRenderer {
    fn assign_root_component_id(&mut self, _root: &RootComponent) -> ComponentId {
        self.root
    }

    fn render_root_component(
        &mut self,
        _id: ComponentId,
        _parameters: Vec<Parameter>,
        sink: RenderSink,
    ) -> BoxFuture<'static, Result<(), ComponentError>> {
        let batch = std::mem::take(&mut self.batch);
        Box::pin(async move {
            sink.update_display(batch);
            Ok(())
        })
    }
}
