// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The streaming writer actor: sole owner of one response body.
//!
//! ```text
//! Buffering ──initial flush──► Flushed ──quiescent / end of stream──► Closed
//!     │                           │
//!     └─ navigate: 302, Closed    └─ navigate: redirection fragment, Closed
//! ```
//!
//! Events are drained in cycles: everything already queued is handled in
//! order, then pending out-of-band fragments are emitted. The initial flush
//! is checked after every event so it happens exactly when readiness is
//! reached; fragments and closing are decided at the end of a cycle, which
//! collapses repeated renders of one component into a single fragment.

use std::collections::HashSet;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, instrument, warn};
use weft_proto::html::{component_fragment, error_fragment, redirection_fragment, STREAM_TERMINATOR};

use crate::compose::{BoundaryContext, Composer};
use crate::error::{ComponentError, ComposeError, ErrorDetail, RenderError};
use crate::modes::InvokedRenderModes;
use crate::orchestrator::{BootstrapAssets, Completion, RenderOutcome};
use crate::quiescence::{QuiescenceSignal, QuiescenceTracker, Region, TaskId};
use crate::renderer::RenderEvent;
use crate::response::{ResponseHead, ResponseWriter};
use crate::tree::{ComponentId, RenderBatch, TreeMirror};
use crate::url::resolve_url;

/// Where the writer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing written yet.
    Buffering,
    /// Initial HTML written; later updates go out as fragments.
    Flushed,
    /// Nothing more may be written.
    Closed,
}

/// Per-response writer settings.
#[derive(Debug, Clone)]
pub(crate) struct WriterConfig {
    pub(crate) root: ComponentId,
    pub(crate) base_uri: String,
    pub(crate) await_quiescence: bool,
    pub(crate) prevent_streaming: bool,
    pub(crate) error_detail: ErrorDetail,
    pub(crate) bootstrap: BootstrapAssets,
}

/// Updated components awaiting emission in the current cycle.
#[derive(Debug, Default)]
struct PendingUpdates {
    order: Vec<ComponentId>,
    seen: HashSet<ComponentId>,
}

impl PendingUpdates {
    fn record(&mut self, id: ComponentId) {
        if self.seen.insert(id) {
            self.order.push(id);
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    /// Still-mounted ids with no pending ancestor, in first-update order.
    fn take_top_level(&mut self, mirror: &TreeMirror) -> Vec<ComponentId> {
        let order = std::mem::take(&mut self.order);
        let seen = std::mem::take(&mut self.seen);
        order
            .into_iter()
            .filter(|id| mirror.contains(*id))
            .filter(|id| !mirror.ancestors(*id).any(|a| seen.contains(&a)))
            .collect()
    }
}

/// Drives one response from render events to body bytes.
#[derive(Debug)]
pub struct StreamingWriter {
    events: mpsc::UnboundedReceiver<RenderEvent>,
    response: ResponseWriter,
    tracker: QuiescenceTracker,
    mirror: TreeMirror,
    boundaries: BoundaryContext,
    config: WriterConfig,
    state: WriterState,
    pending: PendingUpdates,
    fragments: usize,
}

enum Wake {
    Aborted,
    Event(Option<RenderEvent>),
}

type Step = Result<Option<Completion>, RenderError>;

impl StreamingWriter {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<RenderEvent>,
        response: ResponseWriter,
        boundaries: BoundaryContext,
        config: WriterConfig,
    ) -> Self {
        Self {
            events,
            response,
            tracker: QuiescenceTracker::new(config.prevent_streaming),
            mirror: TreeMirror::new(),
            boundaries,
            config,
            state: WriterState::Buffering,
            pending: PendingUpdates::default(),
            fragments: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Observer for this response's quiescence.
    pub fn quiescence(&self) -> QuiescenceSignal {
        self.tracker.subscribe()
    }

    pub(crate) fn begin_task(&mut self, task: TaskId, region: Region) {
        self.tracker.begin(task, region);
    }

    /// Process events until the response completes or fails.
    #[instrument(skip_all, fields(root = %self.config.root))]
    pub async fn run(mut self) -> Result<RenderOutcome, RenderError> {
        let result = self.drive().await;
        match &result {
            Ok(completion) => info!(?completion, fragments = self.fragments, "response complete"),
            Err(RenderError::Aborted) => info!("response aborted by client"),
            Err(err) => warn!(%err, reported = err.reported_to_client(), "response failed"),
        }
        result.map(|completion| RenderOutcome {
            completion,
            invoked: self.boundaries.invoked,
            fragments: self.fragments,
            root: self.config.root,
        })
    }

    async fn drive(&mut self) -> Result<Completion, RenderError> {
        loop {
            let wake = tokio::select! {
                biased;
                () = self.response.closed() => Wake::Aborted,
                event = self.events.recv() => Wake::Event(event),
            };
            let mut next = match wake {
                Wake::Aborted => return Err(RenderError::Aborted),
                Wake::Event(event) => event,
            };
            loop {
                let Some(event) = next else {
                    debug!("render sinks dropped");
                    return self.close().await;
                };
                if let Some(done) = self.handle(event).await? {
                    return Ok(done);
                }
                next = match self.events.try_recv() {
                    Ok(event) => Some(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => None,
                };
            }
            if let Some(done) = self.end_cycle().await? {
                return Ok(done);
            }
        }
    }

    async fn handle(&mut self, event: RenderEvent) -> Step {
        match event {
            RenderEvent::TaskStarted { task, region } => {
                self.tracker.begin(task, region);
                Ok(None)
            }
            RenderEvent::TaskSettled { task } => {
                self.tracker.settle(task);
                self.maybe_flush().await
            }
            RenderEvent::Batch(batch) => {
                self.apply(&batch);
                self.maybe_flush().await
            }
            RenderEvent::Navigate { url } => self.navigate(&url).await,
            RenderEvent::Failed(error) => self.fail(error).await,
            RenderEvent::EndOfStream => self.close().await.map(Some),
        }
    }

    fn apply(&mut self, batch: &RenderBatch) {
        for info in &batch.mounted {
            self.boundaries.forget(info.id);
        }
        for id in &batch.disposed {
            self.boundaries.forget(*id);
        }
        self.mirror.apply(batch);
        if self.state == WriterState::Flushed {
            for id in batch.updated_ids() {
                self.pending.record(id);
            }
        }
    }

    fn flush_ready(&self) -> bool {
        let tasks_ready = if self.config.await_quiescence {
            self.tracker.fully_quiescent()
        } else {
            self.tracker.initial_flush_ready()
        };
        tasks_ready
            && (self.mirror.is_rendered(self.config.root) || self.tracker.fully_quiescent())
    }

    async fn maybe_flush(&mut self) -> Step {
        if self.state == WriterState::Buffering && self.flush_ready() {
            self.flush_initial().await?;
        }
        Ok(None)
    }

    async fn flush_initial(&mut self) -> Result<(), RenderError> {
        let html = Composer::new(&self.mirror, &mut self.boundaries, !self.config.prevent_streaming)
            .component_html(self.config.root)
            .map_err(|err| err.into_render_error(false))?;
        self.response.send_head(ResponseHead::ok_html()).await?;
        self.response.send_body(html).await?;
        self.pending.clear();
        self.state = WriterState::Flushed;
        info!(pending = ?self.tracker.state(), "initial flush");
        Ok(())
    }

    async fn end_cycle(&mut self) -> Step {
        if self.state != WriterState::Flushed {
            return Ok(None);
        }
        self.emit_pending().await?;
        if self.tracker.fully_quiescent() {
            return self.close().await.map(Some);
        }
        Ok(None)
    }

    async fn emit_pending(&mut self) -> Result<(), RenderError> {
        let ids = self.pending.take_top_level(&self.mirror);
        if ids.is_empty() {
            return Ok(());
        }
        let mut chunk = String::new();
        let mut failure = None;
        {
            let mut composer = Composer::new(&self.mirror, &mut self.boundaries, true);
            for id in ids {
                match composer.fragment_html(id) {
                    Ok(html) => {
                        debug!(component_id = %id, "out-of-band fragment");
                        chunk.push_str(&component_fragment(id.0, &html));
                        self.fragments += 1;
                    }
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }
        self.response.send_body(chunk).await?;
        match failure {
            Some(err) => Err(self.report_compose_failure(err).await),
            None => Ok(()),
        }
    }

    async fn report_compose_failure(&mut self, err: ComposeError) -> RenderError {
        let message = match &err {
            ComposeError::Configuration(source) => self.config.error_detail.format(source),
            ComposeError::Descriptor(source) => self.config.error_detail.format(source),
        };
        match self.write_error_fragment(&message).await {
            Ok(()) => err.into_render_error(true),
            Err(aborted) => aborted,
        }
    }

    async fn write_error_fragment(&mut self, message: &str) -> Result<(), RenderError> {
        self.state = WriterState::Closed;
        self.fragments += 1;
        self.response.send_body(error_fragment(message)).await
    }

    async fn navigate(&mut self, url: &str) -> Step {
        let location = resolve_url(&self.config.base_uri, url);
        match self.state {
            WriterState::Buffering => {
                info!(%location, "redirect before response started");
                self.response
                    .send_head(ResponseHead::redirect(location.clone()))
                    .await?;
                self.state = WriterState::Closed;
                Ok(Some(Completion::Redirected {
                    location,
                    after_commit: false,
                }))
            }
            WriterState::Flushed if self.config.prevent_streaming => {
                self.state = WriterState::Closed;
                Err(RenderError::NavigationAfterResponseStarted { location })
            }
            WriterState::Flushed => {
                warn!(%location, "redirect after response started; emitting redirection fragment");
                self.emit_pending().await?;
                self.fragments += 1;
                self.response
                    .send_body(redirection_fragment(&location))
                    .await?;
                self.state = WriterState::Closed;
                Ok(Some(Completion::Redirected {
                    location,
                    after_commit: true,
                }))
            }
            WriterState::Closed => Ok(None),
        }
    }

    async fn fail(&mut self, error: ComponentError) -> Step {
        match self.state {
            WriterState::Buffering | WriterState::Closed => {
                self.state = WriterState::Closed;
                Err(RenderError::Unhandled {
                    error,
                    reported_to_client: false,
                })
            }
            WriterState::Flushed => {
                warn!(%error, "component failed after response started; emitting error fragment");
                self.emit_pending().await?;
                let message = self.config.error_detail.format(&error);
                self.write_error_fragment(&message).await?;
                Err(RenderError::Unhandled {
                    error,
                    reported_to_client: true,
                })
            }
        }
    }

    async fn close(&mut self) -> Result<Completion, RenderError> {
        if self.state == WriterState::Buffering {
            self.flush_initial().await?;
        }
        self.emit_pending().await?;
        let mut tail = bootstrap_scripts(&self.config.bootstrap, self.boundaries.invoked);
        tail.push_str(STREAM_TERMINATOR);
        self.response.send_body(tail).await?;
        self.state = WriterState::Closed;
        debug!("stream terminated");
        Ok(Completion::Completed)
    }
}

fn bootstrap_scripts(assets: &BootstrapAssets, invoked: InvokedRenderModes) -> String {
    let mut out = String::new();
    for kind in invoked.kinds() {
        out.push_str("<script src=\"");
        weft_proto::html::push_attribute(&mut out, assets.script_for(kind));
        out.push_str("\" autostart=\"false\"></script>");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{response_channel, ResponsePart, ResponseStream};
    use crate::tree::{ComponentInfo, Frame};
    use std::sync::Arc;
    use weft_proto::{DescriptorFactory, FixedClock, KeyedProtector, TypeIdentity};

    const ROOT: ComponentId = ComponentId(1);

    fn writer(
        prevent_streaming: bool,
    ) -> (
        StreamingWriter,
        mpsc::UnboundedSender<RenderEvent>,
        ResponseStream,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (response, stream) = response_channel(64);
        let clock = Arc::new(FixedClock::new(time::macros::datetime!(2024-06-01 12:00 UTC)));
        let protector = Arc::new(KeyedProtector::with_clock([2u8; 32], clock.clone()));
        let boundaries = BoundaryContext::new(
            None,
            DescriptorFactory::new(protector, clock, weft_proto::DEFAULT_DESCRIPTOR_LIFETIME),
        );
        let config = WriterConfig {
            root: ROOT,
            base_uri: "https://app.test/page".into(),
            await_quiescence: false,
            prevent_streaming,
            error_detail: ErrorDetail::Detailed,
            bootstrap: BootstrapAssets::default(),
        };
        (StreamingWriter::new(rx, response, boundaries, config), tx, stream)
    }

    fn root_batch(text: &str) -> RenderEvent {
        RenderEvent::Batch(RenderBatch {
            mounted: vec![ComponentInfo::new(ROOT, None, TypeIdentity::new("t", "Root"))],
            updated: vec![(ROOT, vec![Frame::Text(text.into())])],
            disposed: vec![],
        })
    }

    async fn body(stream: &mut ResponseStream) -> (Option<ResponseHead>, String) {
        let mut head = None;
        let mut text = String::new();
        while let Some(part) = stream.recv().await {
            match part {
                ResponsePart::Head(h) => head = Some(h),
                ResponsePart::Body(b) => text.push_str(std::str::from_utf8(&b).unwrap()),
            }
        }
        (head, text)
    }

    #[tokio::test]
    async fn navigation_after_commit_is_fatal_without_streaming() {
        let (writer, tx, mut stream) = writer(true);
        let task = TaskId::next();
        tx.send(RenderEvent::TaskStarted { task, region: Region::NonStreaming }).unwrap();
        tx.send(root_batch("done")).unwrap();
        tx.send(RenderEvent::TaskSettled { task }).unwrap();
        tx.send(RenderEvent::Navigate { url: "/elsewhere".into() }).unwrap();

        let err = writer.run().await.unwrap_err();
        assert!(matches!(
            &err,
            RenderError::NavigationAfterResponseStarted { location } if location == "https://app.test/elsewhere"
        ));
        assert!(err.response_started());
        let (head, text) = body(&mut stream).await;
        assert_eq!(head.unwrap().status, 200);
        assert_eq!(text, "done");
    }

    #[tokio::test]
    async fn navigation_in_flushed_cycle_becomes_a_fragment_when_streaming() {
        let (writer, tx, mut stream) = writer(false);
        let task = TaskId::next();
        tx.send(RenderEvent::TaskStarted { task, region: Region::NonStreaming }).unwrap();
        tx.send(root_batch("done")).unwrap();
        tx.send(RenderEvent::TaskSettled { task }).unwrap();
        tx.send(RenderEvent::Navigate { url: "next".into() }).unwrap();

        let outcome = writer.run().await.unwrap();
        assert_eq!(
            outcome.completion,
            Completion::Redirected {
                location: "https://app.test/next".into(),
                after_commit: true
            }
        );
        let (_, text) = body(&mut stream).await;
        assert!(text.ends_with("<template type=\"redirection\">https://app.test/next</template>"));
        assert!(!text.contains(STREAM_TERMINATOR));
    }

    #[tokio::test]
    async fn end_of_stream_before_any_render_still_terminates() {
        let (writer, tx, mut stream) = writer(false);
        tx.send(RenderEvent::EndOfStream).unwrap();
        let outcome = writer.run().await.unwrap();
        assert_eq!(outcome.completion, Completion::Completed);
        let (head, text) = body(&mut stream).await;
        assert_eq!(head, Some(ResponseHead::ok_html()));
        assert_eq!(text, STREAM_TERMINATOR);
    }

    #[tokio::test]
    async fn dropped_sinks_close_the_stream() {
        let (writer, tx, mut stream) = writer(false);
        tx.send(root_batch("x")).unwrap();
        drop(tx);
        writer.run().await.unwrap();
        let (_, text) = body(&mut stream).await;
        assert_eq!(text, format!("x{STREAM_TERMINATOR}"));
    }

    #[test]
    fn pending_updates_keep_only_top_level_mounted_ids() {
        let mut mirror = TreeMirror::new();
        mirror.apply(&RenderBatch {
            mounted: vec![
                ComponentInfo::new(ComponentId(1), None, TypeIdentity::new("t", "A")),
                ComponentInfo::new(ComponentId(2), Some(ComponentId(1)), TypeIdentity::new("t", "B")),
                ComponentInfo::new(ComponentId(3), Some(ComponentId(2)), TypeIdentity::new("t", "C")),
                ComponentInfo::new(ComponentId(4), None, TypeIdentity::new("t", "D")),
            ],
            ..RenderBatch::default()
        });
        let mut pending = PendingUpdates::default();
        for id in [3, 2, 3, 4, 9] {
            pending.record(ComponentId(id));
        }
        assert_eq!(
            pending.take_top_level(&mirror),
            vec![ComponentId(2), ComponentId(4)]
        );
        assert!(pending.take_top_level(&mirror).is_empty());
    }
}
