// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! HTML composition from the tree mirror.

use std::collections::HashMap;

use weft_proto::html::{push_attribute, push_close_marker, push_open_marker, push_text};
use weft_proto::DescriptorFactory;

use crate::boundary::{InteractivityBoundary, IssuedBoundary};
use crate::error::ComposeError;
use crate::modes::{ConfiguredRenderModes, InvokedRenderModes};
use crate::tree::{ComponentId, ComponentInfo, Frame, TreeMirror};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Per-response state that survives across compositions.
pub(crate) struct BoundaryContext {
    pub(crate) configured: Option<ConfiguredRenderModes>,
    pub(crate) factory: DescriptorFactory,
    pub(crate) invoked: InvokedRenderModes,
    /// Descriptors per mounted boundary, reused whenever the mount is re-emitted.
    issued: HashMap<ComponentId, IssuedBoundary>,
}

impl BoundaryContext {
    pub(crate) fn new(configured: Option<ConfiguredRenderModes>, factory: DescriptorFactory) -> Self {
        Self {
            configured,
            factory,
            invoked: InvokedRenderModes::new(),
            issued: HashMap::new(),
        }
    }

    /// Drop the descriptors of `id`; its next composition is a new mount.
    pub(crate) fn forget(&mut self, id: ComponentId) {
        self.issued.remove(&id);
    }
}

impl std::fmt::Debug for BoundaryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryContext")
            .field("configured", &self.configured)
            .field("invoked", &self.invoked)
            .field("issued", &self.issued.len())
            .finish_non_exhaustive()
    }
}

/// Renders components from a [`TreeMirror`] into HTML.
pub(crate) struct Composer<'a> {
    mirror: &'a TreeMirror,
    boundaries: &'a mut BoundaryContext,
    frame_streaming: bool,
}

impl<'a> Composer<'a> {
    /// `frame_streaming` wraps streaming-region components in id markers.
    pub(crate) fn new(
        mirror: &'a TreeMirror,
        boundaries: &'a mut BoundaryContext,
        frame_streaming: bool,
    ) -> Self {
        Self {
            mirror,
            boundaries,
            frame_streaming,
        }
    }

    /// Full HTML of `id`, including its own framing markers.
    pub(crate) fn component_html(&mut self, id: ComponentId) -> Result<String, ComposeError> {
        let mut out = String::new();
        let in_interactive = self.mirror.has_interactive_ancestor(id);
        self.component(id, &mut out, in_interactive)?;
        Ok(out)
    }

    /// HTML that replaces the content between `id`'s framing markers.
    pub(crate) fn fragment_html(&mut self, id: ComponentId) -> Result<String, ComposeError> {
        let mut out = String::new();
        let mirror = self.mirror;
        if let Some(info) = mirror.info(id) {
            let in_interactive = mirror.has_interactive_ancestor(id);
            self.body(info, &mut out, in_interactive)?;
        }
        Ok(out)
    }

    fn component(
        &mut self,
        id: ComponentId,
        out: &mut String,
        in_interactive: bool,
    ) -> Result<(), ComposeError> {
        let mirror = self.mirror;
        let Some(info) = mirror.info(id) else {
            return Ok(());
        };
        let framed = self.frame_streaming && mirror.in_streaming_region(id);
        if framed {
            push_open_marker(out, &id);
        }
        self.body(info, out, in_interactive)?;
        if framed {
            push_close_marker(out, &id);
        }
        Ok(())
    }

    fn body(
        &mut self,
        info: &ComponentInfo,
        out: &mut String,
        in_interactive: bool,
    ) -> Result<(), ComposeError> {
        match info.render_mode {
            // Nested boundaries are hosted by the enclosing runtime.
            Some(mode) if mode.is_interactive() && !in_interactive => {
                let boundary =
                    InteractivityBoundary::new(info, self.boundaries.configured.as_ref())?;
                let open = match self.boundaries.issued.get(&info.id) {
                    Some(issued) => issued.open(out)?,
                    None => {
                        let issued = boundary.issue(&mut self.boundaries.factory)?;
                        let open = issued.open(out)?;
                        self.boundaries.issued.insert(info.id, issued);
                        open
                    }
                };
                self.boundaries.invoked.record(mode);
                if open.prerendering() {
                    self.frames(info.id, out, true)?;
                }
                open.end(out)?;
            }
            _ => self.frames(info.id, out, in_interactive)?,
        }
        Ok(())
    }

    fn frames(
        &mut self,
        id: ComponentId,
        out: &mut String,
        in_interactive: bool,
    ) -> Result<(), ComposeError> {
        let mirror = self.mirror;
        for frame in mirror.frames(id).unwrap_or_default() {
            self.frame(frame, out, in_interactive)?;
        }
        Ok(())
    }

    fn frame(
        &mut self,
        frame: &Frame,
        out: &mut String,
        in_interactive: bool,
    ) -> Result<(), ComposeError> {
        match frame {
            Frame::Element {
                name,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(name);
                for (attr, value) in attributes {
                    out.push(' ');
                    out.push_str(attr);
                    out.push_str("=\"");
                    push_attribute(out, value);
                    out.push('"');
                }
                out.push('>');
                if children.is_empty() && VOID_ELEMENTS.contains(&name.as_str()) {
                    return Ok(());
                }
                for child in children {
                    self.frame(child, out, in_interactive)?;
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            Frame::Text(text) => push_text(out, text),
            Frame::Markup(markup) => out.push_str(markup),
            Frame::Component(child) => self.component(*child, out, in_interactive)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::RenderBatch;
    use std::sync::Arc;
    use weft_proto::{
        ComponentDescriptor, FixedClock, InteractiveKind, KeyedProtector, MarkerScanner,
        RenderMode, TypeIdentity,
    };

    fn context(configured: Option<ConfiguredRenderModes>) -> BoundaryContext {
        let clock = Arc::new(FixedClock::new(time::macros::datetime!(2024-06-01 12:00 UTC)));
        let protector = Arc::new(KeyedProtector::with_clock([1u8; 32], clock.clone()));
        BoundaryContext::new(
            configured,
            DescriptorFactory::new(protector, clock, weft_proto::DEFAULT_DESCRIPTOR_LIFETIME),
        )
    }

    fn info(id: u64, parent: Option<u64>, name: &str) -> ComponentInfo {
        ComponentInfo::new(
            ComponentId(id),
            parent.map(ComponentId),
            TypeIdentity::new("demo", name),
        )
    }

    fn el(name: &str, children: Vec<Frame>) -> Frame {
        Frame::Element {
            name: name.to_owned(),
            attributes: Vec::new(),
            children,
        }
    }

    #[test]
    fn escapes_text_and_attributes_and_skips_void_close_tags() {
        let mut mirror = TreeMirror::new();
        mirror.apply(&RenderBatch {
            mounted: vec![info(1, None, "Page")],
            updated: vec![(
                ComponentId(1),
                vec![
                    Frame::Element {
                        name: "a".into(),
                        attributes: vec![("title".into(), "\"x\" & y".into())],
                        children: vec![Frame::Text("1 < 2".into())],
                    },
                    el("br", vec![]),
                    Frame::Markup("<i>raw</i>".into()),
                ],
            )],
            disposed: vec![],
        });
        let mut ctx = context(None);
        let html = Composer::new(&mirror, &mut ctx, true)
            .component_html(ComponentId(1))
            .unwrap();
        assert_eq!(
            html,
            "<a title=\"&quot;x&quot; &amp; y\">1 &lt; 2</a><br><i>raw</i>"
        );
    }

    #[test]
    fn nested_boundary_renders_inline_and_records_outer_mode() {
        let mut outer = info(2, Some(1), "Dashboard");
        outer.render_mode = Some(RenderMode::INTERACTIVE_SERVER);
        let mut inner = info(3, Some(2), "Clock");
        inner.render_mode = Some(RenderMode::INTERACTIVE_WEBASSEMBLY);

        let mut mirror = TreeMirror::new();
        mirror.apply(&RenderBatch {
            mounted: vec![info(1, None, "Page"), outer, inner],
            updated: vec![
                (ComponentId(1), vec![el("main", vec![Frame::Component(ComponentId(2))])]),
                (ComponentId(2), vec![Frame::Component(ComponentId(3))]),
                (ComponentId(3), vec![Frame::Text("12:00".into())]),
            ],
            disposed: vec![],
        });

        let mut ctx = context(Some(ConfiguredRenderModes::new().with_server()));
        let html = Composer::new(&mirror, &mut ctx, true)
            .component_html(ComponentId(1))
            .unwrap();

        assert_eq!(MarkerScanner::new().scan(&html).unwrap().len(), 1);
        assert_eq!(html.matches("<!--Blazor:").count(), 2);
        assert!(html.contains("12:00"));
        assert!(ctx.invoked.contains(InteractiveKind::Server));
        assert!(!ctx.invoked.contains(InteractiveKind::WebAssembly));
    }

    #[test]
    fn unconfigured_mode_fails_composition() {
        let mut counter = info(2, Some(1), "Counter");
        counter.render_mode = Some(RenderMode::INTERACTIVE_WEBASSEMBLY);
        let mut mirror = TreeMirror::new();
        mirror.apply(&RenderBatch {
            mounted: vec![info(1, None, "Page"), counter],
            updated: vec![
                (ComponentId(1), vec![Frame::Component(ComponentId(2))]),
                (ComponentId(2), vec![]),
            ],
            disposed: vec![],
        });
        let mut ctx = context(Some(ConfiguredRenderModes::new().with_server()));
        let err = Composer::new(&mirror, &mut ctx, true)
            .component_html(ComponentId(1))
            .unwrap_err();
        assert!(matches!(err, ComposeError::Configuration(_)));
        assert_eq!(ctx.factory.issued(), 0);
    }

    #[test]
    fn streaming_components_are_framed_by_id() {
        let mut forecast = info(2, Some(1), "Forecast");
        forecast.streaming = true;
        let mut mirror = TreeMirror::new();
        mirror.apply(&RenderBatch {
            mounted: vec![info(1, None, "Page"), forecast],
            updated: vec![
                (ComponentId(1), vec![Frame::Component(ComponentId(2))]),
                (ComponentId(2), vec![Frame::Text("Loading...".into())]),
            ],
            disposed: vec![],
        });
        let mut ctx = context(None);
        let mut composer = Composer::new(&mirror, &mut ctx, true);
        assert_eq!(
            composer.component_html(ComponentId(1)).unwrap(),
            "<!--bl:2-->Loading...<!--/bl:2-->"
        );
        assert_eq!(composer.fragment_html(ComponentId(2)).unwrap(), "Loading...");

        let mut unframed = Composer::new(&mirror, &mut ctx, false);
        assert_eq!(unframed.component_html(ComponentId(1)).unwrap(), "Loading...");
    }

    #[test]
    fn server_boundary_comment_keeps_parameters_sealed() {
        let mut counter = info(2, Some(1), "Counter");
        counter.render_mode = Some(RenderMode::INTERACTIVE_SERVER);
        counter.parameters = vec![weft_proto::Parameter::new(
            "Start",
            TypeIdentity::new("core", "i32"),
            serde_json::json!(41),
        )];
        let mut mirror = TreeMirror::new();
        mirror.apply(&RenderBatch {
            mounted: vec![info(1, None, "Page"), counter],
            updated: vec![
                (ComponentId(1), vec![Frame::Component(ComponentId(2))]),
                (ComponentId(2), vec![Frame::Text("41".into())]),
            ],
            disposed: vec![],
        });
        let mut ctx = context(None);
        let html = Composer::new(&mirror, &mut ctx, true)
            .component_html(ComponentId(1))
            .unwrap();
        let start = html.find("<!--Blazor:").unwrap() + "<!--Blazor:".len();
        let end = start + html[start..].find("-->").unwrap();
        let descriptor = ComponentDescriptor::parse_json(&html[start..end]).unwrap();
        assert!(descriptor.parameter_values.is_none());
        assert!(descriptor.protected_payload.is_some());
    }

    #[test]
    fn recomposing_a_mount_reuses_its_descriptors() {
        let mut counter = info(2, Some(1), "Counter");
        counter.render_mode = Some(RenderMode::INTERACTIVE_SERVER);
        let batch = RenderBatch {
            mounted: vec![info(1, None, "Page"), counter],
            updated: vec![
                (ComponentId(1), vec![el("main", vec![Frame::Component(ComponentId(2))])]),
                (ComponentId(2), vec![Frame::Text("0".into())]),
            ],
            disposed: vec![],
        };
        let mut mirror = TreeMirror::new();
        mirror.apply(&batch);
        let mut ctx = context(None);

        let first = Composer::new(&mirror, &mut ctx, true)
            .component_html(ComponentId(1))
            .unwrap();
        let again = Composer::new(&mirror, &mut ctx, true)
            .component_html(ComponentId(1))
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(ctx.factory.issued(), 1);

        ctx.forget(ComponentId(2));
        let remounted = Composer::new(&mirror, &mut ctx, true)
            .component_html(ComponentId(1))
            .unwrap();
        assert_ne!(remounted, first);
        assert_eq!(ctx.factory.issued(), 2);
    }
}
