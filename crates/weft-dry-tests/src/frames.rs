// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Frame, component and batch builders for tests.

use weft_proto::{ComponentKey, Parameter, RenderMode, TypeIdentity};
use weft_stream::{ComponentId, ComponentInfo, Frame, RenderBatch};

/// Assembly name used by [`ComponentBuilder`].
pub const TEST_ASSEMBLY: &str = "tests";

/// Text frame.
pub fn text(value: impl Into<String>) -> Frame {
    Frame::Text(value.into())
}

/// Raw markup frame.
pub fn markup(value: impl Into<String>) -> Frame {
    Frame::Markup(value.into())
}

/// Child component frame.
pub fn child(id: u64) -> Frame {
    Frame::Component(ComponentId(id))
}

/// Start an element frame.
pub fn el(name: impl Into<String>) -> ElementBuilder {
    ElementBuilder {
        name: name.into(),
        attributes: Vec::new(),
        children: Vec::new(),
    }
}

/// Builder for [`Frame::Element`].
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Frame>,
}

impl ElementBuilder {
    /// Add an attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Append a child frame.
    pub fn child(mut self, frame: impl Into<Frame>) -> Self {
        self.children.push(frame.into());
        self
    }

    /// Append a text child.
    pub fn text(self, value: impl Into<String>) -> Self {
        self.child(text(value))
    }

    /// Build the frame.
    pub fn build(self) -> Frame {
        Frame::Element {
            name: self.name,
            attributes: self.attributes,
            children: self.children,
        }
    }
}

impl From<ElementBuilder> for Frame {
    fn from(builder: ElementBuilder) -> Self {
        builder.build()
    }
}

/// Builder for [`ComponentInfo`].
///
/// # Example
///
/// ```
/// use weft_dry_tests::ComponentBuilder;
/// use weft_proto::RenderMode;
///
/// let info = ComponentBuilder::new(2, "Counter")
///     .parent(1)
///     .mode(RenderMode::INTERACTIVE_SERVER)
///     .build();
/// assert_eq!(info.parent.map(|p| p.0), Some(1));
/// assert_eq!(info.type_identity.name, "Counter");
/// ```
#[derive(Debug, Clone)]
pub struct ComponentBuilder {
    info: ComponentInfo,
}

impl ComponentBuilder {
    /// Root-level static component `name` with id `id`.
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            info: ComponentInfo::new(
                ComponentId(id),
                None,
                TypeIdentity::new(TEST_ASSEMBLY, name),
            ),
        }
    }

    /// Set the parent.
    pub fn parent(mut self, parent: u64) -> Self {
        self.info.parent = Some(ComponentId(parent));
        self
    }

    /// Set the declared render mode.
    pub fn mode(mut self, mode: RenderMode) -> Self {
        self.info.render_mode = Some(mode);
        self
    }

    /// Opt into streaming rendering.
    pub fn streaming(mut self) -> Self {
        self.info.streaming = true;
        self
    }

    /// Set the mount site sequence.
    pub fn site(mut self, sequence: u32) -> Self {
        self.info.site_sequence = sequence;
        self
    }

    /// Set the developer key.
    pub fn key(mut self, key: impl Into<ComponentKey>) -> Self {
        self.info.key = key.into();
        self
    }

    /// Add a mount parameter.
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.info.parameters.push(parameter);
        self
    }

    /// Build the info.
    pub fn build(self) -> ComponentInfo {
        self.info
    }
}

impl From<ComponentBuilder> for ComponentInfo {
    fn from(builder: ComponentBuilder) -> Self {
        builder.build()
    }
}

/// Builder for [`RenderBatch`].
///
/// # Example
///
/// ```
/// use weft_dry_tests::{child, text, BatchBuilder, ComponentBuilder};
///
/// let batch = BatchBuilder::new()
///     .mount(ComponentBuilder::new(1, "Page"))
///     .mount(ComponentBuilder::new(2, "Forecast").parent(1).streaming())
///     .update(1, vec![child(2)])
///     .update(2, vec![text("Loading...")])
///     .build();
/// assert_eq!(batch.mounted.len(), 2);
/// assert_eq!(batch.updated.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BatchBuilder {
    batch: RenderBatch,
}

impl BatchBuilder {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a component.
    pub fn mount(mut self, info: impl Into<ComponentInfo>) -> Self {
        self.batch.mounted.push(info.into());
        self
    }

    /// Replace a component's frames.
    pub fn update(mut self, id: u64, frames: Vec<Frame>) -> Self {
        self.batch.updated.push((ComponentId(id), frames));
        self
    }

    /// Dispose a component.
    pub fn dispose(mut self, id: u64) -> Self {
        self.batch.disposed.push(ComponentId(id));
        self
    }

    /// Build the batch.
    pub fn build(self) -> RenderBatch {
        self.batch
    }
}
