// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Render tree model shared with the tree renderer, and the writer's mirror of it.

use std::collections::HashMap;

use weft_proto::{ComponentKey, Parameter, RenderMode, TypeIdentity};

/// Renderer-assigned component identifier.
///
/// Unique within one response and stable for the lifetime of a component
/// instance. Only compared and formatted here, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u64);

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One node of a component's rendered output.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// An HTML element.
    Element {
        /// Tag name.
        name: String,
        /// Attributes in output order; values are escaped on output.
        attributes: Vec<(String, String)>,
        /// Child nodes.
        children: Vec<Frame>,
    },
    /// Text content, escaped on output.
    Text(String),
    /// Raw markup, written verbatim.
    Markup(String),
    /// A child component rendered in place.
    Component(ComponentId),
}

/// Everything the writer needs to know about a mounted component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
    /// Component id.
    pub id: ComponentId,
    /// Parent component; `None` for the root.
    pub parent: Option<ComponentId>,
    /// Component type.
    pub type_identity: TypeIdentity,
    /// Sequence of the mount site within the parent's output.
    pub site_sequence: u32,
    /// Developer-supplied key.
    pub key: ComponentKey,
    /// Declared render mode; `None` inherits the surrounding mode.
    pub render_mode: Option<RenderMode>,
    /// Whether the component opted into streaming rendering.
    pub streaming: bool,
    /// Parameters the component was mounted with.
    pub parameters: Vec<Parameter>,
}

impl ComponentInfo {
    /// A static, non-streaming component with no key or parameters.
    pub fn new(id: ComponentId, parent: Option<ComponentId>, type_identity: TypeIdentity) -> Self {
        Self {
            id,
            parent,
            type_identity,
            site_sequence: 0,
            key: ComponentKey::None,
            render_mode: None,
            streaming: false,
            parameters: Vec::new(),
        }
    }
}

/// An ordered diff produced by the tree renderer.
///
/// Updated entries carry each component's full current frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderBatch {
    /// Components mounted by this batch, parents before children.
    pub mounted: Vec<ComponentInfo>,
    /// Components whose output changed, in render order.
    pub updated: Vec<(ComponentId, Vec<Frame>)>,
    /// Components disposed by this batch.
    pub disposed: Vec<ComponentId>,
}

impl RenderBatch {
    /// Ids in `updated`, in order.
    pub fn updated_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.updated.iter().map(|(id, _)| *id)
    }
}

#[derive(Debug, Clone)]
struct Node {
    info: ComponentInfo,
    frames: Option<Vec<Frame>>,
}

/// The writer's copy of the component tree.
#[derive(Debug, Default)]
pub struct TreeMirror {
    nodes: HashMap<ComponentId, Node>,
}

impl TreeMirror {
    /// Empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch: mounts, then updates, then disposals.
    ///
    /// Updates for components that were never mounted are ignored.
    pub fn apply(&mut self, batch: &RenderBatch) {
        for info in &batch.mounted {
            self.nodes.insert(
                info.id,
                Node {
                    info: info.clone(),
                    frames: None,
                },
            );
        }
        for (id, frames) in &batch.updated {
            if let Some(node) = self.nodes.get_mut(id) {
                node.frames = Some(frames.clone());
            }
        }
        for id in &batch.disposed {
            self.nodes.remove(id);
        }
    }

    /// Whether `id` is mounted.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Mount information for `id`.
    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.nodes.get(&id).map(|n| &n.info)
    }

    /// Latest frames of `id`; `None` until its first render.
    pub fn frames(&self, id: ComponentId) -> Option<&[Frame]> {
        self.nodes.get(&id).and_then(|n| n.frames.as_deref())
    }

    /// Whether `id` has rendered at least once.
    pub fn is_rendered(&self, id: ComponentId) -> bool {
        self.frames(id).is_some()
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: ComponentId) -> Ancestors<'_> {
        Ancestors {
            mirror: self,
            next: self.info(id).and_then(|i| i.parent),
            remaining: self.nodes.len(),
        }
    }

    /// Whether `id` or an ancestor opted into streaming rendering.
    pub fn in_streaming_region(&self, id: ComponentId) -> bool {
        self.info(id).is_some_and(|i| i.streaming)
            || self
                .ancestors(id)
                .any(|a| self.info(a).is_some_and(|i| i.streaming))
    }

    /// Whether an ancestor of `id` declares an interactive render mode.
    pub fn has_interactive_ancestor(&self, id: ComponentId) -> bool {
        self.ancestors(id).any(|a| {
            self.info(a)
                .and_then(|i| i.render_mode)
                .is_some_and(RenderMode::is_interactive)
        })
    }
}

/// Iterator over a component's ancestors.
///
/// Bounded by the mirror size, so a malformed parent cycle terminates.
#[derive(Debug)]
pub struct Ancestors<'a> {
    mirror: &'a TreeMirror,
    next: Option<ComponentId>,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = ComponentId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next?;
        self.next = self.mirror.info(current).and_then(|i| i.parent);
        Some(current)
    }
}
