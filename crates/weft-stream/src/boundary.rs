// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Interactivity boundaries: gate and frame one interactive mount point.
//!
//! ```text
//! <!--Blazor:{preamble}--><!--bl:{key}--> static html <!--/bl:{key}--><!--Blazor:{epilogue}-->
//! ```
//!
//! Without prerendering the static HTML and the epilogue are omitted and the
//! marker pair is empty.

use weft_proto::html::{push_close_marker, push_descriptor_comment, push_open_marker};
use weft_proto::{
    BoundaryMarkerKey, ComponentDescriptor, ComponentKey, DescriptorError, DescriptorFactory,
    MountRequest, Parameter, RenderMode, TypeIdentity,
};

use crate::error::ConfigurationError;
use crate::modes::ConfiguredRenderModes;
use crate::tree::ComponentInfo;

/// Marker key for a mount of `type_identity` at `sequence` with `developer_key`.
///
/// Keys without a stable text form (`None`, `Object`) produce an empty
/// trailing segment.
pub fn get_component_marker_key(
    type_identity: &TypeIdentity,
    sequence: u64,
    developer_key: &ComponentKey,
) -> BoundaryMarkerKey {
    BoundaryMarkerKey::for_component(type_identity, sequence, developer_key)
}

/// A validated interactive mount point.
#[derive(Debug, Clone)]
pub struct InteractivityBoundary<'a> {
    type_identity: &'a TypeIdentity,
    mode: RenderMode,
    key: BoundaryMarkerKey,
    parameters: &'a [Parameter],
}

impl<'a> InteractivityBoundary<'a> {
    /// Validate `info`'s render mode against the endpoint configuration.
    ///
    /// `configured = None` means the endpoint is unconstrained and nothing
    /// is checked. A component without a declared mode is treated as static.
    pub fn new(
        info: &'a ComponentInfo,
        configured: Option<&ConfiguredRenderModes>,
    ) -> Result<Self, ConfigurationError> {
        let mode = info.render_mode.unwrap_or(RenderMode::Static);
        if let Some(configured) = configured {
            let missing = configured.missing_for(mode);
            if !missing.is_empty() {
                return Err(ConfigurationError {
                    component: info.type_identity.clone(),
                    mode,
                    missing,
                });
            }
        }
        Ok(Self {
            type_identity: &info.type_identity,
            mode,
            key: get_component_marker_key(
                &info.type_identity,
                u64::from(info.site_sequence),
                &info.key,
            ),
            parameters: &info.parameters,
        })
    }

    /// Declared render mode.
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Key placed on both markers.
    pub fn key(&self) -> &BoundaryMarkerKey {
        &self.key
    }

    /// Issue the descriptors for one mount of this boundary.
    ///
    /// Consumes one descriptor sequence. Re-emitting the same mount later
    /// goes through [`IssuedBoundary::open`] so the client sees the same
    /// sequence and prerender id again.
    pub fn issue(&self, factory: &mut DescriptorFactory) -> Result<IssuedBoundary, DescriptorError> {
        let prerendering = self.mode.prerender();
        let preamble = factory.build_preamble(
            &MountRequest {
                type_identity: self.type_identity,
                render_mode: self.mode,
                key: &self.key,
                parameters: self.parameters,
            },
            prerendering,
        )?;
        let epilogue = prerendering.then(|| DescriptorFactory::build_epilogue(&preamble));
        Ok(IssuedBoundary {
            key: self.key.clone(),
            preamble,
            epilogue,
        })
    }

    /// Issue descriptors and write the preamble and the open marker.
    pub fn begin(
        &self,
        factory: &mut DescriptorFactory,
        out: &mut String,
    ) -> Result<OpenBoundary, DescriptorError> {
        self.issue(factory)?.open(out)
    }
}

/// Descriptors issued for one boundary mount.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedBoundary {
    key: BoundaryMarkerKey,
    preamble: ComponentDescriptor,
    epilogue: Option<ComponentDescriptor>,
}

impl IssuedBoundary {
    /// Preamble descriptor.
    pub fn preamble(&self) -> &ComponentDescriptor {
        &self.preamble
    }

    /// Write the preamble and the open marker.
    pub fn open(&self, out: &mut String) -> Result<OpenBoundary, DescriptorError> {
        push_descriptor_comment(out, &self.preamble.encode_comment()?);
        push_open_marker(out, &self.key);
        Ok(OpenBoundary {
            key: self.key.clone(),
            epilogue: self.epilogue.clone(),
        })
    }
}

/// A boundary whose open marker has been written.
#[derive(Debug)]
#[must_use = "an open boundary must be closed with `end`"]
pub struct OpenBoundary {
    key: BoundaryMarkerKey,
    epilogue: Option<ComponentDescriptor>,
}

impl OpenBoundary {
    /// Whether static content belongs between the markers.
    pub fn prerendering(&self) -> bool {
        self.epilogue.is_some()
    }

    /// Write the close marker and, when prerendering, the epilogue.
    pub fn end(self, out: &mut String) -> Result<(), DescriptorError> {
        push_close_marker(out, &self.key);
        if let Some(epilogue) = &self.epilogue {
            push_descriptor_comment(out, &epilogue.encode_comment()?);
        }
        Ok(())
    }
}
