// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Configured and invoked render modes.

use weft_proto::{InteractiveKind, RenderMode};

/// Interactive kinds an endpoint has a registered provider for.
///
/// Endpoints that carry no `ConfiguredRenderModes` at all are unconstrained;
/// that is expressed as `Option<ConfiguredRenderModes>::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfiguredRenderModes {
    server: bool,
    webassembly: bool,
}

impl ConfiguredRenderModes {
    /// No providers registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the server provider.
    pub fn with_server(mut self) -> Self {
        self.server = true;
        self
    }

    /// Register the WebAssembly provider.
    pub fn with_webassembly(mut self) -> Self {
        self.webassembly = true;
        self
    }

    /// Whether `kind` has a provider.
    pub fn supports(self, kind: InteractiveKind) -> bool {
        match kind {
            InteractiveKind::Server => self.server,
            InteractiveKind::WebAssembly => self.webassembly,
        }
    }

    /// Kinds `mode` requires that have no provider.
    pub fn missing_for(self, mode: RenderMode) -> Vec<InteractiveKind> {
        mode.required_kinds()
            .iter()
            .copied()
            .filter(|kind| !self.supports(*kind))
            .collect()
    }
}

/// Interactive kinds used anywhere in one response.
///
/// Only grows; decides which client bootstrap assets the response references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvokedRenderModes {
    server: bool,
    webassembly: bool,
}

impl InvokedRenderModes {
    /// Nothing invoked yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mount in `mode`. Auto records both kinds.
    pub fn record(&mut self, mode: RenderMode) {
        for kind in mode.required_kinds() {
            match kind {
                InteractiveKind::Server => self.server = true,
                InteractiveKind::WebAssembly => self.webassembly = true,
            }
        }
    }

    /// Union with `other`.
    pub fn merge(&mut self, other: InvokedRenderModes) {
        self.server |= other.server;
        self.webassembly |= other.webassembly;
    }

    /// Whether `kind` was invoked.
    pub fn contains(self, kind: InteractiveKind) -> bool {
        match kind {
            InteractiveKind::Server => self.server,
            InteractiveKind::WebAssembly => self.webassembly,
        }
    }

    /// True when no interactive kind was invoked.
    pub fn is_empty(self) -> bool {
        !self.server && !self.webassembly
    }

    /// Invoked kinds in canonical order.
    pub fn kinds(self) -> impl Iterator<Item = InteractiveKind> {
        InteractiveKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}
