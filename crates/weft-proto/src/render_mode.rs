// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Render modes: how (and whether) a component becomes interactive on the client.

use serde::{Deserialize, Serialize};

/// A client runtime that can host an interactive component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractiveKind {
    /// Hosted on the server over a persistent connection.
    Server,
    /// Hosted in the browser by a downloaded runtime.
    WebAssembly,
}

impl InteractiveKind {
    /// Both kinds, in canonical order.
    pub const ALL: [InteractiveKind; 2] = [InteractiveKind::Server, InteractiveKind::WebAssembly];

    /// Human-readable name used in diagnostics.
    pub fn display_name(self) -> &'static str {
        match self {
            InteractiveKind::Server => "Server",
            InteractiveKind::WebAssembly => "WebAssembly",
        }
    }

    /// The registration a host has to make before this kind can be used.
    pub fn registration_hint(self) -> &'static str {
        match self {
            InteractiveKind::Server => "add Server support (ConfiguredRenderModes::with_server)",
            InteractiveKind::WebAssembly => {
                "add WebAssembly support (ConfiguredRenderModes::with_webassembly)"
            }
        }
    }
}

impl std::fmt::Display for InteractiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Declared interactivity strategy for a component.
///
/// A closed union: `Auto` is not a third runtime but an explicit requirement
/// that *both* runtimes are available, with the client picking one at mount
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    /// Rendered once on the server, never activated.
    Static,
    /// Interactive over a server connection.
    Server {
        /// Emit static HTML for the subtree before the runtime attaches.
        prerender: bool,
    },
    /// Interactive in a client-side runtime.
    WebAssembly {
        /// Emit static HTML for the subtree before the runtime attaches.
        prerender: bool,
    },
    /// Server first, WebAssembly once downloaded.
    Auto {
        /// Emit static HTML for the subtree before the runtime attaches.
        prerender: bool,
    },
}

impl RenderMode {
    /// Interactive server rendering with prerendering enabled.
    pub const INTERACTIVE_SERVER: RenderMode = RenderMode::Server { prerender: true };
    /// Interactive WebAssembly rendering with prerendering enabled.
    pub const INTERACTIVE_WEBASSEMBLY: RenderMode = RenderMode::WebAssembly { prerender: true };
    /// Automatic rendering with prerendering enabled.
    pub const INTERACTIVE_AUTO: RenderMode = RenderMode::Auto { prerender: true };

    /// Name used in diagnostics and error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            RenderMode::Static => "Static",
            RenderMode::Server { .. } => "InteractiveServer",
            RenderMode::WebAssembly { .. } => "InteractiveWebAssembly",
            RenderMode::Auto { .. } => "InteractiveAuto",
        }
    }

    /// Runtimes that must be registered on the endpoint for this mode.
    pub fn required_kinds(self) -> &'static [InteractiveKind] {
        match self {
            RenderMode::Static => &[],
            RenderMode::Server { .. } => &[InteractiveKind::Server],
            RenderMode::WebAssembly { .. } => &[InteractiveKind::WebAssembly],
            RenderMode::Auto { .. } => &InteractiveKind::ALL,
        }
    }

    /// Whether the subtree is statically rendered before activation.
    pub fn prerender(self) -> bool {
        match self {
            RenderMode::Static => true,
            RenderMode::Server { prerender }
            | RenderMode::WebAssembly { prerender }
            | RenderMode::Auto { prerender } => prerender,
        }
    }

    /// True for every mode that needs a client runtime.
    pub fn is_interactive(self) -> bool {
        !matches!(self, RenderMode::Static)
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_requires_both_runtimes() {
        assert_eq!(
            RenderMode::INTERACTIVE_AUTO.required_kinds(),
            &[InteractiveKind::Server, InteractiveKind::WebAssembly]
        );
        assert!(RenderMode::Static.required_kinds().is_empty());
    }

    #[test]
    fn prerender_flag_is_carried() {
        assert!(!RenderMode::Server { prerender: false }.prerender());
        assert!(RenderMode::INTERACTIVE_WEBASSEMBLY.prerender());
        assert!(!RenderMode::Static.is_interactive());
    }
}
