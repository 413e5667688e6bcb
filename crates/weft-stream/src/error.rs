// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy of the streaming core.

use weft_proto::{DescriptorError, InteractiveKind, RenderMode, TypeIdentity};

/// Shown in error fragments outside development.
pub const GENERIC_ERROR_MESSAGE: &str =
    "There was an unhandled error on the current request. For more details turn on detailed errors.";

/// A component's render mode has no registered provider on the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.describe())]
pub struct ConfigurationError {
    /// Component that requested the mode.
    pub component: TypeIdentity,
    /// Requested mode.
    pub mode: RenderMode,
    /// Kinds the endpoint is missing, in canonical order.
    pub missing: Vec<InteractiveKind>,
}

impl ConfigurationError {
    fn describe(&self) -> String {
        let hints: Vec<&str> = self
            .missing
            .iter()
            .map(|kind| kind.registration_hint())
            .collect();
        format!(
            "component '{}' uses render mode '{}', but the endpoint has no provider for it; {}",
            self.component,
            self.mode,
            hints.join(" and ")
        )
    }
}

/// Application error raised by component logic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ComponentError {
    /// Error category, e.g. the failing operation.
    pub kind: String,
    /// Full error text.
    pub message: String,
}

impl ComponentError {
    /// Error of `kind` with `message`.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// How much of an error reaches the client after the response started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorDetail {
    /// Full error text (development).
    Detailed,
    /// [`GENERIC_ERROR_MESSAGE`] only.
    #[default]
    Generic,
}

impl ErrorDetail {
    /// Text to place in an error fragment for `error`.
    pub fn format(self, error: &dyn std::error::Error) -> String {
        match self {
            ErrorDetail::Detailed => error.to_string(),
            ErrorDetail::Generic => GENERIC_ERROR_MESSAGE.to_owned(),
        }
    }
}

/// Why rendering a response did not complete.
///
/// `reported_to_client` is true when an error fragment was already written,
/// so the caller must not try to write its own error response.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Missing render-mode registration.
    #[error("{source}")]
    Configuration {
        /// The configuration failure.
        source: ConfigurationError,
        /// Whether an error fragment was written.
        reported_to_client: bool,
    },
    /// A descriptor could not be built or encoded.
    #[error("descriptor emission failed: {source}")]
    Descriptor {
        /// The descriptor failure.
        source: DescriptorError,
        /// Whether an error fragment was written.
        reported_to_client: bool,
    },
    /// Component logic failed.
    #[error("unhandled component error: {error}")]
    Unhandled {
        /// The component failure.
        error: ComponentError,
        /// Whether an error fragment was written.
        reported_to_client: bool,
    },
    /// A component navigated after the response started while streaming is disabled.
    #[error("navigation to '{location}' after the response started, and streaming is disabled")]
    NavigationAfterResponseStarted {
        /// Resolved navigation target.
        location: String,
    },
    /// The client went away.
    #[error("response aborted by the client")]
    Aborted,
}

impl RenderError {
    /// Whether the client already received an error fragment for this error.
    pub fn reported_to_client(&self) -> bool {
        match self {
            RenderError::Configuration {
                reported_to_client, ..
            }
            | RenderError::Descriptor {
                reported_to_client, ..
            }
            | RenderError::Unhandled {
                reported_to_client, ..
            } => *reported_to_client,
            RenderError::NavigationAfterResponseStarted { .. } | RenderError::Aborted => false,
        }
    }

    /// Whether anything was written before the failure.
    ///
    /// When false the caller may still produce a clean error response.
    pub fn response_started(&self) -> bool {
        self.reported_to_client() || matches!(self, RenderError::NavigationAfterResponseStarted { .. })
    }
}

/// Failure while composing HTML; becomes a [`RenderError`] once the writer
/// knows whether it reported it.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ComposeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

impl ComposeError {
    pub(crate) fn into_render_error(self, reported_to_client: bool) -> RenderError {
        match self {
            ComposeError::Configuration(source) => RenderError::Configuration {
                source,
                reported_to_client,
            },
            ComposeError::Descriptor(source) => RenderError::Descriptor {
                source,
                reported_to_client,
            },
        }
    }
}
