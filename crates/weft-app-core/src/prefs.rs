// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted preferences of the weft HTTP host.

use serde::{Deserialize, Serialize};

/// Config key the host stores [`ServerPrefs`] under.
pub const SERVER_PREFS_KEY: &str = "server_host";

/// Hosting environment; decides how much error detail clients see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Full error text in error fragments.
    Development,
    /// Generic error text.
    Staging,
    /// Generic error text.
    #[default]
    Production,
}

impl Environment {
    /// Whether clients may see full error text.
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Which interactive runtimes the host registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderModePrefs {
    /// Register the server-hosted runtime.
    pub server: bool,
    /// Register the WebAssembly runtime.
    pub webassembly: bool,
}

impl Default for RenderModePrefs {
    fn default() -> Self {
        Self {
            server: true,
            webassembly: true,
        }
    }
}

/// Client runtime script paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapPrefs {
    /// Script for the server-hosted runtime.
    pub server_script: String,
    /// Script for the WebAssembly runtime.
    pub webassembly_script: String,
}

impl Default for BootstrapPrefs {
    fn default() -> Self {
        Self {
            server_script: "/_framework/weft.server.js".into(),
            webassembly_script: "/_framework/weft.webassembly.js".into(),
        }
    }
}

/// Saved preferences for the HTTP host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerPrefs {
    /// Socket address to listen on.
    pub listen: String,
    /// Hosting environment.
    pub environment: Environment,
    /// Disable streaming for every response.
    pub prevent_streaming: bool,
    /// Registered interactive runtimes.
    pub render_modes: RenderModePrefs,
    /// Validity window of sealed server descriptors, in seconds.
    pub descriptor_lifetime_secs: u64,
    /// Client runtime scripts.
    pub bootstrap: BootstrapPrefs,
    /// Public origin used to resolve navigation targets; `None` uses the
    /// request's `Host` header.
    pub base_uri: Option<String>,
}

impl Default for ServerPrefs {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8088".into(),
            environment: Environment::default(),
            prevent_streaming: false,
            render_modes: RenderModePrefs::default(),
            descriptor_lifetime_secs: 300,
            bootstrap: BootstrapPrefs::default(),
            base_uri: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let prefs: ServerPrefs =
            serde_json::from_str(r#"{"environment":"development","prevent_streaming":true}"#)
                .unwrap();
        assert!(prefs.environment.is_development());
        assert!(prefs.prevent_streaming);
        assert_eq!(prefs.listen, ServerPrefs::default().listen);
        assert_eq!(prefs.descriptor_lifetime_secs, 300);
    }

    #[test]
    fn environment_parses_short_names() {
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert_eq!("Production".parse::<Environment>(), Ok(Environment::Production));
        assert!("qa".parse::<Environment>().is_err());
    }
}
