// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for weft crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`fixtures`] - Deterministic clock, protector and endpoint options
//! - [`frames`] - Frame, component and batch builders
//! - [`renderer`] - Closure-backed and single-batch tree renderers
//! - [`response`] - Response collection and page inspection

pub mod config;
pub mod fixtures;
pub mod frames;
pub mod renderer;
pub mod response;

pub use config::InMemoryConfigStore;
pub use fixtures::{test_clock, test_options, test_protector, TEST_EPOCH, TEST_MASTER_KEY};
pub use frames::{child, el, markup, text, BatchBuilder, ComponentBuilder, ElementBuilder, TEST_ASSEMBLY};
pub use renderer::{FnRenderer, StaticRenderer};
pub use response::{collect_response, descriptors_in, CollectedResponse};
