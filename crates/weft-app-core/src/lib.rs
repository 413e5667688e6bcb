// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for weft hosts (config port, server prefs).
//! Keeps the HTTP host thin: storage lives behind [`config::ConfigStore`].
#![forbid(unsafe_code)]

pub mod config;
pub mod prefs;
