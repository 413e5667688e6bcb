// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deterministic clock, protector and endpoint options.

use std::sync::Arc;

use time::OffsetDateTime;
use weft_proto::{FixedClock, KeyedProtector};
use weft_stream::EndpointOptions;

/// Master key of [`test_protector`].
pub const TEST_MASTER_KEY: [u8; 32] = [0x5a; 32];

/// Instant [`test_clock`] starts at.
pub const TEST_EPOCH: OffsetDateTime = time::macros::datetime!(2024-06-01 12:00 UTC);

/// Clock frozen at [`TEST_EPOCH`].
pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(TEST_EPOCH))
}

/// Protector keyed by [`TEST_MASTER_KEY`] that reads expiry from `clock`.
pub fn test_protector(clock: Arc<FixedClock>) -> Arc<KeyedProtector> {
    Arc::new(KeyedProtector::with_clock(TEST_MASTER_KEY, clock))
}

/// Unconstrained endpoint options sharing one fixed clock and protector.
///
/// The protector is returned too so tests can verify what the page carries.
pub fn test_options() -> (EndpointOptions, Arc<KeyedProtector>, Arc<FixedClock>) {
    let clock = test_clock();
    let protector = test_protector(Arc::clone(&clock));
    let options = EndpointOptions::new(protector.clone()).with_clock(clock.clone());
    (options, protector, clock)
}
