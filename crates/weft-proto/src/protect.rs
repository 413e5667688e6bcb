// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Protection port for server descriptors, plus a keyed reference protector.
//!
//! Production hosts plug a vetted AEAD (or their platform's data-protection
//! service) in through [`DataProtector`]. [`KeyedProtector`] is a reference
//! and test protector built on BLAKE3: derived per-purpose keys, an XOF
//! keystream and a keyed-hash tag. It has had no cryptographic review; use it
//! for tests, demos and local development only.
//!
//! # Blob layout
//!
//! ```text
//! VERSION(1) || NONCE(16) || EXPIRES_UNIX_SECS(8, BE) || CIPHERTEXT || TAG(32)
//! ```
//!
//! TAG = keyed-BLAKE3 over everything before it. The tag is checked before
//! the expiry, so an expired blob is still known to be authentic when the
//! caller sees [`ProtectError::Expired`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use blake3::Hasher;
use time::OffsetDateTime;

const VERSION: u8 = 1;
const NONCE_BYTES: usize = 16;
const EXPIRY_BYTES: usize = 8;
const TAG_BYTES: usize = 32;
const HEADER_BYTES: usize = 1 + NONCE_BYTES + EXPIRY_BYTES;

const ENC_CONTEXT: &str = "weft 2024-06 descriptor protector encryption key";
const MAC_CONTEXT: &str = "weft 2024-06 descriptor protector authentication key";

/// Source of "now" for timestamps and expiry checks.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    /// A clock frozen at `now`.
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now = now.saturating_add(time::Duration::seconds(saturating_secs(by)));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Why a protected blob was not accepted.
///
/// Every variant means "not authentic": callers must not use any part of the
/// blob after seeing one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtectError {
    /// Too short, or an unknown layout version.
    #[error("protected payload is malformed")]
    Malformed,
    /// Tag mismatch: tampered bytes, wrong key, or wrong purpose.
    #[error("protected payload failed authentication")]
    Tampered,
    /// Authentic, but past its validity window.
    #[error("protected payload expired")]
    Expired,
    /// The protection engine itself failed.
    #[error("protection engine unavailable: {0}")]
    Unavailable(String),
}

/// Authenticated encryption, scoped by purpose and limited in time.
pub trait DataProtector: Send + Sync {
    /// Encrypt `plaintext` for `purpose`, valid for `lifetime` from now.
    fn protect(
        &self,
        purpose: &str,
        plaintext: &[u8],
        lifetime: Duration,
    ) -> Result<Vec<u8>, ProtectError>;

    /// Decrypt a blob produced by [`protect`](Self::protect) with the same purpose.
    fn unprotect(&self, purpose: &str, protected: &[u8]) -> Result<Vec<u8>, ProtectError>;
}

/// BLAKE3-based reference [`DataProtector`] keyed by a 32-byte master secret.
///
/// Not a reviewed AEAD; see the module docs.
pub struct KeyedProtector {
    master: [u8; 32],
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for KeyedProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedProtector").finish_non_exhaustive()
    }
}

impl KeyedProtector {
    /// Protector over `master`, using the system clock.
    pub fn new(master: [u8; 32]) -> Self {
        Self::with_clock(master, Arc::new(SystemClock))
    }

    /// Protector over `master`, reading time from `clock`.
    pub fn with_clock(master: [u8; 32], clock: Arc<dyn Clock>) -> Self {
        Self { master, clock }
    }

    /// Protector over a fresh random key (keys do not survive the process).
    pub fn ephemeral() -> Self {
        Self::new(rand::random())
    }

    fn subkey(&self, context: &str, purpose: &str) -> [u8; 32] {
        let mut material = Vec::with_capacity(self.master.len() + purpose.len());
        material.extend_from_slice(&self.master);
        material.extend_from_slice(purpose.as_bytes());
        blake3::derive_key(context, &material)
    }

    fn apply_keystream(key: &[u8; 32], nonce: &[u8], data: &mut [u8]) {
        let mut hasher = Hasher::new_keyed(key);
        hasher.update(nonce);
        let mut reader = hasher.finalize_xof();
        let mut stream = vec![0u8; data.len()];
        reader.fill(&mut stream);
        for (byte, pad) in data.iter_mut().zip(stream) {
            *byte ^= pad;
        }
    }

    fn tag(key: &[u8; 32], body: &[u8]) -> blake3::Hash {
        blake3::keyed_hash(key, body)
    }
}

impl DataProtector for KeyedProtector {
    fn protect(
        &self,
        purpose: &str,
        plaintext: &[u8],
        lifetime: Duration,
    ) -> Result<Vec<u8>, ProtectError> {
        let nonce: [u8; NONCE_BYTES] = rand::random();
        let expires = self
            .clock
            .now()
            .unix_timestamp()
            .saturating_add(saturating_secs(lifetime));

        let mut out = Vec::with_capacity(HEADER_BYTES + plaintext.len() + TAG_BYTES);
        out.push(VERSION);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&expires.to_be_bytes());
        let body_start = out.len();
        out.extend_from_slice(plaintext);
        Self::apply_keystream(
            &self.subkey(ENC_CONTEXT, purpose),
            &nonce,
            &mut out[body_start..],
        );
        let tag = Self::tag(&self.subkey(MAC_CONTEXT, purpose), &out);
        out.extend_from_slice(tag.as_bytes());
        Ok(out)
    }

    fn unprotect(&self, purpose: &str, protected: &[u8]) -> Result<Vec<u8>, ProtectError> {
        if protected.len() < HEADER_BYTES + TAG_BYTES || protected[0] != VERSION {
            return Err(ProtectError::Malformed);
        }
        let (signed, tag) = protected.split_at(protected.len() - TAG_BYTES);
        let mut expected = [0u8; TAG_BYTES];
        expected.copy_from_slice(tag);
        // blake3::Hash equality is constant-time.
        if Self::tag(&self.subkey(MAC_CONTEXT, purpose), signed) != blake3::Hash::from(expected) {
            return Err(ProtectError::Tampered);
        }

        let nonce = &signed[1..=NONCE_BYTES];
        let mut expiry = [0u8; EXPIRY_BYTES];
        expiry.copy_from_slice(&signed[1 + NONCE_BYTES..HEADER_BYTES]);
        if self.clock.now().unix_timestamp() > i64::from_be_bytes(expiry) {
            return Err(ProtectError::Expired);
        }

        let mut plaintext = signed[HEADER_BYTES..].to_vec();
        Self::apply_keystream(&self.subkey(ENC_CONTEXT, purpose), nonce, &mut plaintext);
        Ok(plaintext)
    }
}

fn saturating_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
