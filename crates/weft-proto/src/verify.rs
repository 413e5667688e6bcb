// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Verification of server descriptors echoed back by a client.
//!
//! When a client opens its server connection it returns every server
//! descriptor it found in the page. The set is accepted only as a whole:
//! every payload must be authentic and unexpired, all must come from one
//! invocation, and their sealed sequences must run 0, 1, 2, … without gaps or
//! repeats. One bad descriptor rejects the set.

use std::sync::Arc;

use crate::descriptor::{
    ComponentDescriptor, DescriptorKind, ServerComponentPayload, SERVER_DESCRIPTOR_PURPOSE,
};
use crate::protect::{DataProtector, ProtectError};

/// Why a descriptor set was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Nothing to verify.
    #[error("no server descriptors supplied")]
    Empty,
    /// The descriptor does not target the server runtime.
    #[error("descriptor {index} is not a server descriptor")]
    NotServer {
        /// Position in the supplied set.
        index: usize,
    },
    /// The descriptor has no protected payload.
    #[error("descriptor {index} has no protected payload")]
    MissingPayload {
        /// Position in the supplied set.
        index: usize,
    },
    /// The protector refused the payload.
    #[error("descriptor {index} is not authentic: {source}")]
    NotAuthentic {
        /// Position in the supplied set.
        index: usize,
        /// Protector failure.
        source: ProtectError,
    },
    /// Authentic bytes that do not decode to a payload.
    #[error("descriptor {index} carries a malformed payload")]
    MalformedPayload {
        /// Position in the supplied set.
        index: usize,
    },
    /// Payloads from more than one invocation.
    #[error("descriptor {index} was issued by another invocation")]
    InvocationMismatch {
        /// Position in the supplied set.
        index: usize,
    },
    /// Sealed sequences are not 0..n.
    #[error("server sequence out of order: expected {expected}, found {found}")]
    OutOfSequence {
        /// Next sequence the set should contain.
        expected: u64,
        /// Sequence actually found.
        found: u64,
    },
}

/// Checks server descriptors against the protector that sealed them.
#[derive(Clone)]
pub struct ServerDescriptorVerifier {
    protector: Arc<dyn DataProtector>,
}

impl std::fmt::Debug for ServerDescriptorVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDescriptorVerifier").finish_non_exhaustive()
    }
}

impl ServerDescriptorVerifier {
    /// Verifier over `protector`.
    pub fn new(protector: Arc<dyn DataProtector>) -> Self {
        Self { protector }
    }

    /// Unseal one descriptor, without any set-level checks.
    pub fn unseal(
        &self,
        index: usize,
        descriptor: &ComponentDescriptor,
    ) -> Result<ServerComponentPayload, VerifyError> {
        match descriptor.kind {
            Some(DescriptorKind::Server | DescriptorKind::Auto) => {}
            _ => return Err(VerifyError::NotServer { index }),
        }
        let sealed = descriptor
            .protected_payload
            .as_deref()
            .ok_or(VerifyError::MissingPayload { index })?;
        let plaintext = self
            .protector
            .unprotect(SERVER_DESCRIPTOR_PURPOSE, sealed)
            .map_err(|source| VerifyError::NotAuthentic { index, source })?;
        serde_json::from_slice(&plaintext).map_err(|_| VerifyError::MalformedPayload { index })
    }

    /// Verify a full set, returning the payloads ordered by sealed sequence.
    pub fn verify(
        &self,
        descriptors: &[ComponentDescriptor],
    ) -> Result<Vec<ServerComponentPayload>, VerifyError> {
        if descriptors.is_empty() {
            return Err(VerifyError::Empty);
        }
        let mut payloads: Vec<ServerComponentPayload> = Vec::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.iter().enumerate() {
            let payload = self.unseal(index, descriptor)?;
            if let Some(first) = payloads.first() {
                if first.invocation_id != payload.invocation_id {
                    return Err(VerifyError::InvocationMismatch { index });
                }
            }
            payloads.push(payload);
        }
        payloads.sort_by_key(|p| p.sequence);
        for (expected, payload) in (0u64..).zip(&payloads) {
            if payload.sequence != expected {
                return Err(VerifyError::OutOfSequence {
                    expected,
                    found: payload.sequence,
                });
            }
        }
        Ok(payloads)
    }
}
