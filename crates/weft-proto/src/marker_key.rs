// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Boundary marker keys.
//!
//! An open boundary marker and its close marker carry the same key so that a
//! streaming consumer can pair them without extra bookkeeping. The canonical
//! text form is
//!
//! ```text
//! locationHash:sequence:formattedComponentKey
//! ```
//!
//! The third segment is developer-derived and may itself contain colons or
//! braces, so it is never escaped. How a parser treats a colon in the third
//! segment is a property of the [`MarkerKeyGrammar`] in use.

use blake3::Hasher;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::TypeIdentity;

const SEPARATOR: char = ':';

/// Number of hash bytes kept in a [`LocationHash`] (rendered as hex).
pub const LOCATION_HASH_BYTES: usize = 16;

/// Stable, non-reversible hash of a component's type name.
///
/// Used instead of the raw type name so markers neither leak type names nor
/// grow with them. Always non-empty and never contains the key separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationHash(String);

impl LocationHash {
    /// Hash a component type (`blake3("component-type:" || assembly/name)`).
    pub fn of(type_identity: &TypeIdentity) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"component-type:");
        hasher.update(type_identity.full_name().as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest.as_bytes()[..LOCATION_HASH_BYTES]))
    }

    /// Accept an already-rendered hash segment.
    ///
    /// Returns `None` for an empty segment or one containing the separator.
    pub fn parse(segment: &str) -> Option<Self> {
        if segment.is_empty() || segment.contains(SEPARATOR) {
            return None;
        }
        Some(Self(segment.to_owned()))
    }

    /// The rendered hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocationHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation key for one boundary marker pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundaryMarkerKey {
    location_hash: LocationHash,
    sequence: u64,
    formatted_component_key: String,
}

impl BoundaryMarkerKey {
    /// Assemble a key from its three parts.
    pub fn new(
        location_hash: LocationHash,
        sequence: u64,
        formatted_component_key: impl Into<String>,
    ) -> Self {
        Self {
            location_hash,
            sequence,
            formatted_component_key: formatted_component_key.into(),
        }
    }

    /// Key for a mount of `type_identity` at `sequence`, keyed by `key`.
    pub fn for_component(type_identity: &TypeIdentity, sequence: u64, key: &ComponentKey) -> Self {
        Self::new(LocationHash::of(type_identity), sequence, key.formatted())
    }

    /// Hash of the mounted component's type.
    pub fn location_hash(&self) -> &LocationHash {
        &self.location_hash
    }

    /// Render sequence distinguishing repeated mounts at one site.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Developer key in canonical text form; empty when none was supplied.
    pub fn formatted_component_key(&self) -> &str {
        &self.formatted_component_key
    }

    /// True iff a developer key was supplied.
    pub fn has_component_key(&self) -> bool {
        !self.formatted_component_key.is_empty()
    }

    /// Parse with the [`MarkerKeyGrammar::FreeTrailingSegment`] grammar.
    pub fn try_parse(text: &str) -> Option<Self> {
        MarkerKeyGrammar::FreeTrailingSegment.try_parse(text)
    }
}

impl std::fmt::Display for BoundaryMarkerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.location_hash, self.sequence, self.formatted_component_key
        )
    }
}

impl std::str::FromStr for BoundaryMarkerKey {
    type Err = InvalidMarkerKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s).ok_or(InvalidMarkerKey)
    }
}

/// Returned by [`BoundaryMarkerKey::from_str`](std::str::FromStr) for malformed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed boundary marker key")]
pub struct InvalidMarkerKey;

/// Text grammars for [`BoundaryMarkerKey`].
///
/// Both grammars split on the first two separators. They differ only in what
/// they accept after the second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerKeyGrammar {
    /// The remainder after the second separator is taken verbatim, colons
    /// included. Emitted boundary markers use this grammar.
    #[default]
    FreeTrailingSegment,
    /// Exactly three fields: a separator in the third segment is rejected.
    StrictThreeField,
}

impl MarkerKeyGrammar {
    /// Parse `text` under this grammar.
    ///
    /// Fails (returns `None`, never panics) on empty input, fewer than two
    /// separators, an empty location hash, a sequence that is not plain
    /// decimal, and, under [`StrictThreeField`](Self::StrictThreeField), a
    /// separator in the trailing segment.
    pub fn try_parse(self, text: &str) -> Option<BoundaryMarkerKey> {
        if text.is_empty() {
            return None;
        }
        let mut parts = text.splitn(3, SEPARATOR);
        let hash = parts.next()?;
        let sequence = parts.next()?;
        let formatted = parts.next()?;
        if self == MarkerKeyGrammar::StrictThreeField && formatted.contains(SEPARATOR) {
            return None;
        }
        let location_hash = LocationHash::parse(hash)?;
        let sequence = parse_decimal(sequence)?;
        Some(BoundaryMarkerKey::new(location_hash, sequence, formatted))
    }
}

fn parse_decimal(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Developer-supplied component key.
///
/// Value-like keys have a canonical, locale-independent text form that
/// survives into markers. Arbitrary objects have no stable text form and
/// count as "no key supplied".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ComponentKey {
    /// No key.
    #[default]
    None,
    /// Boolean key (`true` / `false`).
    Bool(bool),
    /// Signed integer key.
    Int(i64),
    /// Unsigned integer key.
    UInt(u64),
    /// Floating-point key (shortest round-trip decimal).
    Float(f64),
    /// Single character key.
    Char(char),
    /// String key, taken verbatim.
    Text(String),
    /// Timestamp key, rendered as RFC 3339 in UTC. Instants RFC 3339 cannot
    /// express (UTC year outside 0..=9999) render as Unix nanoseconds.
    DateTime(OffsetDateTime),
    /// GUID key, rendered hyphenated lowercase.
    Guid(Uuid),
    /// Any other object; never produces a stable key.
    Object,
}

impl ComponentKey {
    /// Canonical text form; empty for [`None`](Self::None) and
    /// [`Object`](Self::Object).
    pub fn formatted(&self) -> String {
        match self {
            ComponentKey::None | ComponentKey::Object => String::new(),
            ComponentKey::Bool(v) => v.to_string(),
            ComponentKey::Int(v) => v.to_string(),
            ComponentKey::UInt(v) => v.to_string(),
            ComponentKey::Float(v) => v.to_string(),
            ComponentKey::Char(v) => v.to_string(),
            ComponentKey::Text(v) => v.clone(),
            ComponentKey::DateTime(v) => format_instant(*v),
            ComponentKey::Guid(v) => v.hyphenated().to_string(),
        }
    }
}

fn format_instant(at: OffsetDateTime) -> String {
    at.checked_to_offset(UtcOffset::UTC)
        .and_then(|utc| utc.format(&Rfc3339).ok())
        .unwrap_or_else(|| at.unix_timestamp_nanos().to_string())
}

impl From<&str> for ComponentKey {
    fn from(value: &str) -> Self {
        ComponentKey::Text(value.to_owned())
    }
}

impl From<String> for ComponentKey {
    fn from(value: String) -> Self {
        ComponentKey::Text(value)
    }
}

impl From<i64> for ComponentKey {
    fn from(value: i64) -> Self {
        ComponentKey::Int(value)
    }
}

impl From<u64> for ComponentKey {
    fn from(value: u64) -> Self {
        ComponentKey::UInt(value)
    }
}

impl From<Uuid> for ComponentKey {
    fn from(value: Uuid) -> Self {
        ComponentKey::Guid(value)
    }
}
