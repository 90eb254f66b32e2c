//! Storage key derivation and the time source behind it.
//!
//! Proof record keys take the form `PROOF_<unix_ms>_<hash>`. `hash` is the
//! FNV-1a 32-bit digest of the canonical JSON of the candidate document,
//! written in lowercase base 36. The hash only spreads keys that were created
//! in the same millisecond. It is neither a security property nor a
//! deduplication mechanism. Ticket keys are `TICKET_<id>`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// FNV-1a, 32-bit.
#[must_use]
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV32_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}

/// Lowercase base-36 rendering.
#[must_use]
pub fn base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(7);
    while value > 0 {
        out.push(char::from(DIGITS[(value % 36) as usize]));
        value /= 36;
    }
    out.iter().rev().collect()
}

/// Key for a new proof record.
///
/// Object keys serialise in sorted order, so the hash does not depend on the
/// field order of the caller's payload.
#[must_use]
pub fn new_record_key<T: Serialize + ?Sized>(candidate: &T, timestamp_ms: i64) -> String {
    let canonical = serde_json::to_vec(candidate).unwrap_or_default();
    format!("PROOF_{timestamp_ms}_{}", base36(fnv1a32(&canonical)))
}

/// Key for a ticket.
#[must_use]
pub fn ticket_key(id: &str) -> String {
    format!("TICKET_{id}")
}

// =============================================================================
// Clock
// =============================================================================

/// Time source for keys and `createdAt` stamps.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// RFC 3339 UTC timestamp with second precision, e.g.
    /// `2024-03-01T10:00:00Z`.
    fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Clock frozen at `millis` after the Unix epoch. Out-of-range values
    /// clamp to the epoch.
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        Self(DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
