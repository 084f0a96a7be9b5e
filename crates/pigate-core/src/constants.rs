//! Shared constants for the PiGate edge controller.
//!
//! Everything that more than one crate needs to agree on lives here: the
//! Wiegand keypad timing, gate and sync defaults, the messaging topic
//! templates and payload values, and the column names of the tabular
//! credential feed.
//!
//! # Messaging Layout
//!
//! All topics are scoped by a location identifier:
//!
//! | Topic | Payloads | Direction |
//! |-------|----------|-----------|
//! | `{location}/pigate/command` | `open`, `close`, `hold_open` | inbound |
//! | `{location}/pigate/status` | `opened`, `closed` | outbound |
//! | `{location}/credentials/status` | `update_available` | both |
//!
//! # Usage
//!
//! ```
//! use pigate_core::constants::*;
//!
//! assert_eq!(MAX_KEYS_PER_CODE, 5);
//! assert_eq!(topic_for("site-7", TOPIC_PIGATE_COMMAND), "site-7/pigate/command");
//! ```

// ============================================================================
// Keypad Decoding
// ============================================================================

/// Number of bits that make up one keypad key.
pub const BITS_PER_KEY: usize = 4;

/// Maximum number of keys collected into one code.
///
/// Completing this many keys emits the code immediately.
pub const MAX_KEYS_PER_CODE: usize = 5;

/// Maximum gap between two bits of the same key, in milliseconds.
///
/// A partial key older than this is discarded.
pub const DEFAULT_KEY_FRAME_TIMEOUT_MS: u64 = 100;

/// Maximum gap between two completed keys of the same code, in milliseconds.
///
/// When it elapses, the keys collected so far are emitted as a shorter code.
pub const DEFAULT_INTER_KEY_TIMEOUT_MS: u64 = 3_000;

/// Frame length of the badge reader variant (Wiegand 26).
pub const DEFAULT_BADGE_FRAME_BITS: usize = 26;

/// Maximum gap between bits of one badge frame, in milliseconds.
pub const DEFAULT_BADGE_FRAME_TIMEOUT_MS: u64 = 50;

/// Capacity of the queue between the pulse sampler and the decoder.
///
/// When the queue is full new bits are dropped rather than blocking the
/// sampling path.
pub const DEFAULT_BIT_QUEUE_CAPACITY: usize = 64;

/// Marker emitted for a 4-bit key outside `0-9`, `*`, `#`.
pub const UNKNOWN_KEY: char = '?';

// ============================================================================
// Gate
// ============================================================================

/// How long a regular open keeps the gate energized, in seconds.
pub const DEFAULT_GATE_OPEN_SECS: u64 = 30;

/// BCM pin of the gate relay in the reference wiring.
pub const DEFAULT_RELAY_PIN: u32 = 17;

/// BCM pin of the status LED in the reference wiring.
pub const DEFAULT_LED_PIN: u32 = 27;

/// BCM pin of the keypad D0 line.
pub const DEFAULT_D0_PIN: u32 = 23;

/// BCM pin of the keypad D1 line.
pub const DEFAULT_D1_PIN: u32 = 24;

/// Number of gate transitions kept for inspection.
pub const MAX_GATE_HISTORY: usize = 100;

// ============================================================================
// Sync
// ============================================================================

/// Period of the scheduled credential sync, in seconds (24 hours).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Window in which repeated notification or file triggers collapse into one
/// sync pass, in seconds.
pub const DEFAULT_SYNC_COOLDOWN_SECS: u64 = 5;

/// Deadline for any network-bound operation, in seconds.
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 30;

/// Deadline for a single credential store call, in seconds.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Access group assigned to feed records that carry none.
pub const DEFAULT_ACCESS_GROUP: i64 = 1;

/// Object key of the JSON credential snapshot.
pub const DEFAULT_SNAPSHOT_KEY: &str = "credentials.json";

// ============================================================================
// Tabular Feed
// ============================================================================

/// Feed column holding the resident name.
pub const FEED_COLUMN_RESIDENT: &str = "Resident";

/// Feed column holding the device (gate) code.
pub const FEED_COLUMN_DEVICE: &str = "DEVICE#";

/// Feed column holding the lock status.
pub const FEED_COLUMN_STATUS: &str = "SL";

/// Status value that marks a resident as locked out.
pub const LOCKED_OUT_SENTINEL: &str = "00";

// ============================================================================
// Messaging
// ============================================================================

/// Inbound gate commands.
pub const TOPIC_PIGATE_COMMAND: &str = "pigate/command";

/// Outbound gate status.
pub const TOPIC_PIGATE_STATUS: &str = "pigate/status";

/// Credential update notifications.
pub const TOPIC_CREDENTIALS_STATUS: &str = "credentials/status";

/// Command payload: timed open.
pub const COMMAND_OPEN: &str = "open";

/// Command payload: close now.
pub const COMMAND_CLOSE: &str = "close";

/// Command payload: open until closed.
pub const COMMAND_HOLD_OPEN: &str = "hold_open";

/// Status payload: gate energized.
pub const STATUS_OPENED: &str = "opened";

/// Status payload: gate released.
pub const STATUS_CLOSED: &str = "closed";

/// Credentials payload: a new snapshot is available.
pub const UPDATE_AVAILABLE: &str = "update_available";

/// Build a location-scoped topic.
///
/// # Examples
///
/// ```
/// use pigate_core::constants::{topic_for, TOPIC_PIGATE_STATUS};
///
/// assert_eq!(topic_for("loc1", TOPIC_PIGATE_STATUS), "loc1/pigate/status");
/// ```
pub fn topic_for(location_id: &str, suffix: &str) -> String {
    format!("{location_id}/{suffix}")
}
