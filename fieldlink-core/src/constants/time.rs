//! Time-Related Constants
//!
//! Intervals and budgets used by link supervision and the scheduler.

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;

// ===== LINK SUPERVISION =====

/// Association polls before a connect attempt is declared exhausted.
///
/// 600 polls at one second is the ten minute window the field units use;
/// hotspots behind a phone can take several minutes to come up.
pub const CONNECT_ATTEMPT_BUDGET: u32 = 600;

/// Delay between association polls (milliseconds).
pub const CONNECT_POLL_INTERVAL_MS: u32 = 1000;

/// Settle delay between teardown and a lightweight reconnect (milliseconds).
pub const RECONNECT_SETTLE_MS: u32 = 1000;

// ===== DELIVERY =====

/// Upper bound on a single HTTP delivery request (milliseconds).
pub const HTTP_TIMEOUT_MS: u64 = 5000;

/// Scheduler ticks between periodic spill replays while online.
///
/// Replays also run right after the link comes back, so this only
/// matters for long uninterrupted sessions.
pub const DEFAULT_REPLAY_EVERY_TICKS: u32 = 10;
