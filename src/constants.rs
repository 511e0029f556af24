/// Fixed race duration, from creation to end-of-race.
pub const RACE_DURATION_MS: u64 = 60_000;

/// Maximum member count per race; a full race rolls joiners over to a fresh one.
pub const RACE_CAPACITY: usize = 50;

/// How long an ended (or abandoned) race stays queryable before the sweep reclaims it.
pub const RACE_RETENTION_MS: u64 = 600_000;

pub const SWEEP_INTERVAL_MS: u64 = 300_000;

/// Granularity of the countdown broadcast.
pub const TIMER_TICK_MS: u64 = 1_000;

pub const DEFAULT_PORT: u16 = 3001;
