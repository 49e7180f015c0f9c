use std::time::Duration;

/// Clock value after which stress mode stops issuing operations.
pub const STRESS_TIMEOUT: u64 = 30;

/// A new stress worker is spawned every this many clock ticks.
pub const STRESS_SPAWN_EVERY: u64 = STRESS_TIMEOUT / 5;

/// Workers allocate more memory whenever the clock is a multiple of this.
pub const STRESS_ALLOCATE_EVERY: u64 = 10;

/// Pause between two steps of a stress worker (outside the lock).
pub const STRESS_STEP_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on concurrently running stress workers.
pub const STRESS_MAX_WORKERS: usize = 16;

/// Seed used when none is supplied and the system clock is unusable.
pub const DEFAULT_SEED: u64 = 0x2545_F491_4F6C_DD1D;

/// Placeholder rendered for an unoccupied frame in snapshots.
pub const EMPTY_FRAME: &str = "EMPTY";
