//! Random workload driver.
//!
//! Every worker thread simulates one process: it creates the process, then
//! keeps issuing random accesses (and now and then an allocation) until the
//! shared clock runs past the timeout. Workers share a single manager; each
//! operation plus the clock tick that follows it runs under one lock, and the
//! pacing delay is spent outside of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::constants::*;
use crate::error::MemoryError;
use crate::vm_manager::{Command, MemoryManager, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    /// Stop once the shared clock exceeds this value
    pub timeout: u64,
    /// Spawn a new worker every this many clock ticks
    pub spawn_every: u64,
    /// Allocate whenever the clock is a multiple of this
    pub allocate_every: u64,
    /// Pause between two steps of a worker
    pub delay: Duration,
    pub max_workers: usize,
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            timeout: STRESS_TIMEOUT,
            spawn_every: STRESS_SPAWN_EVERY,
            allocate_every: STRESS_ALLOCATE_EVERY,
            delay: STRESS_STEP_DELAY,
            max_workers: STRESS_MAX_WORKERS,
            seed: DEFAULT_SEED,
        }
    }
}

/// xorshift64* generator, reproducible from its seed
#[derive(Debug, Clone)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        // splitmix64 finalizer spreads nearby seeds apart; state must be non-zero
        let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        XorShift64 {
            state: if z == 0 { DEFAULT_SEED } else { z },
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform-ish value in `0..bound`; `0` when `bound` is zero
    pub fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        (self.next_u64() % bound as u64) as usize
    }

    /// Value in `low..=high`
    pub fn between(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        low + self.below(high - low + 1)
    }
}

/// What a single worker did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub process: String,
    pub created: bool,
    pub operations: u64,
    pub failures: u64,
}

impl WorkerReport {
    fn record(&mut self, result: &Result<Outcome, MemoryError>) {
        self.operations += 1;
        match result {
            Ok(outcome) => info!("{outcome}"),
            Err(err) => {
                self.failures += 1;
                info!("{err}");
            }
        }
    }
}

/// Final state of a stress run
#[derive(Debug)]
pub struct StressReport {
    pub manager: MemoryManager,
    pub clock: u64,
    pub workers: Vec<WorkerReport>,
}

struct Shared {
    manager: MemoryManager,
    clock: u64,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `command` at the current clock and advance it, as one critical section.
fn step(shared: &Mutex<Shared>, command: &Command) -> (Result<Outcome, MemoryError>, u64) {
    let mut guard = lock(shared);
    let time = guard.clock;
    let result = guard.manager.execute(command, time);
    guard.clock += 1;
    (result, guard.clock)
}

fn worker(
    index: usize,
    shared: &Mutex<Shared>,
    config: &StressConfig,
    ram_bytes: usize,
) -> WorkerReport {
    let name = format!("p{index}");
    let mut rng = XorShift64::new(config.seed.wrapping_add(index as u64));
    let max_size = (ram_bytes / 2).max(1);
    let allocate_every = config.allocate_every.max(1);

    let mut report = WorkerReport {
        process: name.clone(),
        ..WorkerReport::default()
    };

    let create = Command::Create {
        process: name.clone(),
        size: rng.between(1, max_size),
    };
    let (result, _) = step(shared, &create);
    report.record(&result);
    if result.is_err() {
        debug!("{name}: process not created, worker exits");
        return report;
    }
    report.created = true;

    loop {
        let access = Command::Access {
            process: name.clone(),
            address: rng.below(ram_bytes),
        };
        let (result, mut clock) = step(shared, &access);
        report.record(&result);
        if let Err(err @ MemoryError::InternalConsistency { .. }) = result {
            error!("{name}: {err}, worker stops");
            break;
        }

        if clock % allocate_every == 0 {
            let allocate = Command::Allocate {
                process: name.clone(),
                size: rng.between(1, max_size),
            };
            let (result, after) = step(shared, &allocate);
            report.record(&result);
            clock = after;
        }

        if clock > config.timeout {
            break;
        }
        thread::sleep(config.delay);
    }

    report
}

/// Drive `manager` with random workers until the clock passes the timeout.
pub fn run(manager: MemoryManager, config: &StressConfig) -> StressReport {
    let ram_bytes = manager.ram().capacity_bytes();
    let shared = Arc::new(Mutex::new(Shared { manager, clock: 0 }));
    let mut handles: Vec<JoinHandle<WorkerReport>> = Vec::new();
    let mut next_spawn = 0;

    loop {
        let clock = lock(&shared).clock;
        if clock > config.timeout {
            break;
        }

        // With nobody alive the clock stands still, so spawn right away
        let idle = handles.iter().all(JoinHandle::is_finished);
        if handles.len() < config.max_workers && (clock >= next_spawn || idle) {
            let index = handles.len();
            let shared = Arc::clone(&shared);
            let config = *config;
            debug!("spawning stress worker p{index} at clock {clock}");
            handles.push(thread::spawn(move || worker(index, &shared, &config, ram_bytes)));
            next_spawn = clock + config.spawn_every.max(1);
        } else if idle {
            warn!("all {} stress workers finished before the timeout", handles.len());
            break;
        }

        thread::sleep(config.delay);
    }

    let workers = handles
        .into_iter()
        .filter_map(|handle| match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                error!("stress worker panicked");
                None
            }
        })
        .collect();

    let Shared { manager, clock } = match Arc::try_unwrap(shared) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
        Err(shared) => {
            let guard = lock(&shared);
            Shared {
                manager: guard.manager.clone(),
                clock: guard.clock,
            }
        }
    };

    StressReport {
        manager,
        clock,
        workers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::EvictionPolicy;

    #[test]
    fn test_rng_is_reproducible() {
        let mut a = XorShift64::new(42);
        let mut b = XorShift64::new(42);
        let mut c = XorShift64::new(43);
        let first: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let second: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        let other: Vec<u64> = (0..8).map(|_| c.next_u64()).collect();
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_rng_bounds() {
        let mut rng = XorShift64::new(0);
        for _ in 0..1000 {
            assert!(rng.below(7) < 7);
            let value = rng.between(1, 4);
            assert!((1..=4).contains(&value));
        }
        assert_eq!(rng.below(0), 0);
        assert_eq!(rng.between(5, 5), 5);
    }

    fn quick_config(seed: u64) -> StressConfig {
        StressConfig {
            timeout: 60,
            spawn_every: 6,
            allocate_every: 10,
            delay: Duration::ZERO,
            max_workers: 4,
            seed,
        }
    }

    #[test]
    fn test_run_reaches_timeout() {
        let manager = MemoryManager::new(4, 4, 4, EvictionPolicy::Lru);
        let report = run(manager, &quick_config(7));

        assert!(report.clock > 60);
        assert!(!report.workers.is_empty());
        assert!(report.workers.len() <= 4);

        let operations: u64 = report.workers.iter().map(|w| w.operations).sum();
        assert_eq!(operations, report.clock);

        // Every created process is registered under its worker's name
        for worker in report.workers.iter().filter(|w| w.created) {
            assert!(report.manager.process(&worker.process).is_some());
        }
    }

    #[test]
    fn test_run_without_workers_terminates() {
        let manager = MemoryManager::new(4, 1, 0, EvictionPolicy::Sequential);
        let config = StressConfig {
            max_workers: 0,
            ..quick_config(1)
        };
        let report = run(manager, &config);
        assert_eq!(report.clock, 0);
        assert!(report.workers.is_empty());
    }

    #[test]
    fn test_run_with_failing_creates_terminates() {
        // RAM is taken and there is no disk: every worker fails to create its process
        let mut manager = MemoryManager::new(4, 1, 0, EvictionPolicy::Lru);
        manager.create_process("X", 4, 0).unwrap();
        let config = StressConfig {
            timeout: 1_000_000,
            ..quick_config(3)
        };

        let report = run(manager, &config);
        assert_eq!(report.workers.len(), 4);
        assert!(report.workers.iter().all(|w| !w.created && w.failures == 1));
        assert_eq!(report.clock, 4);
        assert_eq!(report.manager.stats().out_of_memory, 4);
    }
}
