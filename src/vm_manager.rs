use std::collections::BTreeMap;
use std::fmt;

use log::{Level, debug, log_enabled, trace, warn};

use crate::error::MemoryError;
use crate::io::RunConfig;
use crate::memory::{EvictionPolicy, FrameStore, StoreSnapshot};
use crate::process::Process;
use crate::translation::VirtualAddress;

/// One operation of a run, as read from a script or produced by a stress worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { process: String, size: usize },
    Access { process: String, address: usize },
    Allocate { process: String, size: usize },
}

impl Command {
    pub fn process(&self) -> &str {
        match self {
            Command::Create { process, .. }
            | Command::Access { process, .. }
            | Command::Allocate { process, .. } => process,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create { process, size } => write!(f, "C {process} {size}"),
            Command::Access { process, address } => write!(f, "A {process} {address}"),
            Command::Allocate { process, size } => write!(f, "M {process} {size}"),
        }
    }
}

/// A successful address access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    /// RAM frame that served the access
    pub frame: usize,
    pub address: VirtualAddress,
    /// Whether a page fault had to be serviced first
    pub faulted: bool,
}

/// Result of a successful [`Command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created { process: String, size: usize },
    Allocated { process: String, size: usize },
    Hit { process: String, access: Access },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created { process, size } => {
                write!(f, "process {process} created, size {size}")
            }
            Outcome::Allocated { process, size } => {
                write!(f, "memory allocated to process {process}, new size {size}")
            }
            Outcome::Hit { process, access } => {
                write!(
                    f,
                    "process {process} accessed address {} at frame {}",
                    access.address.va, access.frame
                )?;
                if access.faulted {
                    f.write_str(" after page fault")?;
                }
                Ok(())
            }
        }
    }
}

/// Event counters kept over the lifetime of a manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub page_faults: u64,
    pub evictions: u64,
    pub segmentation_faults: u64,
    pub out_of_memory: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page faults: {}, evictions: {}, segmentation faults: {}, out of memory: {}",
            self.page_faults, self.evictions, self.segmentation_faults, self.out_of_memory
        )
    }
}

/// RAM and disk side by side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub ram: StoreSnapshot,
    pub disk: StoreSnapshot,
}

impl fmt::Display for MemorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.ram, self.disk)
    }
}

/// Paged memory manager over a RAM and a disk [`FrameStore`].
///
/// Every operation takes the logical time it happens at; timestamps drive
/// the `lru` policy. Page faults are serviced internally by moving pages
/// between the two stores and never surface as errors.
#[derive(Debug, Clone)]
pub struct MemoryManager {
    ram: FrameStore,
    disk: FrameStore,
    page_size: usize,
    policy: EvictionPolicy,
    processes: BTreeMap<String, Process>,
    stats: Stats,
}

impl MemoryManager {
    pub fn new(
        page_size: usize,
        ram_frames: usize,
        disk_frames: usize,
        policy: EvictionPolicy,
    ) -> Self {
        MemoryManager {
            ram: FrameStore::new("RAM", page_size, ram_frames),
            disk: FrameStore::new("Disk", page_size, disk_frames),
            page_size,
            policy,
            processes: BTreeMap::new(),
            stats: Stats::default(),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.page_size,
            config.ram_frames(),
            config.disk_frames(),
            config.policy,
        )
    }

    #[inline]
    pub fn ram(&self) -> &FrameStore {
        &self.ram
    }

    #[inline]
    pub fn disk(&self) -> &FrameStore {
        &self.disk
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    #[inline]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn process(&self, name: &str) -> Option<&Process> {
        self.processes.get(name)
    }

    /// Registered processes, ordered by name
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            ram: self.ram.snapshot(),
            disk: self.disk.snapshot(),
        }
    }

    /// Run a single command at logical time `time`
    pub fn execute(&mut self, command: &Command, time: u64) -> Result<Outcome, MemoryError> {
        match command {
            Command::Create { process, size } => {
                self.create_process(process, *size, time)?;
                Ok(Outcome::Created {
                    process: process.clone(),
                    size: *size,
                })
            }
            Command::Access { process, address } => {
                let access = self.access_memory(process, *address, time)?;
                Ok(Outcome::Hit {
                    process: process.clone(),
                    access,
                })
            }
            Command::Allocate { process, size } => {
                let size = self.allocate_memory(process, *size, time)?;
                Ok(Outcome::Allocated {
                    process: process.clone(),
                    size,
                })
            }
        }
    }

    /// Create process `name` with `size` bytes of memory.
    pub fn create_process(&mut self, name: &str, size: usize, time: u64) -> Result<(), MemoryError> {
        if self.processes.contains_key(name) {
            return Err(MemoryError::DuplicateProcess(name.to_string()));
        }

        let frames = self.allocate_frames(name, size, 0, time)?;
        self.processes
            .insert(name.to_string(), Process::new(name, size, frames));
        debug!("process {name} created with size {size}");
        Ok(())
    }

    /// Grow process `name` by `bytes` and return its new size.
    ///
    /// New pages are numbered after the existing ones. The full request is
    /// credited to the process even when part of it was packed into
    /// existing pages.
    pub fn allocate_memory(
        &mut self,
        name: &str,
        bytes: usize,
        time: u64,
    ) -> Result<usize, MemoryError> {
        let first_page = self
            .processes
            .get(name)
            .ok_or_else(|| MemoryError::ProcessNotFound(name.to_string()))?
            .page_count();

        let frames = self.allocate_frames(name, bytes, first_page, time)?;
        let process = self
            .processes
            .get_mut(name)
            .ok_or_else(|| MemoryError::ProcessNotFound(name.to_string()))?;
        process.grow(&frames, bytes);
        debug!("{bytes} bytes allocated to {name}, new size {}", process.size());
        Ok(process.size())
    }

    /// Access `address` of process `name`, servicing a page fault if the
    /// page is on disk.
    pub fn access_memory(
        &mut self,
        name: &str,
        address: usize,
        time: u64,
    ) -> Result<Access, MemoryError> {
        let process = self
            .processes
            .get(name)
            .ok_or_else(|| MemoryError::ProcessNotFound(name.to_string()))?;

        if address >= process.size() {
            self.stats.segmentation_faults += 1;
            debug!(
                "segmentation fault: {name} tried to access {address}, size {}",
                process.size()
            );
            return Err(MemoryError::SegmentationFault {
                process: name.to_string(),
                address,
                size: process.size(),
            });
        }

        let va = VirtualAddress::from_raw(address, self.page_size);
        let mut faulted = false;

        for _ in 0..=self.ram.frame_count() {
            let frame = self
                .processes
                .get(name)
                .and_then(|process| process.frame_of(va.page))
                .ok_or_else(|| inconsistency(name, va.page))?;

            if self.ram.access(frame, time, name, va.page) {
                trace!("{name}: {va} hit in RAM frame {frame}");
                return Ok(Access {
                    frame,
                    address: va,
                    faulted,
                });
            }

            faulted = true;
            self.stats.page_faults += 1;
            debug!("page fault: {name} could not access {va} through RAM frame {frame}");

            let frame = self.page_in(name, va.page, time)?;
            if let Some(process) = self.processes.get_mut(name) {
                process.map_page(va.page, frame);
            }
        }

        Err(inconsistency(name, va.page))
    }

    /// Allocate in RAM, evicting one page to disk per failed attempt.
    fn allocate_frames(
        &mut self,
        name: &str,
        bytes: usize,
        first_page: usize,
        time: u64,
    ) -> Result<Vec<usize>, MemoryError> {
        let max_attempts = self.ram.frame_count();

        // Larger than all of RAM: no amount of eviction helps.
        if bytes <= self.ram.capacity_bytes() {
            for attempt in 0..=max_attempts {
                match self.ram.allocate(time, name, bytes, first_page) {
                    Ok(frames) => return Ok(frames),
                    Err(err) => debug!("no room in RAM for {bytes} bytes of {name}: {err}"),
                }

                let exhausted = self.disk.is_full()
                    && (self.ram.is_full() || bytes > self.ram.free_bytes());
                if attempt == max_attempts || exhausted || self.swap_out(time).is_none() {
                    break;
                }
            }
        }

        self.stats.out_of_memory += 1;
        warn!("out of memory: cannot fit {bytes} bytes for {name}");
        Err(MemoryError::OutOfMemory {
            process: name.to_string(),
            requested: bytes,
        })
    }

    /// Move the policy's RAM victim to disk and return the freed RAM frame.
    fn swap_out(&mut self, time: u64) -> Option<usize> {
        if self.disk.is_full() {
            return None;
        }

        self.log_snapshot("before eviction");
        let (index, victim) = self.ram.evict(self.policy)?;
        let owner = victim.page.owner().to_string();
        let logical_index = victim.logical_index;
        let slot = self.disk.insert(time, victim.page, logical_index).ok()?;

        self.stats.evictions += 1;
        debug!("evicted page {logical_index} of {owner} from RAM frame {index} to disk frame {slot}");
        self.log_snapshot("after eviction");
        Some(index)
    }

    /// Swap page `logical_page` of `name` from disk with the policy's RAM
    /// victim. Returns the RAM frame it now occupies.
    fn page_in(&mut self, name: &str, logical_page: usize, time: u64) -> Result<usize, MemoryError> {
        let on_disk = self
            .disk
            .find_by_owner(name, logical_page)
            .ok_or_else(|| inconsistency(name, logical_page))?;

        self.log_snapshot("before page fault");
        let incoming = self
            .disk
            .remove(on_disk)
            .map_err(|_| inconsistency(name, logical_page))?;

        // The policy's RAM candidate always moves out; an empty RAM has none.
        if let Some((index, victim)) = self.ram.evict(self.policy) {
            let owner = victim.page.owner().to_string();
            let logical_index = victim.logical_index;
            // The slot vacated above is free for the victim.
            let slot = self
                .disk
                .insert(time, victim.page, logical_index)
                .map_err(|_| inconsistency(&owner, logical_index))?;
            self.stats.evictions += 1;
            debug!(
                "evicted page {logical_index} of {owner} from RAM frame {index} to disk frame {slot}"
            );
        }

        let frame = self
            .ram
            .insert(time, incoming.page, incoming.logical_index)
            .map_err(|_| inconsistency(name, logical_page))?;
        debug!("loaded page {logical_page} of {name} from disk frame {on_disk} into RAM frame {frame}");
        self.log_snapshot("after page fault");
        Ok(frame)
    }

    fn log_snapshot(&self, when: &str) {
        if log_enabled!(Level::Debug) {
            debug!("{when}:\n{}", self.snapshot());
        }
    }
}

fn inconsistency(name: &str, logical_page: usize) -> MemoryError {
    MemoryError::InternalConsistency {
        process: name.to_string(),
        logical_page,
    }
}
