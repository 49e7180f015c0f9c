use std::path::PathBuf;

/// Failures surfaced by [`MemoryManager`](crate::vm_manager::MemoryManager) operations.
///
/// Page faults are not part of this taxonomy: they are serviced inside the
/// manager and only show up as `faulted` on a successful access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("segmentation fault: process {process} tried to access {address} (size {size})")]
    SegmentationFault {
        process: String,
        address: usize,
        size: usize,
    },
    #[error("out of memory: no room for {requested} bytes of process {process}")]
    OutOfMemory { process: String, requested: usize },
    #[error("process {0} already exists")]
    DuplicateProcess(String),
    #[error("process {0} not found")]
    ProcessNotFound(String),
    #[error("page {logical_page} of process {process} is resident in neither RAM nor disk")]
    InternalConsistency {
        process: String,
        logical_page: usize,
    },
}

/// Failures of a single [`FrameStore`](crate::memory::FrameStore).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("no empty frame available")]
    Full,
    #[error("not enough space for the requested allocation")]
    OutOfSpace,
    #[error("frame {0} is empty")]
    EmptyFrame(usize),
    #[error("frame {0} is out of range")]
    FrameOutOfRange(usize),
}

/// Errors raised while reading a run script or the command line.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing header field: {0}")]
    MissingField(&'static str),
    #[error("line {line}: invalid {field}: {value}")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("line {line}: invalid mode {value:?}, use 0/sequential or 1/stress")]
    InvalidMode { line: usize, value: String },
    #[error("line {line}: invalid eviction policy {value:?}, use 'lru' or 'sequential'")]
    InvalidPolicy { line: usize, value: String },
    #[error("page size must be positive")]
    ZeroPageSize,
    #[error("RAM must hold at least one page")]
    NoRamFrames,
    #[error("{field} of {bytes} bytes is not a multiple of the page size {page_size}")]
    NotPageAligned {
        field: &'static str,
        bytes: usize,
        page_size: usize,
    },
    #[error("line {line}: malformed command {text:?}")]
    InvalidCommand { line: usize, text: String },
    #[error("{0}")]
    Usage(String),
}
