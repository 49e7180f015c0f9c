use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::memory::EvictionPolicy;
use crate::vm_manager::Command;

/// How the commands of a run are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Commands are read from the script and applied in order
    Sequential,
    /// Worker threads issue random commands against a shared manager
    Stress,
}

/// Global configuration read from the script header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub mode: Mode,
    pub policy: EvictionPolicy,
    pub page_size: usize,
    pub ram_bytes: usize,
    pub disk_bytes: usize,
}

impl RunConfig {
    /// Validate store sizes against the page size.
    pub fn new(
        mode: Mode,
        policy: EvictionPolicy,
        page_size: usize,
        ram_bytes: usize,
        disk_bytes: usize,
    ) -> Result<Self, ConfigError> {
        if page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        for (field, bytes) in [("RAM size", ram_bytes), ("disk size", disk_bytes)] {
            if bytes % page_size != 0 {
                return Err(ConfigError::NotPageAligned {
                    field,
                    bytes,
                    page_size,
                });
            }
        }
        if ram_bytes == 0 {
            return Err(ConfigError::NoRamFrames);
        }

        Ok(RunConfig {
            mode,
            policy,
            page_size,
            ram_bytes,
            disk_bytes,
        })
    }

    #[inline]
    pub fn ram_frames(&self) -> usize {
        self.ram_bytes / self.page_size
    }

    #[inline]
    pub fn disk_frames(&self) -> usize {
        self.disk_bytes / self.page_size
    }
}

/// A parsed run script: header plus command list.
///
/// ```text
/// 0            mode: 0/sequential or 1/stress
/// lru          eviction policy: lru or sequential
/// 4            page size in bytes
/// 8            RAM size in bytes
/// 4            disk size in bytes
/// C A 4        create process A with 4 bytes
/// A A 3        access address 3 of A
/// M A 2        allocate 2 more bytes to A
/// ```
#[derive(Debug, Clone)]
pub struct Script {
    pub config: RunConfig,
    pub commands: Vec<Command>,
}

impl Script {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        // Blank lines and comments are skipped; keep 1-based line numbers
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let (line, value) = lines.next().ok_or(ConfigError::MissingField("mode"))?;
        let mode = parse_mode(line, value)?;

        let (line, value) = lines.next().ok_or(ConfigError::MissingField("policy"))?;
        let policy = EvictionPolicy::from_name(value).ok_or_else(|| ConfigError::InvalidPolicy {
            line,
            value: value.to_string(),
        })?;

        let (line, value) = lines.next().ok_or(ConfigError::MissingField("page size"))?;
        let page_size = parse_number(line, "page size", value)?;

        let (line, value) = lines.next().ok_or(ConfigError::MissingField("RAM size"))?;
        let ram_bytes = parse_number(line, "RAM size", value)?;

        let (line, value) = lines.next().ok_or(ConfigError::MissingField("disk size"))?;
        let disk_bytes = parse_number(line, "disk size", value)?;

        let config = RunConfig::new(mode, policy, page_size, ram_bytes, disk_bytes)?;
        let commands = lines
            .map(|(line, text)| parse_command(line, text))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Script { config, commands })
    }
}

fn parse_mode(line: usize, value: &str) -> Result<Mode, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "0" | "sequential" => Ok(Mode::Sequential),
        "1" | "stress" | "random" => Ok(Mode::Stress),
        _ => Err(ConfigError::InvalidMode {
            line,
            value: value.to_string(),
        }),
    }
}

fn parse_number(line: usize, field: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidNumber {
        line,
        field,
        value: value.to_string(),
    })
}

fn parse_command(line: usize, text: &str) -> Result<Command, ConfigError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let &[op, process, number] = tokens.as_slice() else {
        return Err(ConfigError::InvalidCommand {
            line,
            text: text.to_string(),
        });
    };
    let process = process.to_string();

    match op {
        "C" | "c" => Ok(Command::Create {
            process,
            size: parse_number(line, "size", number)?,
        }),
        "A" | "a" => Ok(Command::Access {
            process,
            address: parse_number(line, "address", number)?,
        }),
        "M" | "m" => Ok(Command::Allocate {
            process,
            size: parse_number(line, "size", number)?,
        }),
        _ => Err(ConfigError::InvalidCommand {
            line,
            text: text.to_string(),
        }),
    }
}
