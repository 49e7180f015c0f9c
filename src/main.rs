//! VM Manager - Main Entry Point
//!
//! Usage: vm-manager [OPTIONS] <input_file>
//!
//! Arguments:
//!   input_file  - Run script: mode, policy, page/RAM/disk sizes, then commands
//!
//! Options:
//!   -v, --verbose        More log output (repeat, or -vv / -vvv)
//!   -s, --snapshots      Print RAM and disk after every operation
//!       --seed <N>       Seed for stress mode
//!       --timeout <N>    Stress mode clock limit
//!       --delay-ms <N>   Pause between stress worker steps
//!   -h, --help           Print help information

use std::env;
use std::error::Error;
use std::process;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{LevelFilter, error, info};

use vm_manager::constants::DEFAULT_SEED;
use vm_manager::error::ConfigError;
use vm_manager::io::{Mode, Script};
use vm_manager::stress::{self, StressConfig};
use vm_manager::{Command, MemoryError, MemoryManager};

/// Command-line configuration
struct Config {
    input_file: String,
    verbosity: u8,
    snapshots: bool,
    seed: Option<u64>,
    timeout: Option<u64>,
    delay: Option<Duration>,
}

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    // Run the simulation and handle any errors
    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn print_help(program: &str) {
    eprintln!("Virtual Memory Manager - Simulates paging between RAM and disk");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] <input_file>", program);
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  input_file  - Run script (mode, policy, page size, RAM size, disk size, commands)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -v, --verbose       More log output (repeat or use -vv, -vvv for more)");
    eprintln!("  -s, --snapshots     Print RAM and disk after every operation");
    eprintln!("      --seed <N>      Seed for stress mode");
    eprintln!("      --timeout <N>   Stress mode clock limit");
    eprintln!("      --delay-ms <N>  Pause between stress worker steps");
    eprintln!("  -h, --help          Print this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} script.txt", program);
    eprintln!("  {} -v -s script.txt", program);
}

fn parse_args() -> Result<Config, ConfigError> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("vm-manager", String::as_str);

    let mut config = Config {
        input_file: String::new(),
        verbosity: 0,
        snapshots: false,
        seed: None,
        timeout: None,
        delay: None,
    };
    let mut positional: Vec<&String> = Vec::new();
    let mut rest = args.iter().skip(1);

    while let Some(arg) = rest.next() {
        if let Some(count) = verbosity_flag(arg) {
            config.verbosity = config.verbosity.saturating_add(count);
            continue;
        }
        match arg.as_str() {
            "-h" | "--help" => {
                print_help(program);
                process::exit(0);
            }
            "--verbose" => config.verbosity = config.verbosity.saturating_add(1),
            "-s" | "--snapshots" => config.snapshots = true,
            "--seed" => config.seed = Some(option_value(arg, rest.next())?),
            "--timeout" => config.timeout = Some(option_value(arg, rest.next())?),
            "--delay-ms" => {
                config.delay = Some(Duration::from_millis(option_value(arg, rest.next())?));
            }
            _ if arg.starts_with('-') => {
                return Err(ConfigError::Usage(format!(
                    "Unknown option: {}\nUse --help for usage information.",
                    arg
                )));
            }
            _ => positional.push(arg),
        }
    }

    if positional.len() != 1 {
        print_help(program);
        return Err(ConfigError::Usage(format!(
            "\nError: Expected 1 argument, got {}",
            positional.len()
        )));
    }
    config.input_file = positional[0].clone();
    Ok(config)
}

/// Count of `v`s in a `-v`, `-vv`, `-vvv`... flag
fn verbosity_flag(arg: &str) -> Option<u8> {
    let vs = arg.strip_prefix('-')?;
    if vs.is_empty() || !vs.chars().all(|c| c == 'v') {
        return None;
    }
    Some(u8::try_from(vs.len()).unwrap_or(u8::MAX))
}

fn option_value(option: &str, value: Option<&String>) -> Result<u64, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::Usage(format!("{} requires a value", option)))?;
    value
        .parse()
        .map_err(|_| ConfigError::Usage(format!("Invalid value for {}: {}", option, value)))
}

fn init_logging(mode: Mode, verbosity: u8) {
    let levels = [
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    // Stress workers report their operations at info level
    let base = match mode {
        Mode::Sequential => 0,
        Mode::Stress => 1,
    };
    let level = levels[(base + verbosity as usize).min(levels.len() - 1)];
    // RUST_LOG still wins for the modules it names
    let result = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .try_init();
    if let Err(e) = result {
        eprintln!("Warning: logger already initialized: {}", e);
    }
}

/// Main logic separated from main() for cleaner error handling
fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    // Step 1: Parse the run script
    let script = Script::from_file(&config.input_file)?;
    let run_config = script.config;
    init_logging(run_config.mode, config.verbosity);

    println!(
        "Mode: {}. Eviction policy: {}",
        match run_config.mode {
            Mode::Sequential => "Sequential",
            Mode::Stress => "Stress",
        },
        run_config.policy
    );
    println!(
        "RAM size: {}. Disk size: {}",
        run_config.ram_bytes, run_config.disk_bytes
    );
    println!("Page size: {}", run_config.page_size);

    // Step 2: Set up RAM and disk
    let manager = MemoryManager::from_config(&run_config);

    // Step 3: Apply commands
    let manager = match run_config.mode {
        Mode::Sequential => run_sequential(manager, &script.commands, config.snapshots)?,
        Mode::Stress => {
            if !script.commands.is_empty() {
                info!(
                    "ignoring {} scripted commands in stress mode",
                    script.commands.len()
                );
            }
            run_stress(manager, config)
        }
    };

    // Step 4: Summary
    println!();
    println!("=== Summary ===");
    println!("{}", manager.snapshot());
    println!("{}", manager.stats());
    Ok(())
}

fn run_sequential(
    mut manager: MemoryManager,
    commands: &[Command],
    snapshots: bool,
) -> Result<MemoryManager, MemoryError> {
    for (time, command) in (0u64..).zip(commands) {
        match manager.execute(command, time) {
            Ok(outcome) => println!("-{}", outcome),
            Err(err @ MemoryError::InternalConsistency { .. }) => {
                error!("{} failed: {}", command, err);
                return Err(err);
            }
            Err(err) => println!("!{}", err),
        }
        if snapshots {
            println!("{}", manager.snapshot());
        }
    }
    Ok(manager)
}

fn run_stress(manager: MemoryManager, config: &Config) -> MemoryManager {
    let defaults = StressConfig::default();
    let stress_config = StressConfig {
        timeout: config.timeout.unwrap_or(defaults.timeout),
        spawn_every: config
            .timeout
            .map_or(defaults.spawn_every, |timeout| (timeout / 5).max(1)),
        delay: config.delay.unwrap_or(defaults.delay),
        seed: config.seed.unwrap_or_else(clock_seed),
        ..defaults
    };
    info!("stress seed: {}", stress_config.seed);

    let report = stress::run(manager, &stress_config);
    println!("Stress run finished at clock {}", report.clock);
    for worker in &report.workers {
        println!(
            "{}: {}, {} operations, {} failures",
            worker.process,
            if worker.created { "created" } else { "not created" },
            worker.operations,
            worker.failures
        );
    }
    report.manager
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(DEFAULT_SEED, |elapsed| elapsed.as_nanos() as u64)
}
