//! geologger - GPS track logger tool
//!
//! Resets the logger, queries or sets its sampling step, downloads the
//! stored track to a GPX (or JSON) file, or erases it.
//!
//! Usage:
//!   geologger [OPTIONS] <device> <mode> [param]
//!
//! Options:
//!   -v, -vv, ...      More protocol detail (repeatable)
//!   --config FILE     Session settings as JSON
//!   --demo            Talk to a simulated logger instead of a device

mod args;

use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use args::{Command, Invocation, Mode};
use geologger_core::config::SessionConfig;
use geologger_core::demo::DemoOpener;
use geologger_core::logging::LogConfig;
use geologger_core::protocol::{LinkOpener, SerialOpener};
use geologger_core::session::{self, Operation, OperationOutput};
use geologger_core::track::write_track_file;

const RULE: &str =
    "---------------------------------------------------------------------------------------";

/// Seed and size of the simulated logger's track
const DEMO_SEED: u64 = 2012;
const DEMO_POINTS: usize = 48;

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let command = match args::parse(&argv) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("geologger: {:#}", e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::Help => print_usage(),
        Command::Version => println!("geologger {}", env!("CARGO_PKG_VERSION")),
        Command::Run(invocation) => {
            if let Err(e) = run(invocation) {
                tracing::error!("{:#}", e);
                eprintln!("geologger: {:#}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn run(invocation: Invocation) -> Result<()> {
    let mut config = match &invocation.config {
        Some(path) => SessionConfig::load_json(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(device) = &invocation.device {
        config.device = device.clone();
    }
    if invocation.verbose > 0 {
        config.log = LogConfig::new(config.log.verbosity.saturating_add(invocation.verbose));
    }
    init_tracing(&config.log);

    let operation = match &invocation.mode {
        Mode::Reset => Operation::Reset,
        Mode::Query => Operation::QuerySampling,
        Mode::Set(rate) => Operation::SetSampling(*rate),
        Mode::Download(_) => Operation::Download,
        Mode::Clear => Operation::Clear,
    };

    let output = if invocation.demo {
        config.device = "demo".to_string();
        config.settle_delay_ms = 0;
        config.retune_delay_ms = 0;
        tracing::info!("demo mode: simulated logger with {} points", DEMO_POINTS);
        execute(&mut DemoOpener::random(DEMO_SEED, DEMO_POINTS), &config, operation)?
    } else {
        tracing::info!("using device {}", config.device);
        execute(&mut SerialOpener::new(&config), &config, operation)?
    };

    report(output, &invocation.mode)
}

fn execute<O: LinkOpener>(
    opener: &mut O,
    config: &SessionConfig,
    operation: Operation,
) -> Result<OperationOutput> {
    session::run(opener, config, operation)
        .with_context(|| format!("{:?} failed on '{}'", operation, config.device))
}

fn report(output: OperationOutput, mode: &Mode) -> Result<()> {
    match output {
        OperationOutput::Reset => banner("DEVICE RESET"),
        OperationOutput::SampleRate(rate) => banner(&format!("SAMPLING STEP: {:02} s", rate)),
        OperationOutput::SampleRateSet(rate) => {
            banner(&format!("SAMPLING STEP SET TO : {:02} s", rate))
        }
        OperationOutput::Downloaded(track) => {
            let Mode::Download(path) = mode else {
                anyhow::bail!("download finished without an output file");
            };
            banner(&format!(
                "DOWNLOAD DONE: {} datapoints acquired. Saving to file '{}'",
                track.len(),
                path.display()
            ));
            write_track_file(&track, path)
                .with_context(|| format!("cannot write '{}'", path.display()))?;
        }
        OperationOutput::Cleared => banner("DEVICE CLEARED"),
    }
    Ok(())
}

fn banner(text: &str) {
    println!("{}", RULE);
    println!("  {}", text);
    println!("{}", RULE);
}

/// `RUST_LOG` wins over the verbosity flags when set
fn init_tracing(log: &LogConfig) {
    let level = log.tracing_level();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("geologger={level},geologger_core={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("usage: geologger [OPTIONS] <device> <mode> [param], where mode is one of following:");
    println!("       reset    -- send reset pulse to device");
    println!("       query    -- query device for the sampling rate");
    println!("       set      -- set the device sampling rate given in <param> (0-99 s)");
    println!("       download -- download all data points from the device, save to file <param>");
    println!("                   (GPX, or JSON when the file name ends in .json)");
    println!("       clear    -- clear all data points from the device");
    println!();
    println!("Options:");
    println!("  -v, -vv, ...      more protocol detail (repeatable)");
    println!("  -c, --config FILE session settings as JSON");
    println!("  --demo            use a simulated logger; <device> is omitted");
    println!("  -V, --version     print version");
    println!("  -h, --help        print this help");
}
