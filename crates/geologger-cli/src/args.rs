//! Command line parsing
//!
//! ```text
//! geologger [OPTIONS] <device> <mode> [param]
//! geologger [OPTIONS] --demo <mode> [param]
//! ```

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;

/// What the device should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Reset,
    Query,
    Set(u32),
    Download(PathBuf),
    Clear,
}

impl Mode {
    fn parse(name: &str, param: Option<&str>) -> Result<Self> {
        let mode = match name.to_ascii_lowercase().as_str() {
            "reset" => Mode::Reset,
            "query" => Mode::Query,
            "clear" => Mode::Clear,
            "set" => {
                let param = param.ok_or_else(|| anyhow!("set needs a sampling step"))?;
                let rate = param
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("invalid sampling step '{}'", param))?;
                return Ok(Mode::Set(rate));
            }
            "download" => {
                let param = param.ok_or_else(|| anyhow!("download needs an output file"))?;
                return Ok(Mode::Download(PathBuf::from(param)));
            }
            other => bail!("unknown mode '{}'", other),
        };
        if let Some(extra) = param {
            bail!("unexpected argument '{}'", extra);
        }
        Ok(mode)
    }
}

/// A fully parsed invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Serial device; `None` in demo mode
    pub device: Option<String>,
    pub mode: Mode,
    /// Number of `-v` flags
    pub verbose: u8,
    pub config: Option<PathBuf>,
    pub demo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Version,
    Run(Invocation),
}

/// Parse arguments (program name excluded)
pub fn parse(args: &[String]) -> Result<Command> {
    let mut positionals: Vec<&str> = Vec::new();
    let mut verbose = 0u8;
    let mut config = None;
    let mut demo = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--version" | "-V" => return Ok(Command::Version),
            "--demo" => demo = true,
            "--config" | "-c" => {
                i += 1;
                let path = args
                    .get(i)
                    .ok_or_else(|| anyhow!("--config needs a file"))?;
                config = Some(PathBuf::from(path));
            }
            flag if is_verbose_flag(flag) => {
                let count = u8::try_from(flag.len() - 1).unwrap_or(u8::MAX);
                verbose = verbose.saturating_add(count);
            }
            flag if flag.starts_with("--") => bail!("unknown option '{}'", flag),
            positional => positionals.push(positional),
        }
        i += 1;
    }

    let (device, rest) = if demo {
        (None, positionals.as_slice())
    } else {
        match positionals.split_first() {
            Some((device, rest)) => (Some(device.to_string()), rest),
            None => bail!("missing device"),
        }
    };

    let mode = match rest {
        [mode] => Mode::parse(mode, None)?,
        [mode, param] => Mode::parse(mode, Some(*param))?,
        [] => bail!("missing mode"),
        [_, _, extra, ..] => bail!("unexpected argument '{}'", extra),
    };

    Ok(Command::Run(Invocation {
        device,
        mode,
        verbose,
        config,
        demo,
    }))
}

/// `-v`, `-vv`, `-vvv`, ...
fn is_verbose_flag(arg: &str) -> bool {
    arg.len() > 1 && arg.starts_with('-') && arg[1..].chars().all(|c| c == 'v')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run(list: &[&str]) -> Invocation {
        match parse(&args(list)).unwrap() {
            Command::Run(invocation) => invocation,
            other => panic!("expected a run, got {:?}", other),
        }
    }

    #[test]
    fn test_modes() {
        assert_eq!(run(&["/dev/ttyUSB0", "reset"]).mode, Mode::Reset);
        assert_eq!(run(&["/dev/ttyUSB0", "QUERY"]).mode, Mode::Query);
        assert_eq!(run(&["/dev/ttyUSB0", "set", "7"]).mode, Mode::Set(7));
        assert_eq!(
            run(&["/dev/ttyUSB0", "Download", "out.gpx"]).mode,
            Mode::Download(PathBuf::from("out.gpx"))
        );
        assert_eq!(run(&["/dev/ttyUSB0", "clear"]).mode, Mode::Clear);
    }

    #[test]
    fn test_out_of_range_rate_parses() {
        // Range checking belongs to the session, before the port is opened
        assert_eq!(run(&["/dev/ttyUSB0", "set", "100"]).mode, Mode::Set(100));
    }

    #[test]
    fn test_malformed_arguments() {
        assert!(parse(&args(&[])).is_err());
        assert!(parse(&args(&["/dev/ttyUSB0"])).is_err());
        assert!(parse(&args(&["/dev/ttyUSB0", "erase"])).is_err());
        assert!(parse(&args(&["/dev/ttyUSB0", "set"])).is_err());
        assert!(parse(&args(&["/dev/ttyUSB0", "set", "fast"])).is_err());
        assert!(parse(&args(&["/dev/ttyUSB0", "set", "-1"])).is_err());
        assert!(parse(&args(&["/dev/ttyUSB0", "download"])).is_err());
        assert!(parse(&args(&["/dev/ttyUSB0", "query", "extra"])).is_err());
        assert!(parse(&args(&["/dev/ttyUSB0", "--bogus", "query"])).is_err());
    }

    #[test]
    fn test_options() {
        let invocation = run(&["-vv", "--config", "geo.json", "-v", "/dev/ttyS1", "query"]);
        assert_eq!(invocation.verbose, 3);
        assert_eq!(invocation.config, Some(PathBuf::from("geo.json")));
        assert_eq!(invocation.device.as_deref(), Some("/dev/ttyS1"));
        assert!(!invocation.demo);
    }

    #[test]
    fn test_verbose_count_saturates() {
        let many = format!("-{}", "v".repeat(300));
        let invocation = run(&[many.as_str(), "/dev/ttyS1", "query"]);
        assert_eq!(invocation.verbose, u8::MAX);

        let invocation = run(&["-vvv", many.as_str(), "/dev/ttyS1", "query"]);
        assert_eq!(invocation.verbose, u8::MAX);
    }

    #[test]
    fn test_demo_needs_no_device() {
        let invocation = run(&["--demo", "download", "track.json"]);
        assert!(invocation.demo);
        assert_eq!(invocation.device, None);
        assert_eq!(invocation.mode, Mode::Download(PathBuf::from("track.json")));
    }

    #[test]
    fn test_short_circuit_flags() {
        assert_eq!(parse(&args(&["--help"])).unwrap(), Command::Help);
        assert_eq!(parse(&args(&["/dev/x", "--version"])).unwrap(), Command::Version);
        assert_eq!(parse(&args(&["-h", "/dev/x", "query"])).unwrap(), Command::Help);
    }
}
