pub mod codec;
pub mod config;
pub mod errors;
pub mod inspect;
pub mod log_retention;
pub mod logging;
pub mod proxy;
pub mod replay;
pub mod runtime;
pub mod signature;
pub mod types;

use clap::{error::ErrorKind, Parser, Subcommand, ValueEnum};
use codec::JsonCodec;
use config::{load_config, CliOverrides};
use errors::BimockError;
use inspect::summarize;
use replay::recording::decode_log;
use runtime::ProductionRuntime;
use std::path::{Path, PathBuf};
use types::Mode;

pub use proxy::{Bimock, Interceptor, Proxy};

#[derive(Debug, Clone, Parser)]
#[command(name = "bimock")]
#[command(about = "Inspect and verify bimock invocation logs")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub resource_dir: Option<PathBuf>,
    #[arg(long, global = true, value_enum)]
    pub mode: Option<CliMode>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print per-signature call counts for an invocation log.
    Inspect { log: PathBuf },
    /// Parse an entire invocation log and report the record count.
    Verify { log: PathBuf },
    /// Pretty-print every record of an invocation log.
    Show { log: PathBuf },
    /// Print the mode and log path a named resource resolves to.
    Path { name: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliMode {
    Record,
    Replay,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Record => Mode::Record,
            CliMode::Replay => Mode::Replay,
        }
    }
}

pub fn run() -> Result<i32, BimockError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| BimockError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, BimockError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(BimockError::Cli(error.to_string())),
        },
    };

    let fs = runtime.file_system.as_ref();
    let terminal = runtime.terminal.as_ref();

    match &cli.command {
        Command::Inspect { log } => {
            let raw = fs.read_to_string(&resolve(cwd, log))?;
            for line in summarize(&raw)?.render_lines() {
                terminal.write_line(&line)?;
            }
        }
        Command::Verify { log } => {
            let raw = fs.read_to_string(&resolve(cwd, log))?;
            let records = decode_log(&raw)?;
            terminal.write_line(&format!("ok: {} records", records.len()))?;
        }
        Command::Show { log } => {
            let raw = fs.read_to_string(&resolve(cwd, log))?;
            for record in decode_log(&raw)? {
                for line in JsonCodec.to_json_pretty(&record)?.lines() {
                    terminal.write_line(line)?;
                }
            }
        }
        Command::Path { name } => {
            let overrides = CliOverrides {
                config_path: cli.config.as_ref().map(|p| resolve(cwd, p)),
                resource_dir: cli.resource_dir.clone(),
                mode: cli.mode.map(Into::into),
            };
            let cfg = load_config(&overrides, cwd, fs)?;
            terminal.write_line(&format!(
                "mode={} path={}",
                cfg.mode.default.as_str(),
                cfg.resource_path(name).display()
            ))?;
        }
    }

    Ok(0)
}

fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::payload::Payload;
    use crate::replay::recording::InvocationRecord;
    use crate::runtime::{FakeFileSystem, FakeTerminal, FileSystem};
    use crate::signature::MethodSignature;
    use std::ffi::OsString;
    use std::sync::Arc;

    fn runtime_with(fs: FakeFileSystem, terminal: FakeTerminal) -> ProductionRuntime {
        ProductionRuntime {
            file_system: Arc::new(fs),
            terminal: Arc::new(terminal),
        }
    }

    fn args(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[test]
    fn verify_reports_record_count() {
        let line = InvocationRecord::success(
            1,
            MethodSignature::new("Calculator", "add", &["i32", "i32"]),
            Payload::Int { value: 5 },
        )
        .encode_line()
        .expect("encode");
        let fs = FakeFileSystem::with_file("/work/calc.jsonl", format!("{line}\n{line}\n"));
        let terminal = FakeTerminal::default();
        let runtime = runtime_with(fs, terminal.clone());

        let code = run_with_runtime(
            &args(&["bimock", "verify", "calc.jsonl"]),
            Path::new("/work"),
            &runtime,
        )
        .expect("verify");
        assert_eq!(code, 0);
        assert_eq!(terminal.written_lines(), vec!["ok: 2 records".to_string()]);
    }

    #[test]
    fn show_pretty_prints_each_record() {
        let line = InvocationRecord::success(
            1,
            MethodSignature::new("Clock", "now", &[]),
            Payload::Float { value: f64::INFINITY },
        )
        .encode_line()
        .expect("encode");
        let fs = FakeFileSystem::with_file("/work/clock.jsonl", format!("{line}\n"));
        let terminal = FakeTerminal::default();
        let runtime = runtime_with(fs, terminal.clone());

        run_with_runtime(
            &args(&["bimock", "show", "clock.jsonl"]),
            Path::new("/work"),
            &runtime,
        )
        .expect("show");
        let lines = terminal.written_lines();
        assert_eq!(lines.first().map(String::as_str), Some("{"));
        assert!(lines.contains(&"  \"seq\": 1,".to_string()), "{lines:?}");
        assert!(lines.contains(&"      \"value\": \"inf\"".to_string()), "{lines:?}");
        assert_eq!(lines.last().map(String::as_str), Some("}"));
    }

    #[test]
    fn verify_fails_on_malformed_log() {
        let fs = FakeFileSystem::with_file("/calc.jsonl", "{\"method\":{}}\n");
        let runtime = runtime_with(fs, FakeTerminal::default());
        let err = run_with_runtime(&args(&["bimock", "verify", "/calc.jsonl"]), Path::new("/"), &runtime)
            .expect_err("malformed");
        assert!(matches!(err, BimockError::Codec(_)));
    }

    #[test]
    fn path_applies_overrides() {
        let fs = FakeFileSystem::default();
        fs.write_string(Path::new("/work/bimock.toml"), "[storage]\nextension = \"log\"\n")
            .expect("seed config");
        let terminal = FakeTerminal::default();
        let runtime = runtime_with(fs, terminal.clone());

        run_with_runtime(
            &args(&[
                "bimock",
                "path",
                "calculator",
                "--config",
                "bimock.toml",
                "--resource-dir",
                "fixtures",
                "--mode",
                "record",
            ]),
            Path::new("/work"),
            &runtime,
        )
        .expect("path");
        assert_eq!(
            terminal.written_lines(),
            vec!["mode=record path=/work/fixtures/calculator.log".to_string()]
        );
    }

    #[test]
    fn unknown_subcommand_is_a_cli_error() {
        let runtime = runtime_with(FakeFileSystem::default(), FakeTerminal::default());
        let err = run_with_runtime(&args(&["bimock", "explode"]), Path::new("/"), &runtime)
            .expect_err("unknown subcommand");
        assert!(matches!(err, BimockError::Cli(_)));
    }
}
