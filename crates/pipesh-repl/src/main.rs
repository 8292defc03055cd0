//! pipesh CLI entry point.
//!
//! Usage:
//!   pipesh                 # Interactive REPL
//!   pipesh -c <command>    # Run one line and exit
//!   pipesh script.sh       # Run each line of a file

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pipesh_kernel::ShellConfig;
use pipesh_repl::{Repl, run_lines};

fn main() -> ExitCode {
    // Respects RUST_LOG; logs go to stderr so they never mix with pipeline output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            let code = pipesh_repl::run()?;
            Ok(exit_code(code))
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("pipesh {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let cmd = args.get(2).context("-c requires a command argument")?;
            let mut repl = Repl::with_config(ShellConfig::load()?.with_interactive(false))?;
            let code = run_lines(&mut repl, cmd.lines())?;
            Ok(exit_code(code))
        }

        Some(path) if !path.starts_with('-') => run_script(path),

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'pipesh --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"pipesh v{}

Usage:
  pipesh                  Interactive REPL
  pipesh -c <command>     Run a command line and exit
  pipesh <script>         Run a file, one pipeline per line

Options:
  -c <command>            Execute command string and exit
  -h, --help              Show this help
  -V, --version           Show version

Configuration is read from the platform config directory
(pipesh/config.toml). Set RUST_LOG=debug for tracing output."#,
        env!("CARGO_PKG_VERSION")
    );
}

fn run_script(path: &str) -> Result<ExitCode> {
    let source = std::fs::read_to_string(path).with_context(|| format!("Failed to read script: {path}"))?;
    let mut repl = Repl::with_config(ShellConfig::load()?.with_interactive(false))?;
    let lines = source.lines().skip_while(|l| l.starts_with("#!"));
    let code = run_lines(&mut repl, lines)?;
    Ok(exit_code(code))
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from((code & 0xff) as u8)
}
