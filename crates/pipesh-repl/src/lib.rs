//! pipesh REPL: a line-oriented front end for the pipesh kernel.
//!
//! It handles:
//! - Meta-commands: `/help`, `/quit`, `/jobs`, `/builtins`
//! - Pipeline lines, parsed by [`parse::parse_line`]
//! - Background job announcements and completion notices
//! - Command history via rustyline

pub mod parse;

use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use tokio::runtime::Runtime;

use pipesh_kernel::{JobStatus, Kernel, PipelineMode, ShellConfig};

use crate::parse::{Line, parse_line};

/// What the caller should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep reading; carries the line's exit code.
    Continue(i32),
    Exit(i32),
}

/// REPL state: a kernel plus the runtime that drives it.
pub struct Repl {
    kernel: Kernel,
    runtime: Runtime,
    last_code: i32,
}

impl Repl {
    /// Create a REPL from the user's config file, interactive if stdin is
    /// a terminal.
    pub fn new() -> Result<Self> {
        use std::io::IsTerminal;

        let config = ShellConfig::load()?.with_interactive(std::io::stdin().is_terminal());
        Self::with_config(config)
    }

    pub fn with_config(config: ShellConfig) -> Result<Self> {
        let kernel = Kernel::new(config).context("Failed to create kernel")?;
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        Ok(Self {
            kernel,
            runtime,
            last_code: 0,
        })
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn last_code(&self) -> i32 {
        self.last_code
    }

    /// Process one input line.
    pub fn process_line(&mut self, line: &str) -> Result<Outcome> {
        let trimmed = line.trim();
        if let Some(meta) = trimmed.strip_prefix('/') {
            if !meta.is_empty() && !meta.contains('/') {
                return self.meta(meta);
            }
        }

        let pipeline = match parse_line(line) {
            Ok(Line::Empty) => return Ok(Outcome::Continue(self.last_code)),
            Ok(Line::Exit(code)) => return Ok(Outcome::Exit(code.unwrap_or(self.last_code))),
            Ok(Line::Run(pipeline)) => pipeline,
            Err(e) => {
                eprintln!("pipesh: {e}");
                self.last_code = 2;
                return Ok(Outcome::Continue(2));
            }
        };

        let background = pipeline.mode == PipelineMode::Background;
        let result = match self.runtime.block_on(self.kernel.run(pipeline)) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("pipesh: {e}");
                self.last_code = 2;
                return Ok(Outcome::Continue(2));
            }
        };

        if background {
            let pid = result.pids().last().copied().unwrap_or_default();
            eprintln!("[{}] {}", result.id(), pid);
            self.last_code = 0;
        } else {
            // A stopped foreground job has no code yet; 148 is what shells report.
            self.last_code = result.returncode().unwrap_or(148);
        }
        Ok(Outcome::Continue(self.last_code))
    }

    /// Report and forget background jobs that finished since the last call.
    pub fn notify_finished(&self) {
        let jobs = self.kernel.jobs();
        self.runtime.block_on(async {
            for info in jobs.list().await {
                let status = match (info.status, info.code) {
                    (JobStatus::Done, _) => "Done".to_string(),
                    (JobStatus::Failed, Some(code)) => format!("Exit {code}"),
                    _ => continue,
                };
                eprintln!("[{}]  {:<8} {}", info.id, status, info.command);
                jobs.remove(info.id).await;
            }
        });
    }

    fn meta(&mut self, cmd: &str) -> Result<Outcome> {
        let mut words = cmd.split_whitespace();
        match words.next().unwrap_or("") {
            "quit" | "q" | "exit" => Ok(Outcome::Exit(self.last_code)),
            "help" | "h" | "?" => {
                match words.next() {
                    None => println!("{HELP_TEXT}"),
                    Some(name) => match self.kernel.builtin_schema(name) {
                        Some(schema) => print!("{}", schema.help()),
                        None => eprintln!("No builtin named '{name}'. Type /builtins for the list."),
                    },
                }
                Ok(Outcome::Continue(self.last_code))
            }
            "jobs" => {
                let jobs = self.kernel.jobs();
                let list = self.runtime.block_on(jobs.list());
                if list.is_empty() {
                    println!("(no jobs)");
                }
                for info in list {
                    println!("[{}] {:?} pgid={:?} pids={:?} {}", info.id, info.status, info.pgid, info.pids, info.command);
                }
                Ok(Outcome::Continue(self.last_code))
            }
            "builtins" => {
                println!("{}", self.kernel.builtin_names().join(" "));
                Ok(Outcome::Continue(self.last_code))
            }
            other => {
                eprintln!("Unknown meta-command: /{other}. Type /help for help.");
                Ok(Outcome::Continue(self.last_code))
            }
        }
    }
}

const HELP_TEXT: &str = r#"pipesh meta-commands:
  /help       Show this help
  /help NAME  Show a builtin's parameters and examples
  /quit       Exit (also: exit [n], Ctrl-D)
  /jobs       Show the job table with process groups
  /builtins   List builtin commands

Lines are pipelines:
  ls -l | grep src | wc -l
  sleep 10 &                 # background; fg, bg, jobs, kill %1, wait
  sort < in.txt > out.txt
  make 2>&1 | tee build.log
  LANG=C sort names          # per-command environment"#;

/// Save REPL history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Option<PathBuf>) {
    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create history directory: {}", e);
            }
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
}

/// Run the interactive REPL. Returns the shell's exit code.
pub fn run() -> Result<i32> {
    println!("pipesh v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /help for commands, /quit to exit.");

    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;

    let history_path = directories::BaseDirs::new().map(|b| b.data_dir().join("pipesh").join("history.txt"));
    if let Some(ref path) = history_path {
        if let Err(e) = rl.load_history(path) {
            let is_not_found = matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
            if !is_not_found {
                tracing::warn!("Failed to load history: {}", e);
            }
        }
    }

    let mut repl = Repl::new()?;
    println!();

    let code = loop {
        repl.notify_finished();
        match rl.readline("pipesh> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = rl.add_history_entry(line.as_str()) {
                        tracing::warn!("Failed to add history entry: {}", e);
                    }
                }
                match repl.process_line(&line) {
                    Ok(Outcome::Continue(_)) => {}
                    Ok(Outcome::Exit(code)) => break code,
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break repl.last_code();
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break 1;
            }
        }
    };

    save_history(&mut rl, &history_path);
    Ok(code)
}

/// Run lines non-interactively, stopping at `exit`. Returns the last code.
pub fn run_lines<'a>(repl: &mut Repl, lines: impl IntoIterator<Item = &'a str>) -> Result<i32> {
    for line in lines {
        match repl.process_line(line)? {
            Outcome::Continue(_) => repl.notify_finished(),
            Outcome::Exit(code) => return Ok(code),
        }
    }
    Ok(repl.last_code())
}
