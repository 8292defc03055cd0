//! Command resolution and stage launch.
//!
//! Resolution walks three tables in order: aliases, builtins, then the
//! search path. The first layer that knows a name wins. Launching turns a
//! resolved stage plus its descriptor ends into a running OS process, a
//! builtin on a worker thread, or an immediate exit code when the stage
//! cannot start.

use std::collections::HashSet;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, RwLock};

use pipesh_types::{ExecutableKind, StageState, ToolSchema};

use crate::job_control::{JobControl, Member};
use crate::scheduler::{OutputEnd, StageEnds, StageEvent, StageSender, StdStream};
use crate::session::Session;
use crate::spec::CommandSpec;
use crate::tools::{Alias, AliasTable, Builtin, BuiltinRegistry, ExecContext, StageIo};

/// Exit code for a command that does not exist.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code for a command that exists but cannot be executed.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// What a command name resolved to.
#[derive(Clone)]
pub enum Resolution {
    Builtin(Arc<dyn Builtin>),
    External(PathBuf),
    NotExecutable(PathBuf),
    NotFound,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Builtin(b) => f.debug_tuple("Builtin").field(&b.name()).finish(),
            Resolution::External(p) => f.debug_tuple("External").field(p).finish(),
            Resolution::NotExecutable(p) => f.debug_tuple("NotExecutable").field(p).finish(),
            Resolution::NotFound => f.write_str("NotFound"),
        }
    }
}

/// A stage after alias expansion and lookup.
#[derive(Debug, Clone)]
pub struct ResolvedStage {
    /// Full argv after alias expansion; `argv[0]` is the command name.
    pub argv: Vec<String>,
    pub resolution: Resolution,
}

impl ResolvedStage {
    pub fn kind(&self) -> Option<ExecutableKind> {
        match self.resolution {
            Resolution::Builtin(_) => Some(ExecutableKind::Builtin),
            Resolution::External(_) => Some(ExecutableKind::External),
            Resolution::NotExecutable(_) | Resolution::NotFound => None,
        }
    }

    pub fn mutates_session(&self) -> bool {
        matches!(&self.resolution, Resolution::Builtin(b) if b.mutates_session())
    }

    pub fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

/// How a launch went.
#[derive(Debug)]
pub(crate) enum Launched {
    /// An OS process; the caller starts reaping it.
    Process(Member),
    /// A builtin on a worker thread; it reports its own exit.
    Task,
    /// The stage is already over (inline builtin, or could not start).
    Finished(i32),
}

/// Everything needed to start one stage.
pub(crate) struct LaunchRequest<'a> {
    pub index: usize,
    pub spec: &'a CommandSpec,
    pub stage: ResolvedStage,
    pub ends: StageEnds,
    /// Process group to join, `None` to lead a new one.
    pub leader: Option<u32>,
    /// Run a builtin on the calling task instead of a worker thread.
    pub inline: bool,
    /// The stage belongs to a foreground pipeline.
    pub foreground: bool,
}

/// Resolves command names and starts stages.
pub struct Launcher {
    builtins: RwLock<BuiltinRegistry>,
    aliases: RwLock<AliasTable>,
    search_path: Option<String>,
}

impl Launcher {
    pub fn new(builtins: BuiltinRegistry, search_path: Option<String>) -> Self {
        Self {
            builtins: RwLock::new(builtins),
            aliases: RwLock::new(AliasTable::new()),
            search_path,
        }
    }

    pub fn register_builtin(&self, name: impl Into<String>, builtin: Arc<dyn Builtin>) {
        self.builtins
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, builtin);
    }

    pub fn register_alias(&self, name: impl Into<String>, alias: Alias) {
        self.aliases
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, alias);
    }

    pub fn remove_alias(&self, name: &str) -> Option<Alias> {
        self.aliases.write().unwrap_or_else(|e| e.into_inner()).remove(name)
    }

    pub fn builtin_schema(&self, name: &str) -> Option<ToolSchema> {
        let builtins = self.builtins.read().unwrap_or_else(|e| e.into_inner());
        builtins.get(name).map(|b| b.schema())
    }

    pub fn builtin_names(&self) -> Vec<String> {
        let builtins = self.builtins.read().unwrap_or_else(|e| e.into_inner());
        builtins.names().into_iter().map(String::from).collect()
    }

    /// Resolve a stage. A pinned `kind` restricts lookup to that layer;
    /// names produced by alias expansion go through the full chain.
    pub fn resolve(&self, spec: &CommandSpec, session: &Session) -> ResolvedStage {
        if let Some(callable) = &spec.callable {
            let mut argv = Vec::with_capacity(spec.argv.len() + 1);
            argv.push(callable.name().to_string());
            argv.extend(spec.argv.iter().cloned());
            return ResolvedStage {
                argv,
                resolution: Resolution::Builtin(Arc::clone(callable)),
            };
        }

        let pinned = spec.kind;
        let mut argv = spec.argv.clone();
        let mut expanded = false;

        if matches!(pinned, None | Some(ExecutableKind::Alias)) {
            let aliases = self.aliases.read().unwrap_or_else(|e| e.into_inner());
            let mut seen = HashSet::new();
            while let Some(name) = argv.first().cloned() {
                // An alias never expands itself twice.
                if !seen.insert(name.clone()) {
                    break;
                }
                match aliases.get(&name) {
                    Some(Alias::Callable(callable)) => {
                        tracing::debug!(%name, "resolved to callable alias");
                        return ResolvedStage {
                            argv,
                            resolution: Resolution::Builtin(Arc::clone(callable)),
                        };
                    }
                    Some(Alias::Expansion(words)) if !words.is_empty() => {
                        tracing::debug!(%name, ?words, "alias expansion");
                        argv = words.iter().cloned().chain(argv.into_iter().skip(1)).collect();
                        expanded = true;
                    }
                    _ => break,
                }
            }
            if pinned == Some(ExecutableKind::Alias) && !expanded {
                return ResolvedStage {
                    argv,
                    resolution: Resolution::NotFound,
                };
            }
        }

        let allowed = |layer: ExecutableKind| expanded || pinned.is_none() || pinned == Some(layer);
        let name = argv.first().cloned().unwrap_or_default();

        if allowed(ExecutableKind::Builtin) {
            let builtin = self.builtins.read().unwrap_or_else(|e| e.into_inner()).get(&name);
            if let Some(builtin) = builtin {
                return ResolvedStage {
                    argv,
                    resolution: Resolution::Builtin(builtin),
                };
            }
        }

        let resolution = if allowed(ExecutableKind::External) {
            self.find_external(&name, session)
        } else {
            Resolution::NotFound
        };
        ResolvedStage { argv, resolution }
    }

    fn find_external(&self, name: &str, session: &Session) -> Resolution {
        let cwd = session.cwd();

        // Names with a separator are run as given.
        if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
            let path = cwd.join(name);
            return match std::fs::metadata(&path) {
                Err(_) => Resolution::NotFound,
                Ok(meta) if meta.is_dir() || !is_executable(&meta) => Resolution::NotExecutable(path),
                Ok(_) => Resolution::External(path),
            };
        }

        let search = self.search_path.clone().or_else(|| session.var("PATH"));
        let Some(search) = search else {
            return Resolution::NotFound;
        };
        match which::which_in(name, Some(&search), &cwd) {
            Ok(path) => Resolution::External(path),
            Err(_) => {
                // Present but not runnable is a different failure.
                for dir in std::env::split_paths(&search) {
                    let candidate = cwd.join(dir).join(name);
                    if candidate.is_file() {
                        return Resolution::NotExecutable(candidate);
                    }
                }
                Resolution::NotFound
            }
        }
    }

    /// Start one stage. Never fails: problems become exit codes, with a
    /// diagnostic on the stage's stderr.
    #[tracing::instrument(level = "debug", skip_all, fields(index = req.index, name = req.stage.name()))]
    pub(crate) async fn launch(
        &self,
        req: LaunchRequest<'_>,
        ctx: ExecContext,
        control: &dyn JobControl,
        events: &StageSender,
    ) -> Launched {
        let LaunchRequest {
            index,
            spec,
            stage,
            ends,
            leader,
            inline,
            foreground,
        } = req;

        let cwd = ctx.cwd();
        let ends = match ends.redirect(spec, &cwd) {
            Ok(ends) => ends,
            Err(err) => {
                diagnose(err.stderr, format_args!("pipesh: {}", err.message));
                return Launched::Finished(1);
            }
        };

        let ResolvedStage { argv, resolution } = stage;
        let name = argv.first().map(String::as_str).unwrap_or("");
        match resolution {
            Resolution::NotFound => {
                diagnose(ends.stderr, format_args!("pipesh: command not found: {name}"));
                Launched::Finished(EXIT_NOT_FOUND)
            }
            Resolution::NotExecutable(path) => {
                diagnose(ends.stderr, format_args!("pipesh: permission denied: {}", path.display()));
                Launched::Finished(EXIT_NOT_EXECUTABLE)
            }
            Resolution::External(path) => spawn_external(&path, &argv, ends, &ctx, &cwd, (leader, foreground), control),
            Resolution::Builtin(builtin) => {
                let args = argv.get(1..).unwrap_or_default().to_vec();
                run_builtin(builtin, args, index, ends, ctx, inline, events).await
            }
        }
    }
}

fn diagnose(stderr: OutputEnd, message: std::fmt::Arguments<'_>) {
    let mut writer = stderr.into_writer();
    let _ = writeln!(writer, "{message}");
    let _ = writer.flush();
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

fn spawn_external(
    path: &Path,
    argv: &[String],
    ends: StageEnds,
    ctx: &ExecContext,
    cwd: &Path,
    (leader, foreground): (Option<u32>, bool),
    control: &dyn JobControl,
) -> Launched {
    let mut cmd = Command::new(path);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        if let Some(name) = argv.first() {
            cmd.arg0(name);
        }
    }
    cmd.args(argv.iter().skip(1))
        .env_clear()
        .envs(&ctx.env)
        .current_dir(cwd);

    // Kept only to report a failed spawn; dropped right after.
    let diag = ends.stderr.try_clone().ok();
    cmd.stdin(ends.stdin.into_stdio());
    cmd.stdout(ends.stdout.into_stdio(StdStream::Stdout));
    cmd.stderr(ends.stderr.into_stdio(StdStream::Stderr));
    control.configure(&mut cmd, leader, foreground);

    let spawned = cmd.spawn();
    // Drop the Command so the parent holds no copies of the child's pipe ends.
    drop(cmd);

    match spawned {
        Ok(child) => {
            tracing::debug!(pid = child.id(), path = %path.display(), "spawned");
            Launched::Process(Member::new(child))
        }
        Err(e) => {
            let code = match e.kind() {
                std::io::ErrorKind::NotFound => EXIT_NOT_FOUND,
                _ => EXIT_NOT_EXECUTABLE,
            };
            tracing::debug!(path = %path.display(), code, "spawn failed: {}", e);
            if let Some(stderr) = diag {
                let name = argv.first().map(String::as_str).unwrap_or("");
                diagnose(stderr, format_args!("pipesh: {name}: {e}"));
            }
            Launched::Finished(code)
        }
    }
}

async fn run_builtin(
    builtin: Arc<dyn Builtin>,
    args: Vec<String>,
    index: usize,
    ends: StageEnds,
    mut ctx: ExecContext,
    inline: bool,
    events: &StageSender,
) -> Launched {
    ctx.stage = index;
    let mut io = StageIo {
        stdin_tty: ends.stdin.terminal_name(),
        stdin: ends.stdin.into_reader(),
        stdout: ends.stdout.into_writer(),
        stderr: ends.stderr.into_writer(),
    };

    if inline {
        let code = builtin.invoke(&args, &mut io, &mut ctx).await;
        let _ = io.stdout.flush();
        return Launched::Finished(code);
    }

    let handle = tokio::runtime::Handle::current();
    let events = events.clone();
    let name = builtin.name().to_string();
    let spawned = std::thread::Builder::new()
        .name(format!("pipesh-builtin-{name}"))
        .spawn(move || {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                handle.block_on(builtin.invoke(&args, &mut io, &mut ctx))
            }));
            let code = outcome.unwrap_or_else(|_| {
                tracing::error!(builtin = %name, "builtin panicked");
                1
            });
            let _ = io.stdout.flush();
            // Close our ends before reporting so downstream sees EOF first.
            drop(io);
            let _ = events.send(StageEvent {
                index,
                state: StageState::Exited(code),
            });
        });

    match spawned {
        Ok(_) => Launched::Task,
        Err(e) => {
            tracing::error!("cannot start builtin worker: {}", e);
            Launched::Finished(EXIT_NOT_EXECUTABLE)
        }
    }
}
