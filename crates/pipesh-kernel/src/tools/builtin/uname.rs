//! uname — Print system information.

use std::io::Write;

use async_trait::async_trait;
use pipesh_types::{ParamSchema, ToolSchema};

use super::write_failure_code;
use crate::tools::{Builtin, ExecContext, StageIo};

pub struct Uname;

/// Fields in the order `uname -a` prints them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct SystemInfo {
    sysname: String,
    nodename: String,
    release: String,
    version: String,
    machine: String,
}

impl SystemInfo {
    #[cfg(unix)]
    fn current() -> std::io::Result<Self> {
        let uts = nix::sys::utsname::uname()?;
        let text = |s: &std::ffi::OsStr| s.to_string_lossy().into_owned();
        Ok(Self {
            sysname: text(uts.sysname()),
            nodename: text(uts.nodename()),
            release: text(uts.release()),
            version: text(uts.version()),
            machine: text(uts.machine()),
        })
    }

    #[cfg(not(unix))]
    fn current() -> std::io::Result<Self> {
        Ok(Self {
            sysname: std::env::consts::OS.to_string(),
            machine: std::env::consts::ARCH.to_string(),
            ..Self::default()
        })
    }

    fn fields(&self) -> [&str; 5] {
        [&self.sysname, &self.nodename, &self.release, &self.version, &self.machine]
    }
}

/// Parse flags into a field mask. An unknown option comes back as the error.
fn selection(args: &[String]) -> Result<[bool; 5], String> {
    let mut mask = [false; 5];
    for arg in args {
        let letters = match arg.as_str() {
            "--all" => "a",
            "--kernel-name" => "s",
            "--nodename" => "n",
            "--kernel-release" => "r",
            "--kernel-version" => "v",
            "--machine" => "m",
            flag => flag
                .strip_prefix('-')
                .filter(|l| !l.is_empty() && !l.starts_with('-'))
                .ok_or_else(|| arg.clone())?,
        };
        for c in letters.chars() {
            match c {
                'a' => mask = [true; 5],
                's' => mask[0] = true,
                'n' => mask[1] = true,
                'r' => mask[2] = true,
                'v' => mask[3] = true,
                'm' => mask[4] = true,
                _ => return Err(arg.clone()),
            }
        }
    }
    if !mask.contains(&true) {
        mask[0] = true;
    }
    Ok(mask)
}

fn render(info: &SystemInfo, mask: [bool; 5]) -> String {
    info.fields()
        .iter()
        .zip(mask)
        .filter(|(field, on)| *on && !field.is_empty())
        .map(|(field, _)| *field)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Builtin for Uname {
    fn name(&self) -> &str {
        "uname"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("uname", "Print system information (kernel name by default)")
            .param(ParamSchema::optional("-a", "bool", "All fields"))
            .param(ParamSchema::optional("-s", "bool", "Kernel name"))
            .param(ParamSchema::optional("-n", "bool", "Network node name"))
            .param(ParamSchema::optional("-r", "bool", "Kernel release"))
            .param(ParamSchema::optional("-v", "bool", "Kernel version"))
            .param(ParamSchema::optional("-m", "bool", "Machine hardware name"))
            .example("Kernel name and release", "uname -sr")
    }

    async fn invoke(&self, args: &[String], io: &mut StageIo, _ctx: &mut ExecContext) -> i32 {
        let mask = match selection(args) {
            Ok(mask) => mask,
            Err(bad) => {
                io.diagnostic(format_args!("uname: invalid option '{bad}'"));
                return 2;
            }
        };
        let info = match SystemInfo::current() {
            Ok(info) => info,
            Err(e) => {
                io.diagnostic(format_args!("uname: {e}"));
                return 1;
            }
        };
        match writeln!(io.stdout, "{}", render(&info, mask)) {
            Ok(()) => 0,
            Err(e) => write_failure_code(&e),
        }
    }
}
