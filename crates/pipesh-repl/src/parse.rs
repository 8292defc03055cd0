//! Line parsing for the REPL.
//!
//! This is deliberately small: words are split with POSIX quoting rules,
//! then scanned for `|`, a trailing `&`, and the redirect forms `<`, `>`,
//! `>>`, `2>`, `2>>`, `2>&1` and `>&2`. Operators are recognised only as
//! whole words or word prefixes, so a quoted `">"` is still an operator.
//! Leading `NAME=value` words set the stage's environment.

use pipesh_kernel::{CommandSpec, FdSource, Pipeline};
use thiserror::Error;

/// A parsed input line.
#[derive(Debug)]
pub enum Line {
    Empty,
    Exit(Option<i32>),
    Run(Pipeline),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unbalanced quotes")]
    Unbalanced,
    #[error("missing target after `{0}`")]
    MissingTarget(String),
    #[error("empty command in pipeline")]
    EmptyStage,
    #[error("`&` is only allowed at the end of a line")]
    MisplacedBackground,
    #[error("exit: numeric argument required: {0}")]
    BadExitCode(String),
}

#[derive(Debug, Clone, Copy)]
enum Redirect {
    In,
    Out,
    Append,
    ErrOut,
    ErrAppend,
}

impl Redirect {
    /// Split an operator off the front of a word.
    fn split(word: &str) -> Option<(Redirect, &str)> {
        const OPS: [(&str, Redirect); 7] = [
            ("2>>", Redirect::ErrAppend),
            ("2>", Redirect::ErrOut),
            ("1>>", Redirect::Append),
            (">>", Redirect::Append),
            ("1>", Redirect::Out),
            (">", Redirect::Out),
            ("<", Redirect::In),
        ];
        OPS.iter()
            .find_map(|(op, kind)| word.strip_prefix(*op).map(|rest| (*kind, rest)))
    }

    fn apply(self, spec: CommandSpec, target: &str) -> CommandSpec {
        match self {
            Redirect::In => spec.stdin_from(FdSource::read(target)),
            Redirect::Out => spec.stdout_to(FdSource::write(target)),
            Redirect::Append => spec.stdout_to(FdSource::append(target)),
            Redirect::ErrOut => spec.stderr_to(FdSource::write(target)),
            Redirect::ErrAppend => spec.stderr_to(FdSource::append(target)),
        }
    }
}

pub fn parse_line(input: &str) -> Result<Line, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(Line::Empty);
    }
    let words = shlex::split(trimmed).ok_or(ParseError::Unbalanced)?;

    if words.first().map(String::as_str) == Some("exit") {
        return match words.get(1) {
            None => Ok(Line::Exit(None)),
            Some(code) => code
                .parse()
                .map(|c| Line::Exit(Some(c)))
                .map_err(|_| ParseError::BadExitCode(code.clone())),
        };
    }

    let mut background = false;
    let mut stages = Vec::new();
    let mut current = StageBuilder::default();
    let mut words = words.into_iter();

    while let Some(word) = words.next() {
        if background {
            return Err(ParseError::MisplacedBackground);
        }
        match word.as_str() {
            "|" => stages.push(std::mem::take(&mut current).finish()?),
            "&" => background = true,
            "2>&1" => current.redirects.push(Pending::ErrToOut),
            ">&2" | "1>&2" => current.redirects.push(Pending::OutToErr),
            _ => match Redirect::split(&word) {
                Some((kind, "")) => {
                    let target = words.next().ok_or_else(|| ParseError::MissingTarget(word.clone()))?;
                    current.redirects.push(Pending::File(kind, target));
                }
                Some((kind, target)) => current.redirects.push(Pending::File(kind, target.to_string())),
                None => current.push_word(word),
            },
        }
    }
    stages.push(current.finish()?);

    let mut pipeline = Pipeline::new(stages);
    if background {
        pipeline = pipeline.background();
    }
    Ok(Line::Run(pipeline))
}

#[derive(Debug)]
enum Pending {
    File(Redirect, String),
    ErrToOut,
    OutToErr,
}

#[derive(Debug, Default)]
struct StageBuilder {
    env: Vec<(String, String)>,
    argv: Vec<String>,
    redirects: Vec<Pending>,
}

impl StageBuilder {
    fn push_word(&mut self, word: String) {
        if self.argv.is_empty() {
            if let Some((name, value)) = assignment(&word) {
                self.env.push((name.to_string(), value.to_string()));
                return;
            }
        }
        self.argv.push(word);
    }

    fn finish(self) -> Result<CommandSpec, ParseError> {
        if self.argv.is_empty() {
            return Err(ParseError::EmptyStage);
        }
        let mut spec = CommandSpec::new(self.argv);
        for (name, value) in self.env {
            spec = spec.env(name, value);
        }
        for redirect in self.redirects {
            spec = match redirect {
                Pending::File(kind, target) => kind.apply(spec, &target),
                Pending::ErrToOut => spec.stderr_to(FdSource::Descriptor(1)),
                Pending::OutToErr => spec.stdout_to(FdSource::Descriptor(2)),
            };
        }
        Ok(spec)
    }
}

fn assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesh_kernel::{FileMode, PipelineMode};
    use rstest::rstest;

    fn run(input: &str) -> Pipeline {
        match parse_line(input).unwrap() {
            Line::Run(p) => p,
            other => panic!("expected a pipeline, got {other:?}"),
        }
    }

    #[test]
    fn splits_stages_on_pipe() {
        let p = run("echo 'a b' | grep a");
        assert_eq!(p.stages.len(), 2);
        assert_eq!(p.stages[0].argv, vec!["echo", "a b"]);
        assert_eq!(p.stages[1].argv, vec!["grep", "a"]);
        assert_eq!(p.mode, PipelineMode::Foreground);
    }

    #[test]
    fn trailing_ampersand_backgrounds() {
        let p = run("sleep 5 &");
        assert_eq!(p.mode, PipelineMode::Background);
        assert_eq!(p.stages[0].argv, vec!["sleep", "5"]);
    }

    #[test]
    fn ampersand_mid_line_is_rejected() {
        assert_eq!(parse_line("sleep 1 & echo").unwrap_err(), ParseError::MisplacedBackground);
    }

    #[rstest]
    #[case("cat < in.txt", "in.txt")]
    #[case("cat <in.txt", "in.txt")]
    fn input_redirects(#[case] line: &str, #[case] path: &str) {
        let p = run(line);
        match &p.stages[0].stdin {
            Some(FdSource::File { path: got, mode }) => {
                assert_eq!(got.to_str(), Some(path));
                assert_eq!(*mode, FileMode::Read);
            }
            other => panic!("unexpected stdin {other:?}"),
        }
    }

    #[rstest]
    #[case("echo hi > out", FileMode::Write)]
    #[case("echo hi >out", FileMode::Write)]
    #[case("echo hi >> out", FileMode::Append)]
    #[case("echo hi 1>>out", FileMode::Append)]
    fn output_redirects(#[case] line: &str, #[case] expected: FileMode) {
        let p = run(line);
        assert_eq!(p.stages[0].argv, vec!["echo", "hi"]);
        match &p.stages[0].stdout {
            Some(FdSource::File { mode, .. }) => assert_eq!(*mode, expected),
            other => panic!("unexpected stdout {other:?}"),
        }
    }

    #[test]
    fn stderr_forms() {
        let p = run("make 2>&1 | tee log");
        assert_eq!(p.stages[0].stderr, Some(FdSource::Descriptor(1)));
        let p = run("echo oops >&2");
        assert_eq!(p.stages[0].stdout, Some(FdSource::Descriptor(2)));
        let p = run("cmd 2> err.log");
        assert!(matches!(p.stages[0].stderr, Some(FdSource::File { .. })));
    }

    #[test]
    fn missing_redirect_target() {
        assert_eq!(
            parse_line("echo hi >").unwrap_err(),
            ParseError::MissingTarget(">".to_string())
        );
    }

    #[test]
    fn empty_stage_is_rejected() {
        assert_eq!(parse_line("echo | | cat").unwrap_err(), ParseError::EmptyStage);
        assert_eq!(parse_line("| cat").unwrap_err(), ParseError::EmptyStage);
    }

    #[test]
    fn leading_assignments_become_env() {
        let p = run("LANG=C FOO=bar sort -u");
        assert_eq!(p.stages[0].argv, vec!["sort", "-u"]);
        assert_eq!(p.stages[0].env.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(p.stages[0].env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn assignment_after_command_is_an_argument() {
        let p = run("env X=1");
        assert_eq!(p.stages[0].argv, vec!["env", "X=1"]);
        assert!(p.stages[0].env.is_empty());
    }

    #[test]
    fn exit_and_blank_lines() {
        assert!(matches!(parse_line("   ").unwrap(), Line::Empty));
        assert!(matches!(parse_line("# note").unwrap(), Line::Empty));
        assert!(matches!(parse_line("exit").unwrap(), Line::Exit(None)));
        assert!(matches!(parse_line("exit 3").unwrap(), Line::Exit(Some(3))));
        assert!(parse_line("exit x").is_err());
    }

    #[test]
    fn unbalanced_quotes() {
        assert_eq!(parse_line("echo 'oops").unwrap_err(), ParseError::Unbalanced);
    }
}
