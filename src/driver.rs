//! Top-level driver: command-line argument parsing and the read-eval loop.
//!
//! Mirrors the original's `main()`: decide where input comes from (a `-c`
//! string, a script file argument, or stdin), set the option letters from
//! `argv`, source the profile files for a login shell, then loop over
//! [`Parser::next_command`]/[`exec::execute`] until input is exhausted or
//! an `exit` unwinds all the way out.

use std::os::fd::RawFd;

use crate::exec;
use crate::input::{Generator, InputStack, Task};
use crate::parser::Parser;
use crate::shell::{Escape, Shell};

/// Parsed command-line invocation, independent of how the arguments were
/// sourced (`env::args()` in `main.rs`, or a fixed list in tests).
pub struct Invocation {
    /// `-c STRING`: run `STRING` instead of reading a script/stdin.
    pub command_string: Option<String>,
    /// Positional script path, when neither `-c` nor `-s` was given.
    pub script_path: Option<String>,
    /// `$0` and `$1..` for the running shell.
    pub positional: Vec<String>,
    /// `true` if `argv[0]` began with `-` (login shell).
    pub login: bool,
}

/// Parse `argv` (excluding `argv[0]`, which the caller passes separately as
/// `arg0`) the way the original's option loop does: a leading run of
/// `-`/`+` option-letter clusters, an optional `-c command` pair, then
/// either a script path or positional parameters.
#[must_use]
pub fn parse_args(arg0: &str, args: &[String], opts: &mut crate::shell::Options) -> Invocation {
    let login = arg0.starts_with('-');
    let mut i = 0;
    let mut command_string = None;

    while i < args.len() {
        let arg = &args[i];
        let mut chars = arg.chars();
        match chars.next() {
            Some('-') | Some('+') if arg.len() > 1 => {
                let value = arg.starts_with('-');
                let letters = &arg[1..];
                if letters == "-" {
                    i += 1;
                    break;
                }
                if letters == "c" {
                    i += 1;
                    command_string = args.get(i).cloned();
                    i += 1;
                    break;
                }
                for letter in letters.chars() {
                    opts.apply(letter, value);
                }
                i += 1;
            }
            _ => break,
        }
    }

    let mut script_path = None;
    if command_string.is_none() && !opts.stdin_script {
        if let Some(path) = args.get(i) {
            script_path = Some(path.clone());
            i += 1;
        }
    }

    let mut positional = vec![arg0.trim_start_matches('-').to_string()];
    positional.extend(args[i..].iter().cloned());

    Invocation {
        command_string,
        script_path,
        positional,
        login,
    }
}

/// Source a file via `.` semantics if it exists, silently doing nothing if
/// it doesn't — the behavior `/etc/profile` and `~/.profile` need at
/// login-shell startup.
fn source_if_present(shell: &mut Shell, path: &str) {
    if let Ok(contents) = std::fs::read_to_string(path) {
        exec::run_string(shell, &contents);
    }
}

/// Run a login shell's profile files (`/etc/profile`, then `$HOME/.profile`)
/// before the main loop starts.
pub fn source_login_profiles(shell: &mut Shell) {
    source_if_present(shell, "/etc/profile");
    if let Some(home) = shell.vars.get("HOME") {
        source_if_present(shell, &format!("{home}/.profile"));
    }
}

/// Run the parsed invocation to completion, returning the process exit
/// status. Handles all three input sources (`-c` string, script file,
/// interactive/non-interactive stdin) through the same command loop.
pub fn run(shell: &mut Shell, invocation: &Invocation) -> i32 {
    shell.vars.set_positional(invocation.positional[1..].to_vec());
    shell.vars.set_arg0(invocation.positional[0].clone());

    if invocation.login {
        source_login_profiles(shell);
    }

    if let Some(src) = &invocation.command_string {
        return run_source(shell, Generator::from_str(src.clone()), Task::Other);
    }

    if let Some(path) = &invocation.script_path {
        return match std::fs::File::open(path) {
            Ok(file) => {
                use std::os::fd::IntoRawFd;
                let fd: RawFd = file.into_raw_fd();
                run_source(shell, Generator::from_fd(fd, true), Task::File)
            }
            Err(e) => {
                eprintln!("msh: {path}: {e}");
                127
            }
        };
    }

    if shell.opts.interactive {
        let prompt = shell.vars.get("PS1").unwrap_or_default();
        run_source(shell, Generator::interactive(0, prompt), Task::File)
    } else {
        run_source(shell, Generator::from_fd(0, false), Task::File)
    }
}

/// Feed `gen` through a fresh parser/input stack, executing each parsed
/// command as it's produced (so an interactive prompt sees its side
/// effects before reading the next line). Returns the final `$?`.
fn run_source(shell: &mut Shell, gen: Generator, task: Task) -> i32 {
    let mut input = InputStack::new();
    if input.push(gen, task).is_err() {
        eprintln!("msh: input too deep");
        return 1;
    }
    input.verbose = shell.opts.verbose;
    let mut parser = Parser::new();
    let mut status = shell.status();

    loop {
        if shell.opts.interactive {
            reprompt(shell, &parser, &mut input);
        }
        match parser.next_command(&mut input) {
            Ok(Some(cmd)) => match exec::execute(shell, &cmd) {
                Ok(s) => {
                    status = s;
                    shell.set_status(s);
                }
                Err(Escape::Exit(n)) => {
                    exec::run_exit_trap(shell);
                    return n;
                }
                Err(Escape::Return(n)) => {
                    status = n;
                    shell.set_status(n);
                }
                Err(Escape::Break(_) | Escape::Continue(_)) => {
                    eprintln!("msh: break/continue outside a loop");
                    status = 1;
                }
            },
            Ok(None) => break,
            Err(e) => {
                eprintln!("msh: {e}");
                shell.errors_seen += 1;
                status = 2;
                if shell.opts.noexec {
                    break;
                }
            }
        }
        if shell.opts.onecmd {
            break;
        }
    }
    status
}

/// Swap the live frame's prompt between `PS1` and `PS2` depending on
/// whether the parser is mid-way through a continued construct. A no-op
/// for any generator other than [`crate::input::Generator::Line`] (a
/// script file or `-c` string carries no prompt to swap).
fn reprompt(shell: &Shell, parser: &Parser, input: &mut InputStack) {
    let var = if parser.in_continuation() { "PS2" } else { "PS1" };
    input.set_prompt(shell.vars.get(var).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::Options;

    #[test]
    fn parses_dash_c_command_string() {
        let mut opts = Options::default();
        let args = vec!["-c".to_string(), "echo hi".to_string()];
        let inv = parse_args("msh", &args, &mut opts);
        assert_eq!(inv.command_string.as_deref(), Some("echo hi"));
        assert!(inv.script_path.is_none());
    }

    #[test]
    fn parses_option_letters_before_script() {
        let mut opts = Options::default();
        let args = vec!["-ex".to_string(), "script.sh".to_string(), "a".to_string()];
        let inv = parse_args("msh", &args, &mut opts);
        assert!(opts.errexit);
        assert!(opts.xtrace);
        assert_eq!(inv.script_path.as_deref(), Some("script.sh"));
        assert_eq!(inv.positional, vec!["msh".to_string(), "a".to_string()]);
    }

    #[test]
    fn leading_dash_in_arg0_marks_login_shell() {
        let mut opts = Options::default();
        let inv = parse_args("-msh", &[], &mut opts);
        assert!(inv.login);
        assert_eq!(inv.positional[0], "msh");
    }

    #[test]
    fn run_executes_command_string_and_reports_status() {
        let mut shell = Shell::new("msh");
        let mut opts = Options::default();
        let args = vec!["-c".to_string(), "exit 3".to_string()];
        let inv = parse_args("msh", &args, &mut opts);
        shell.opts = opts;
        let status = run(&mut shell, &inv);
        assert_eq!(status, 3);
    }
}
