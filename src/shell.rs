//! The consolidated shell state.
//!
//! The original keeps a handful of process-wide globals (`vlist`, `trap[]`,
//! `areanum`, `dolv`/`dolc`, `exstat`, `flags[]`, `intr`). Here they're all
//! fields of one `Shell`, passed by `&mut` through the evaluator instead of
//! read and written from anywhere in the program. Before a `fork`, the
//! child gets a shallow clone — `VarTable`, the trap table, and the option
//! flags are all plain owned data, so `Clone` already gives the "child sees
//! a snapshot, parent and child diverge independently from here" semantics
//! the original gets from `fork()` copying its whole address space.

use crate::input::InputStack;
use crate::parser::Parser;
use crate::signals::{SignalRelay, TrapTable};
use crate::vars::VarTable;

/// Command-line option letters (`-e`, `-n`, ...), tracked individually so
/// `$-` can be rebuilt and the evaluator can consult single flags cheaply.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// `-e`: exit immediately on a non-zero, unchecked command.
    pub errexit: bool,
    /// `-k`: allow `NAME=VALUE` assignment words anywhere in a command.
    pub keyword_assign: bool,
    /// `-n`: read and parse but don't execute (syntax check mode).
    pub noexec: bool,
    /// `-t`: exit after one command.
    pub onecmd: bool,
    /// `-u`: treat unset variable expansion as an error.
    pub nounset: bool,
    /// `-v`: echo input lines as read.
    pub verbose: bool,
    /// `-x`: trace each command to stderr before executing it.
    pub xtrace: bool,
    /// `-i`: interactive (prompts, `SIGINT` handling at the prompt).
    pub interactive: bool,
    /// `-s`: read commands from stdin even with a script file given.
    pub stdin_script: bool,
    /// `-h`: remember command locations as they're hashed (no-op here;
    /// kept only so `$-` round-trips the flag for scripts that check it).
    pub hash_cmds: bool,
    /// `-b`: report background job completion asynchronously. Declared
    /// but not wired to job control, which this implementation doesn't
    /// have (see Non-goals).
    pub notify: bool,
}

impl Options {
    /// Render the currently-set flags as the `$-` string, in the
    /// conventional `ehiknstuvx` letter order.
    #[must_use]
    pub fn as_flag_string(&self) -> String {
        let mut s = String::new();
        if self.errexit {
            s.push('e');
        }
        if self.hash_cmds {
            s.push('h');
        }
        if self.interactive {
            s.push('i');
        }
        if self.keyword_assign {
            s.push('k');
        }
        if self.noexec {
            s.push('n');
        }
        if self.notify {
            s.push('b');
        }
        if self.stdin_script {
            s.push('s');
        }
        if self.onecmd {
            s.push('t');
        }
        if self.nounset {
            s.push('u');
        }
        if self.verbose {
            s.push('v');
        }
        if self.xtrace {
            s.push('x');
        }
        s
    }

    /// Apply one option letter, returning `false` for an unrecognized one.
    pub fn apply(&mut self, letter: char, value: bool) -> bool {
        match letter {
            'e' => self.errexit = value,
            'k' => self.keyword_assign = value,
            'n' => self.noexec = value,
            't' => self.onecmd = value,
            'u' => self.nounset = value,
            'v' => self.verbose = value,
            'x' => self.xtrace = value,
            'i' => self.interactive = value,
            's' => self.stdin_script = value,
            'h' => self.hash_cmds = value,
            'b' => self.notify = value,
            _ => return false,
        }
        true
    }
}

/// Non-local control flow that unwinds through the evaluator without being
/// a shell error: `break N`/`continue N` popping `N` enclosing loops,
/// `return` from a `.`-sourced file, and `exit` terminating the process.
/// Modeled as a `Result` error type (the original's `setjmp`/`longjmp`
/// targets) rather than a panic, since every level that can catch one
/// (loop bodies, `.`, the top-level driver) needs to inspect and
/// potentially re-raise it after decrementing a counter.
#[derive(Debug, Clone, Copy)]
pub enum Escape {
    /// `break N` — unwind out of `N` enclosing loops.
    Break(u32),
    /// `continue N` — unwind to the top of the `N`th enclosing loop.
    Continue(u32),
    /// `return N` — stop executing the current `.`-sourced file / function
    /// body with exit status `N`.
    Return(i32),
    /// `exit N` — terminate the shell process with status `N`.
    Exit(i32),
}

/// Top-level error kinds, matching the taxonomy in the error-handling
/// design: everything except [`ShellError::Fatal`] leaves the shell
/// running with a non-zero `$?`.
#[derive(Debug)]
pub enum ShellError {
    /// A parse error; the offending command is discarded.
    Parse(crate::parser::ParseError),
    /// A parameter/command substitution error.
    Expand(crate::expand::ExpandError),
    /// I/O failure opening or duplicating a redirection target.
    Io {
        /// What was being attempted (`"open"`, `"dup2"`, ...).
        op: &'static str,
        /// The path involved, if any.
        path: String,
        /// The underlying OS error.
        source: std::io::Error,
    },
    /// A child process could not be execed.
    Exec {
        /// The program name that was being started.
        prog: String,
        /// The underlying `nix` error.
        source: nix::Error,
    },
    /// An unrecoverable condition: input-stack overflow, `fork` failure, or
    /// a broken `.profile`. These unwind all the way to the driver, which
    /// reports and exits.
    Fatal(&'static str),
}

impl std::fmt::Display for ShellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellError::Parse(e) => write!(f, "{e}"),
            ShellError::Expand(e) => write!(f, "{e}"),
            ShellError::Io { op, path, source } => write!(f, "{path}: {op} failed: {source}"),
            ShellError::Exec { prog, source } => write!(f, "{prog}: {source}"),
            ShellError::Fatal(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ShellError {}

/// Every piece of shell state that a running command needs: variables,
/// scratch storage, pending input, the parser's continuation state, and
/// signal/trap bookkeeping.
pub struct Shell {
    /// The variable table (named vars, positional params, special names).
    pub vars: VarTable,
    /// The live input source stack.
    pub input: InputStack,
    /// Parser continuation state (here-doc queue, `multiline` depth).
    pub parser: Parser,
    /// Configured traps.
    pub traps: TrapTable,
    /// Signal delivery flags.
    pub signals: SignalRelay,
    /// Active `-` option letters.
    pub opts: Options,
    /// Nesting depth of loops currently executing, for bounding `break N`.
    pub loop_depth: u32,
    /// `true` once a fatal parse/runtime error has been seen under `-e`.
    pub errors_seen: u32,
}

impl Shell {
    /// Build a fresh shell: variable table from the process environment,
    /// empty input/trap state.
    #[must_use]
    pub fn new(arg0: &str) -> Self {
        let pid = nix::unistd::getpid().as_raw();
        let euid = nix::unistd::geteuid().as_raw();
        Shell {
            vars: VarTable::from_environment(arg0, pid, euid),
            input: InputStack::new(),
            parser: Parser::new(),
            traps: TrapTable::new(),
            signals: SignalRelay::new(),
            opts: Options::default(),
            loop_depth: 0,
            errors_seen: 0,
        }
    }

    /// Build the shallow clone handed to a freshly forked child: an owned
    /// copy of every piece of state that `fork()` would otherwise have
    /// copy-on-write-shared from the parent's address space. The child's
    /// copy is free to diverge (e.g. consuming more input, running traps)
    /// without the parent observing it — matching `fork`'s semantics.
    #[must_use]
    pub fn fork_snapshot(&self) -> ForkedVars {
        ForkedVars {
            exported: self
                .vars
                .iter_exported()
                .map(|v| (v.name.clone(), v.value.clone()))
                .collect(),
        }
    }

    /// Record the outcome of the last command, updating `$?`.
    pub fn set_status(&mut self, status: i32) {
        self.vars.status = status;
    }

    /// `$?` of the last command.
    #[must_use]
    pub fn status(&self) -> i32 {
        self.vars.status
    }
}

/// The exported-variable snapshot passed to a forked child (see
/// [`Shell::fork_snapshot`]); this is what actually crosses into the
/// child's environment block at `execve` time.
pub struct ForkedVars {
    /// `(name, value)` pairs for every currently-exported variable.
    pub exported: Vec<(String, String)>,
}

impl ForkedVars {
    /// Render as `NAME=VALUE` strings suitable for `nix::unistd::execve`'s
    /// `envp` argument.
    #[must_use]
    pub fn to_envp(&self) -> Vec<std::ffi::CString> {
        self.exported
            .iter()
            .filter_map(|(k, v)| std::ffi::CString::new(format!("{k}={v}")).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_flag_string_follows_conventional_order() {
        let mut o = Options::default();
        o.apply('x', true);
        o.apply('e', true);
        assert_eq!(o.as_flag_string(), "ex");
    }

    #[test]
    fn unknown_flag_rejected() {
        let mut o = Options::default();
        assert!(!o.apply('z', true));
    }

    #[test]
    fn fork_snapshot_carries_only_exported_vars() {
        let mut shell = Shell::new("sh");
        shell.vars.set("UNEXPORTED", "x");
        shell.vars.set("VISIBLE", "y");
        shell.vars.export("VISIBLE");
        let snap = shell.fork_snapshot();
        assert!(snap.exported.iter().any(|(k, _)| k == "VISIBLE"));
        assert!(!snap.exported.iter().any(|(k, _)| k == "UNEXPORTED"));
    }
}
