//! The evaluator: walks a parsed [`Cmd`] tree and drives the OS — forking,
//! wiring up redirections, searching `$PATH`, and dispatching to
//! builtins.
//!
//! Grounded on the original's `execute()`/`commandtype()` dispatch,
//! reinterpreted around `nix`'s typed syscalls instead of raw libc, and on
//! the `-> Result<i32, Escape>` non-local-control-flow design settled in
//! `shell.rs`.

use std::ffi::CString;
use std::os::fd::RawFd;

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::ast::{Cmd, Quote, Redir, RedirOp, SimpleCmd, Word};
use crate::expand::{self, CommandRunner, ExpandError, ExpandFlags};
use crate::input::{Generator, InputStack, Task};
use crate::parser::Parser;
use crate::shell::{Escape, Shell, ShellError};

impl Shell {
    /// Expand one word against this shell's variable table, allowing
    /// command substitution to recurse back through `self`.
    ///
    /// `expand::eval_word` wants two independent `&mut` borrows — the
    /// variable table and the command runner — but both live on `Shell`.
    /// There's no concurrency here, so snapshot-mutate-writeback is
    /// observably identical to an in-place borrow split and sidesteps the
    /// conflict; a `$(...)` nested inside still sees every variable set by
    /// an earlier `${x=...}` in the same word because the snapshot is
    /// taken fresh for every call.
    ///
    /// # Errors
    ///
    /// See [`expand::eval_word`].
    pub fn expand_word(&mut self, word: &Word, flags: ExpandFlags) -> Result<Vec<String>, ExpandError> {
        let mut vars = self.vars.clone();
        let result = expand::eval_word(word, &mut vars, self, flags);
        self.vars = vars;
        result
    }

    /// Expand a whole word list, in order.
    ///
    /// # Errors
    ///
    /// See [`expand::eval_words`].
    pub fn expand_words(&mut self, words: &[Word], flags: ExpandFlags) -> Result<Vec<String>, ExpandError> {
        let mut out = Vec::new();
        for w in words {
            out.extend(self.expand_word(w, flags)?);
        }
        Ok(out)
    }
}

impl CommandRunner for Shell {
    /// Run `src` in a forked child with stdout captured through a pipe.
    /// The child gets a clone of the current variable table (reads see
    /// the parent's state; writes, per `$(...)`'s subshell semantics,
    /// never make it back) and a fresh trap/signal/input state.
    fn run_capture(&mut self, src: &str) -> Result<Vec<u8>, ExpandError> {
        let (read_fd, write_fd) =
            unistd::pipe().map_err(|e| ExpandError::Substitution(e.to_string()))?;

        // SAFETY: the child only calls async-signal-safe-adjacent code
        // (dup2/close/exec-free Rust execution) before either exiting or
        // being replaced by run_string's own command dispatch; it never
        // returns across the fork boundary into the parent's stack.
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                let _ = unistd::close(read_fd);
                let _ = unistd::dup2(write_fd, 1);
                let _ = unistd::close(write_fd);
                let mut child = Shell {
                    vars: self.vars.clone(),
                    input: InputStack::new(),
                    parser: Parser::new(),
                    traps: self.traps.clone(),
                    signals: crate::signals::SignalRelay::new(),
                    opts: self.opts,
                    loop_depth: 0,
                    errors_seen: 0,
                };
                let status = run_string(&mut child, src);
                run_exit_trap(&mut child);
                std::process::exit(status);
            }
            Ok(ForkResult::Parent { child }) => {
                let _ = unistd::close(write_fd);
                let mut out = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    match unistd::read(read_fd, &mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => out.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = unistd::close(read_fd);
                let _ = waitpid(child, None);
                while out.last() == Some(&b'\n') {
                    out.pop();
                }
                Ok(out)
            }
            Err(e) => Err(ExpandError::Substitution(e.to_string())),
        }
    }
}

/// Parse and run every command in `src` against `shell`, stopping at the
/// first parse error or an `exit`. Used by the `eval`/`.` builtins and by
/// command substitution. Returns the status of the last command run.
pub fn run_string(shell: &mut Shell, src: &str) -> i32 {
    let mut input = InputStack::new();
    if input.push(Generator::from_str(src), Task::Other).is_err() {
        return 1;
    }
    let mut parser = Parser::new();
    let mut status = shell.status();
    loop {
        match parser.next_command(&mut input) {
            Ok(Some(cmd)) => match execute(shell, &cmd) {
                Ok(s) => {
                    status = s;
                    shell.set_status(s);
                }
                Err(Escape::Exit(n)) => {
                    run_exit_trap(shell);
                    std::process::exit(n);
                }
                Err(Escape::Return(n)) => {
                    status = n;
                    shell.set_status(n);
                    break;
                }
                Err(_break_or_continue) => break,
            },
            Ok(None) => break,
            Err(e) => {
                eprintln!("msh: {e}");
                status = 2;
                break;
            }
        }
    }
    status
}

/// Execute one parsed command tree node, returning its exit status or an
/// [`Escape`] unwinding through an enclosing loop/`.`/the whole shell.
///
/// # Errors
///
/// Propagates [`Escape`] from `break`/`continue`/`return`/`exit`.
pub fn execute(shell: &mut Shell, cmd: &Cmd) -> Result<i32, Escape> {
    if let Some(sig) = shell.signals.take_pending() {
        run_trap_if_set(shell, sig as i32);
    }
    let status = execute_inner(shell, cmd)?;
    if shell.opts.errexit && status != 0 && !matches!(cmd, Cmd::If { .. } | Cmd::While { .. } | Cmd::Until { .. } | Cmd::And(..) | Cmd::Or(..)) {
        return Err(Escape::Exit(status));
    }
    Ok(status)
}

fn run_trap_if_set(shell: &mut Shell, signum: i32) {
    if let Some(crate::signals::TrapAction::Run(body)) = shell.traps.get(signum).cloned() {
        let _ = run_string(shell, &body);
    }
}

/// Run the `EXIT` pseudo-trap (trap number 0), if one is set, then clear it
/// so a nested `exit` inside the trap body can't fire it again. Every path
/// that terminates the process — `exit` unwinding out of `run_string`, the
/// driver's read-eval loop, and the binary's final exit — calls this
/// exactly once before the process actually goes away.
pub fn run_exit_trap(shell: &mut Shell) {
    if let Some(crate::signals::TrapAction::Run(body)) = shell.traps.get(0).cloned() {
        shell.traps.clear(0);
        let _ = run_string(shell, &body);
    }
}

fn execute_inner(shell: &mut Shell, cmd: &Cmd) -> Result<i32, Escape> {
    match cmd {
        Cmd::Empty => Ok(0),
        Cmd::Simple(sc) => exec_simple(shell, sc),
        Cmd::Paren(inner, redirs) => exec_subshell(shell, inner, redirs),
        Cmd::Brace(inner, redirs) => {
            let saved = apply_redirs(shell, redirs).map_err(fatal_on_io)?;
            let status = execute(shell, inner);
            restore_redirs(saved);
            status
        }
        Cmd::Pipe(left, right) => exec_pipe(shell, left, right),
        Cmd::List(left, right) => {
            execute(shell, left)?;
            execute(shell, right)
        }
        Cmd::And(left, right) => {
            let s = execute(shell, left)?;
            if s == 0 {
                execute(shell, right)
            } else {
                Ok(s)
            }
        }
        Cmd::Or(left, right) => {
            let s = execute(shell, left)?;
            if s != 0 {
                execute(shell, right)
            } else {
                Ok(s)
            }
        }
        Cmd::Async(inner) => exec_async(shell, inner),
        Cmd::For { var, words, body, redirs } => exec_for(shell, var, words.as_deref(), body, redirs),
        Cmd::While { cond, body, redirs } => exec_loop(shell, cond, body, redirs, true),
        Cmd::Until { cond, body, redirs } => exec_loop(shell, cond, body, redirs, false),
        Cmd::If { cond, then_, else_, redirs } | Cmd::Elif { cond, then_, else_, redirs } => {
            let saved = apply_redirs(shell, redirs).map_err(fatal_on_io)?;
            let result = if execute(shell, cond)? == 0 {
                execute(shell, then_)
            } else if let Some(e) = else_ {
                execute(shell, e)
            } else {
                Ok(0)
            };
            restore_redirs(saved);
            result
        }
        Cmd::Case { word, arms, redirs } => exec_case(shell, word, arms, redirs),
        Cmd::Dot { file } => {
            let path = shell
                .expand_word(file, ExpandFlags::redir_target())
                .map_err(|e| Escape::Return(report_expand(e)))?
                .join("");
            match std::fs::read_to_string(&path) {
                Ok(src) => Ok(run_string(shell, &src)),
                Err(e) => {
                    eprintln!(".: {path}: {e}");
                    Ok(127)
                }
            }
        }
    }
}

fn fatal_on_io(e: ShellError) -> Escape {
    eprintln!("msh: {e}");
    Escape::Exit(1)
}

fn report_expand(e: ExpandError) -> i32 {
    eprintln!("msh: {e}");
    1
}

fn exec_for(
    shell: &mut Shell,
    var: &str,
    words: Option<&[Word]>,
    body: &Cmd,
    redirs: &[Redir],
) -> Result<i32, Escape> {
    let saved = apply_redirs(shell, redirs).map_err(fatal_on_io)?;
    let items: Vec<String> = match words {
        Some(ws) => shell
            .expand_words(ws, ExpandFlags::all_stages())
            .map_err(|e| Escape::Exit(report_expand(e)))?,
        None => shell.vars.positional_params().to_vec(),
    };
    shell.loop_depth += 1;
    let mut status = 0;
    for item in items {
        shell.vars.set(var, item);
        match execute(shell, body) {
            Ok(s) => status = s,
            Err(Escape::Break(n)) => {
                if n > 1 {
                    shell.loop_depth -= 1;
                    restore_redirs(saved);
                    return Err(Escape::Break(n - 1));
                }
                break;
            }
            Err(Escape::Continue(n)) => {
                if n > 1 {
                    shell.loop_depth -= 1;
                    restore_redirs(saved);
                    return Err(Escape::Continue(n - 1));
                }
                continue;
            }
            Err(other) => {
                shell.loop_depth -= 1;
                restore_redirs(saved);
                return Err(other);
            }
        }
    }
    shell.loop_depth -= 1;
    restore_redirs(saved);
    Ok(status)
}

fn exec_loop(
    shell: &mut Shell,
    cond: &Cmd,
    body: &Cmd,
    redirs: &[Redir],
    while_semantics: bool,
) -> Result<i32, Escape> {
    let saved = apply_redirs(shell, redirs).map_err(fatal_on_io)?;
    shell.loop_depth += 1;
    let mut status = 0;
    loop {
        let cond_status = execute(shell, cond)?;
        if (cond_status == 0) != while_semantics {
            break;
        }
        match execute(shell, body) {
            Ok(s) => status = s,
            Err(Escape::Break(n)) => {
                if n > 1 {
                    shell.loop_depth -= 1;
                    restore_redirs(saved);
                    return Err(Escape::Break(n - 1));
                }
                break;
            }
            Err(Escape::Continue(n)) => {
                if n > 1 {
                    shell.loop_depth -= 1;
                    restore_redirs(saved);
                    return Err(Escape::Continue(n - 1));
                }
                continue;
            }
            Err(other) => {
                shell.loop_depth -= 1;
                restore_redirs(saved);
                return Err(other);
            }
        }
    }
    shell.loop_depth -= 1;
    restore_redirs(saved);
    Ok(status)
}

fn exec_case(
    shell: &mut Shell,
    word: &Word,
    arms: &[crate::ast::CaseArm],
    redirs: &[Redir],
) -> Result<i32, Escape> {
    let saved = apply_redirs(shell, redirs).map_err(fatal_on_io)?;
    let subject = shell
        .expand_word(word, ExpandFlags::SUB | ExpandFlags::TRIM)
        .map_err(|e| Escape::Exit(report_expand(e)))?
        .join(" ");
    let mut result = Ok(0);
    for arm in arms {
        let matched = arm.patterns.iter().any(|p| {
            let pattern = p.to_string_lossy();
            crate::glob::gmatch(&subject, &pattern)
        });
        if matched {
            result = match &arm.body {
                Some(b) => execute(shell, b),
                None => Ok(0),
            };
            break;
        }
    }
    restore_redirs(saved);
    result
}

fn exec_subshell(shell: &mut Shell, inner: &Cmd, redirs: &[Redir]) -> Result<i32, Escape> {
    // SAFETY: the child never returns across the fork boundary — it
    // always terminates via `std::process::exit`.
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            if apply_redirs(shell, redirs).is_err() {
                std::process::exit(1);
            }
            let status = match execute(shell, inner) {
                Ok(s) => s,
                Err(Escape::Exit(n) | Escape::Return(n)) => n,
                Err(Escape::Break(_) | Escape::Continue(_)) => 0,
            };
            std::process::exit(status);
        }
        Ok(ForkResult::Parent { child }) => Ok(wait_for(child)),
        Err(e) => {
            eprintln!("msh: fork: {e}");
            Ok(1)
        }
    }
}

fn exec_async(shell: &mut Shell, inner: &Cmd) -> Result<i32, Escape> {
    // SAFETY: see exec_subshell.
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            let status = match execute(shell, inner) {
                Ok(s) => s,
                Err(Escape::Exit(n) | Escape::Return(n)) => n,
                Err(Escape::Break(_) | Escape::Continue(_)) => 0,
            };
            std::process::exit(status);
        }
        Ok(ForkResult::Parent { child }) => {
            shell.vars.last_bg_pid = Some(child.as_raw());
            Ok(0)
        }
        Err(e) => {
            eprintln!("msh: fork: {e}");
            Ok(1)
        }
    }
}

fn exec_pipe(shell: &mut Shell, left: &Cmd, right: &Cmd) -> Result<i32, Escape> {
    let (read_fd, write_fd) = match unistd::pipe() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("msh: pipe: {e}");
            return Ok(1);
        }
    };

    // SAFETY: see exec_subshell.
    let left_pid = match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            let _ = unistd::close(read_fd);
            let _ = unistd::dup2(write_fd, 1);
            let _ = unistd::close(write_fd);
            let status = match execute(shell, left) {
                Ok(s) => s,
                Err(Escape::Exit(n) | Escape::Return(n)) => n,
                Err(Escape::Break(_) | Escape::Continue(_)) => 0,
            };
            std::process::exit(status);
        }
        Ok(ForkResult::Parent { child }) => child,
        Err(e) => {
            eprintln!("msh: fork: {e}");
            return Ok(1);
        }
    };

    // SAFETY: see exec_subshell.
    let right_pid = match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            let _ = unistd::close(write_fd);
            let _ = unistd::dup2(read_fd, 0);
            let _ = unistd::close(read_fd);
            let status = match execute(shell, right) {
                Ok(s) => s,
                Err(Escape::Exit(n) | Escape::Return(n)) => n,
                Err(Escape::Break(_) | Escape::Continue(_)) => 0,
            };
            std::process::exit(status);
        }
        Ok(ForkResult::Parent { child }) => child,
        Err(e) => {
            eprintln!("msh: fork: {e}");
            return Ok(1);
        }
    };

    let _ = unistd::close(read_fd);
    let _ = unistd::close(write_fd);
    let _ = wait_for(left_pid);
    Ok(wait_for(right_pid))
}

fn wait_for(pid: Pid) -> i32 {
    match waitpid(pid, None) {
        Ok(WaitStatus::Exited(_, code)) => code,
        Ok(WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
        _ => 127,
    }
}

fn exec_simple(shell: &mut Shell, sc: &SimpleCmd) -> Result<i32, Escape> {
    let saved = apply_redirs(shell, &sc.redirs).map_err(fatal_on_io)?;

    if sc.words.is_empty() {
        let mut status = 0;
        for (name, word) in &sc.assigns {
            let value = shell
                .expand_word(word, ExpandFlags::all_stages())
                .map_err(|e| Escape::Exit(report_expand(e)))?
                .join(" ");
            if shell.vars.set(name, value) == crate::vars::AssignResult::ReadOnly {
                eprintln!("{name}: is read only");
                status = 1;
            }
        }
        restore_redirs(saved);
        return Ok(status);
    }

    let mut argv = match shell.expand_words(&sc.words, ExpandFlags::all_stages()) {
        Ok(a) => a,
        Err(e) => {
            restore_redirs(saved);
            return Ok(report_expand(e));
        }
    };
    if argv.is_empty() {
        restore_redirs(saved);
        return Ok(0);
    }
    let name = argv.remove(0);

    if shell.opts.xtrace {
        eprintln!("+ {name} {}", argv.join(" "));
    }
    if shell.opts.noexec {
        restore_redirs(saved);
        return Ok(0);
    }

    // Prefix assignments are visible to the command being run (and, for a
    // builtin or special builtin, persist in the current shell) but never
    // permanently overwrite an existing shell variable of the same name
    // for an external command — handled by exporting a transient overlay.
    let mut overlay: Vec<(String, String)> = Vec::new();
    for (aname, aword) in &sc.assigns {
        let value = shell
            .expand_word(aword, ExpandFlags::all_stages())
            .map_err(|e| Escape::Exit(report_expand(e)))?
            .join(" ");
        overlay.push((aname.clone(), value));
    }

    let status = if crate::builtins::is_builtin(&name) {
        for (aname, value) in &overlay {
            if shell.vars.set(aname, value.clone()) == crate::vars::AssignResult::ReadOnly {
                eprintln!("{aname}: is read only");
            }
        }
        let envp_for_exec = shell_vars_envp(shell, &[]);
        let mut run_source = |sh: &mut Shell, src: &str| run_string(sh, src);
        let mut exec_argv = |args: &[String]| -> std::io::Error {
            match fork_and_exec(envp_for_exec.clone(), args) {
                Ok(status) => std::process::exit(status),
                Err(e) => e,
            }
        };
        match crate::builtins::run(shell, &name, &argv, &mut run_source, &mut exec_argv) {
            Ok(s) => s,
            Err(e) => {
                restore_redirs(saved);
                return Err(e);
            }
        }
    } else {
        run_external(shell, &name, &argv, &overlay)
    };

    restore_redirs(saved);
    shell.set_status(status);
    Ok(status)
}

fn run_external(shell: &mut Shell, name: &str, argv: &[String], overlay: &[(String, String)]) -> i32 {
    let envp = shell_vars_envp(shell, overlay);
    let mut full_argv = vec![name.to_string()];
    full_argv.extend(argv.iter().cloned());

    let resolved = if name.contains('/') {
        Some(name.to_string())
    } else {
        path_search(shell, name)
    };
    let Some(path) = resolved else {
        eprintln!("{name}: not found");
        return 127;
    };

    // SAFETY: the child never returns across the fork boundary — it
    // always execs or calls `std::process::exit`.
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            let cpath = CString::new(path.as_str()).unwrap_or_default();
            let cargv: Vec<CString> = full_argv
                .iter()
                .map(|a| CString::new(a.as_str()).unwrap_or_default())
                .collect();
            match unistd::execve(&cpath, &cargv, &envp) {
                Ok(_) => unreachable!(),
                Err(nix::Error::ENOEXEC) => {
                    let mut shell_argv = vec![
                        CString::new(shell.vars.get("SHELL").unwrap_or_else(|| "/bin/sh".into()))
                            .unwrap_or_default(),
                        cpath,
                    ];
                    shell_argv.extend(cargv.into_iter().skip(1));
                    let shell_path = shell_argv[0].clone();
                    let _ = unistd::execve(&shell_path, &shell_argv, &envp);
                    std::process::exit(126);
                }
                Err(_) => std::process::exit(126),
            }
        }
        Ok(ForkResult::Parent { child }) => wait_for(child),
        Err(e) => {
            eprintln!("msh: fork: {e}");
            1
        }
    }
}

fn fork_and_exec(envp: Vec<CString>, argv: &[String]) -> Result<i32, std::io::Error> {
    if argv.is_empty() {
        return Err(std::io::Error::other("exec: no command"));
    }
    let path = if argv[0].contains('/') {
        argv[0].clone()
    } else {
        std::env::var("PATH")
            .unwrap_or_default()
            .split(':')
            .map(|dir| format!("{dir}/{}", argv[0]))
            .find(|candidate| unistd::access(candidate.as_str(), unistd::AccessFlags::X_OK).is_ok())
            .ok_or_else(|| std::io::Error::from_raw_os_error(nix::errno::Errno::ENOENT as i32))?
    };
    let cpath = CString::new(path).map_err(std::io::Error::other)?;
    let cargv: Vec<CString> = argv
        .iter()
        .map(|a| CString::new(a.as_str()).unwrap_or_default())
        .collect();
    unistd::execve(&cpath, &cargv, &envp).map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
    unreachable!()
}

fn shell_vars_envp(shell: &Shell, overlay: &[(String, String)]) -> Vec<CString> {
    let mut pairs: Vec<(String, String)> = shell
        .vars
        .iter_exported()
        .map(|v| (v.name.clone(), v.value.clone()))
        .collect();
    for (name, value) in overlay {
        if let Some(existing) = pairs.iter_mut().find(|(n, _)| n == name) {
            existing.1 = value.clone();
        } else {
            pairs.push((name.clone(), value.clone()));
        }
    }
    pairs
        .into_iter()
        .filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok())
        .collect()
}

/// Search `$PATH` for an executable named `name`, returning the first
/// match's full path.
fn path_search(shell: &Shell, name: &str) -> Option<String> {
    let path = shell.vars.get("PATH").unwrap_or_default();
    for dir in path.split(':') {
        let candidate = if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        };
        if unistd::access(candidate.as_str(), unistd::AccessFlags::X_OK).is_ok() {
            return Some(candidate);
        }
    }
    None
}

fn default_unit(op: &RedirOp) -> i32 {
    match op {
        RedirOp::Read | RedirOp::Here { .. } => 0,
        RedirOp::Write | RedirOp::Append | RedirOp::DupFrom | RedirOp::Close => 1,
    }
}

/// Apply a list of redirections to the real file descriptors of this
/// process, returning `(unit, saved_copy)` pairs so the caller can restore
/// them afterward (used by anything that doesn't fork: `{ }`, `if`/`while`
/// trailing redirects).
fn apply_redirs(shell: &mut Shell, redirs: &[Redir]) -> Result<Vec<(RawFd, RawFd)>, ShellError> {
    let mut saved = Vec::new();
    for r in redirs {
        let unit: RawFd = if r.unit >= 0 { i32::from(r.unit) } else { default_unit(&r.op) };
        if let Ok(old) = unistd::dup(unit) {
            saved.push((unit, old));
        }
        apply_one_redir(shell, r, unit)?;
    }
    Ok(saved)
}

fn apply_one_redir(shell: &mut Shell, r: &Redir, unit: RawFd) -> Result<(), ShellError> {
    match &r.op {
        RedirOp::Read => {
            let path = expand_target(shell, &r.target)?;
            let fd = open(path.as_str(), OFlag::O_RDONLY, Mode::empty())
                .map_err(|e| io_err("open", &path, e))?;
            dup2_onto(fd, unit, &path)?;
        }
        RedirOp::Write => {
            let path = expand_target(shell, &r.target)?;
            let fd = open(
                path.as_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                Mode::from_bits_truncate(0o666),
            )
            .map_err(|e| io_err("open", &path, e))?;
            dup2_onto(fd, unit, &path)?;
        }
        RedirOp::Append => {
            let path = expand_target(shell, &r.target)?;
            let fd = open(
                path.as_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                Mode::from_bits_truncate(0o666),
            )
            .map_err(|e| io_err("open", &path, e))?;
            dup2_onto(fd, unit, &path)?;
        }
        RedirOp::DupFrom => {
            let target = expand_target(shell, &r.target)?;
            let src: RawFd = target
                .parse()
                .map_err(|_| ShellError::Fatal("bad file descriptor in redirection"))?;
            unistd::dup2(src, unit).map_err(|e| io_err("dup2", &target, e))?;
        }
        RedirOp::Close => {
            let _ = unistd::close(unit);
        }
        RedirOp::Here { expand } => {
            let fd = materialize_heredoc(shell, r, *expand)?;
            dup2_onto(fd, unit, "<<heredoc>>")?;
        }
    }
    Ok(())
}

fn dup2_onto(fd: RawFd, unit: RawFd, path: &str) -> Result<(), ShellError> {
    let result = unistd::dup2(fd, unit).map_err(|e| io_err("dup2", path, e));
    let _ = unistd::close(fd);
    result.map(|_| ())
}

fn expand_target(shell: &mut Shell, word: &Word) -> Result<String, ShellError> {
    shell
        .expand_word(word, ExpandFlags::redir_target())
        .map(|fields| fields.join(""))
        .map_err(|e| ShellError::Io {
            op: "expand",
            path: e.to_string(),
            source: std::io::Error::other(e.to_string()),
        })
}

fn io_err(op: &'static str, path: &str, source: nix::Error) -> ShellError {
    ShellError::Io {
        op,
        path: path.to_string(),
        source: std::io::Error::from_raw_os_error(source as i32),
    }
}

/// Materialize a here-document's body into an unnamed temp file and return
/// an open read-only descriptor onto it, applying `$`/backtick expansion
/// first if the tag was unquoted (deferred here, rather than at parse
/// time, since it needs a live variable table).
fn materialize_heredoc(shell: &mut Shell, r: &Redir, expand: bool) -> Result<RawFd, ShellError> {
    let body = r.here_doc.as_ref().map(|h| h.body.clone()).unwrap_or_default();
    let text = if expand {
        let mut w = Word::new();
        w.push_str(&body, Quote::Bare);
        shell
            .expand_word(&w, ExpandFlags::SUB)
            .map(|fields| fields.join(""))
            .map_err(|e| ShellError::Io {
                op: "expand",
                path: "<<heredoc>>".to_string(),
                source: std::io::Error::other(e.to_string()),
            })?
    } else {
        body
    };

    let (fd, path) = unistd::mkstemp("/tmp/msh-heredoc-XXXXXX")
        .map_err(|e| io_err("mkstemp", "/tmp/msh-heredoc-XXXXXX", e))?;
    let _ = unistd::unlink(&path);
    if let Err(e) = unistd::write(fd, text.as_bytes()) {
        let _ = unistd::close(fd);
        return Err(io_err("write", "<<heredoc>>", e));
    }
    unistd::lseek(fd, 0, unistd::Whence::SeekSet).map_err(|e| io_err("lseek", "<<heredoc>>", e))?;
    Ok(fd)
}

/// Restore fds saved by [`apply_redirs`], in reverse order.
fn restore_redirs(saved: Vec<(RawFd, RawFd)>) {
    for (unit, old) in saved.into_iter().rev() {
        let _ = unistd::dup2(old, unit);
        let _ = unistd::close(old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SimpleCmd;

    fn word(s: &str) -> Word {
        Word::unquoted(s)
    }

    #[test]
    fn empty_command_returns_zero() {
        let mut shell = Shell::new("sh");
        assert_eq!(execute(&mut shell, &Cmd::Empty).unwrap(), 0);
    }

    #[test]
    fn bare_assignment_sets_variable_without_running_anything() {
        let mut shell = Shell::new("sh");
        let sc = SimpleCmd {
            assigns: vec![("FOO".to_string(), word("bar"))],
            words: Vec::new(),
            redirs: Vec::new(),
        };
        let status = execute(&mut shell, &Cmd::Simple(sc)).unwrap();
        assert_eq!(status, 0);
        assert_eq!(shell.vars.get("FOO").as_deref(), Some("bar"));
    }

    #[test]
    fn colon_builtin_runs_as_no_op() {
        let mut shell = Shell::new("sh");
        let sc = SimpleCmd {
            assigns: Vec::new(),
            words: vec![word(":")],
            redirs: Vec::new(),
        };
        let status = execute(&mut shell, &Cmd::Simple(sc)).unwrap();
        assert_eq!(status, 0);
    }

    #[test]
    fn and_or_short_circuit() {
        let mut shell = Shell::new("sh");
        let false_cmd = Cmd::Simple(SimpleCmd {
            assigns: Vec::new(),
            words: vec![word("exit"), word("1")],
            redirs: Vec::new(),
        });
        let result = execute(&mut shell, &Cmd::And(Box::new(false_cmd), Box::new(Cmd::Empty)));
        assert!(matches!(result, Err(Escape::Exit(1))));
    }
}
