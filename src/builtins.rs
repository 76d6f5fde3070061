//! The standard built-in commands: the handful that must run in the
//! shell's own process (they change its state directly) rather than a
//! forked child.
//!
//! Grounded on the original's builtin dispatch table (`cd`, `exit`,
//! `export`, `readonly`, `set`, `shift`, `trap`, `wait`, `read`, `eval`,
//! `exec`, `:`, `break`, `continue`, `times`, `umask`, `login`/`newgrp`,
//! `help`) and on the `Escape`/`Result` bubbling decided on for non-local
//! control flow in `shell.rs`. `.` has its own grammar production
//! ([`crate::ast::Cmd::Dot`]) and is evaluated directly in `exec.rs`
//! rather than dispatched through here.

use std::io::Write;
use std::str::FromStr;

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::shell::{Escape, Shell};
use crate::signals::TrapAction;
use crate::vars::AssignResult;

/// `true` if `name` names one of the builtins this module implements.
#[must_use]
pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "cd" | "exit"
            | "export"
            | "readonly"
            | "set"
            | "shift"
            | "trap"
            | "wait"
            | "read"
            | "eval"
            | "exec"
            | ":"
            | "break"
            | "continue"
            | "return"
            | "times"
            | "umask"
            | "login"
            | "newgrp"
            | "help"
    )
}

/// Run a builtin by name. `run_source` is called back into the evaluator
/// to execute a command string (used by `eval` and `.`); `exec_argv` is
/// called to replace the process image (used by `exec ARGV...`, which
/// otherwise has no way to call back into `exec.rs` without a dependency
/// cycle).
///
/// # Errors
///
/// Returns [`Escape`] for `exit`/`return`/`break`/`continue`; all other
/// outcomes (including builtin usage errors) are reported as a normal
/// non-zero return.
pub fn run(
    shell: &mut Shell,
    name: &str,
    args: &[String],
    run_source: &mut dyn FnMut(&mut Shell, &str) -> i32,
    exec_argv: &mut dyn FnMut(&[String]) -> std::io::Error,
) -> Result<i32, Escape> {
    match name {
        "cd" => Ok(builtin_cd(shell, args)),
        "exit" => Err(Escape::Exit(parse_status_arg(args, shell.status()))),
        "return" => Err(Escape::Return(parse_status_arg(args, shell.status()))),
        "break" => Err(Escape::Break(parse_level_arg(args))),
        "continue" => Err(Escape::Continue(parse_level_arg(args))),
        ":" => Ok(0),
        "export" => Ok(builtin_export(shell, args)),
        "readonly" => Ok(builtin_readonly(shell, args)),
        "set" => Ok(builtin_set(shell, args)),
        "shift" => Ok(builtin_shift(shell, args)),
        "trap" => Ok(builtin_trap(shell, args)),
        "wait" => Ok(builtin_wait(args)),
        "read" => Ok(builtin_read(shell, args)),
        "eval" => Ok(builtin_eval(shell, args, run_source)),
        "exec" => Ok(builtin_exec(args, exec_argv)),
        "times" => Ok(builtin_times()),
        "umask" => Ok(builtin_umask(args)),
        "help" => Ok(builtin_help()),
        "login" | "newgrp" => {
            eprintln!("{name}: not supported in this implementation");
            Ok(1)
        }
        other => {
            eprintln!("{other}: not a builtin");
            Ok(127)
        }
    }
}

fn parse_status_arg(args: &[String], default: i32) -> i32 {
    args.first()
        .and_then(|s| s.parse::<i32>().ok())
        .unwrap_or(default)
}

fn parse_level_arg(args: &[String]) -> u32 {
    args.first().and_then(|s| s.parse::<u32>().ok()).unwrap_or(1).max(1)
}

fn builtin_cd(shell: &mut Shell, args: &[String]) -> i32 {
    let target = args
        .first()
        .cloned()
        .or_else(|| shell.vars.get("HOME"))
        .unwrap_or_else(|| "/".to_string());
    match nix::unistd::chdir(target.as_str()) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("cd: {target}: {e}");
            1
        }
    }
}

fn builtin_export(shell: &mut Shell, args: &[String]) -> i32 {
    let mut status = 0;
    for a in args {
        if let Some((name, value)) = crate::vars::split_assign(a) {
            if shell.vars.set(name, value) == AssignResult::ReadOnly {
                eprintln!("export: {name}: is read only");
                status = 1;
            }
            shell.vars.export(name);
        } else {
            shell.vars.export(a);
        }
    }
    status
}

fn builtin_readonly(shell: &mut Shell, args: &[String]) -> i32 {
    let mut status = 0;
    for a in args {
        if let Some((name, value)) = crate::vars::split_assign(a) {
            if shell.vars.set(name, value) == AssignResult::ReadOnly {
                eprintln!("readonly: {name}: is read only");
                status = 1;
            }
            shell.vars.ronly(name);
        } else {
            shell.vars.ronly(a);
        }
    }
    status
}

fn builtin_set(shell: &mut Shell, args: &[String]) -> i32 {
    let mut rest = args.iter();
    while let Some(a) = rest.clone().next() {
        if let Some(letters) = a.strip_prefix('-') {
            if letters == "-" {
                rest.next();
                break;
            }
            for c in letters.chars() {
                shell.opts.apply(c, true);
            }
            rest.next();
        } else if let Some(letters) = a.strip_prefix('+') {
            for c in letters.chars() {
                shell.opts.apply(c, false);
            }
            rest.next();
        } else {
            break;
        }
    }
    let positional: Vec<String> = rest.cloned().collect();
    if !positional.is_empty() || args.iter().any(|a| a == "--") {
        shell.vars.set_positional(positional);
    }
    shell.vars.option_flags = shell.opts.as_flag_string();
    0
}

fn builtin_shift(shell: &mut Shell, args: &[String]) -> i32 {
    let n: usize = args.first().and_then(|s| s.parse().ok()).unwrap_or(1);
    if shell.vars.shift(n) {
        0
    } else {
        eprintln!("shift: shift count out of range");
        1
    }
}

fn builtin_trap(shell: &mut Shell, args: &[String]) -> i32 {
    if args.is_empty() {
        for (n, action) in shell.traps.iter() {
            match action {
                TrapAction::Run(cmd) => println!("trap -- '{cmd}' {n}"),
                TrapAction::Ignore => println!("trap -- '' {n}"),
                TrapAction::Default => {}
            }
        }
        return 0;
    }
    if args.len() == 1 {
        eprintln!("trap: usage: trap [-lp] [[arg] signal_spec ...]");
        return 2;
    }
    let (action, sig_args): (TrapAction, &[String]) = if args[0] == "-" {
        (TrapAction::Default, &args[1..])
    } else {
        (TrapAction::Run(args[0].clone()), &args[1..])
    };
    for spec in sig_args {
        let n = if spec.eq_ignore_ascii_case("EXIT") {
            0
        } else if let Ok(n) = spec.parse::<i32>() {
            n
        } else {
            match nix::sys::signal::Signal::from_str(&format!("SIG{}", spec.to_uppercase())) {
                Ok(sig) => sig as i32,
                Err(_) => {
                    eprintln!("trap: {spec}: invalid signal specification");
                    continue;
                }
            }
        };
        match &action {
            TrapAction::Default => shell.traps.clear(n),
            other => shell.traps.set(n, other.clone()),
        }
    }
    0
}

fn builtin_wait(args: &[String]) -> i32 {
    let pid: Option<Pid> = args
        .first()
        .and_then(|s| s.parse::<i32>().ok())
        .map(Pid::from_raw);
    match pid {
        Some(p) => match waitpid(p, None) {
            Ok(WaitStatus::Exited(_, code)) => code,
            Ok(WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
            _ => 127,
        },
        None => {
            loop {
                match waitpid(None, None) {
                    Ok(WaitStatus::StillAlive) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            0
        }
    }
}

fn builtin_read(shell: &mut Shell, args: &[String]) -> i32 {
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
        return 1;
    }
    let line = line.trim_end_matches('\n');
    let ifs = shell.vars.get("IFS").unwrap_or_else(|| " \t\n".to_string());
    let mut fields: Vec<&str> = line.split(|c: char| ifs.contains(c)).filter(|s| !s.is_empty()).collect();
    if args.is_empty() {
        shell.vars.set("REPLY", line);
        return 0;
    }
    for (i, name) in args.iter().enumerate() {
        let value = if i + 1 == args.len() {
            fields.drain(i.min(fields.len())..).collect::<Vec<_>>().join(" ")
        } else if i < fields.len() {
            fields[i].to_string()
        } else {
            String::new()
        };
        if shell.vars.set(name, value) == AssignResult::ReadOnly {
            eprintln!("read: {name}: is read only");
            return 1;
        }
    }
    0
}

fn builtin_eval(shell: &mut Shell, args: &[String], run_source: &mut dyn FnMut(&mut Shell, &str) -> i32) -> i32 {
    let src = args.join(" ");
    run_source(shell, &src)
}

fn builtin_exec(args: &[String], exec_argv: &mut dyn FnMut(&[String]) -> std::io::Error) -> i32 {
    if args.is_empty() {
        return 0;
    }
    let err = exec_argv(args);
    eprintln!("exec: {}: {err}", args[0]);
    126
}

fn builtin_times() -> i32 {
    let self_ = nix::sys::resource::getrusage(nix::sys::resource::UsageWho::RUSAGE_SELF);
    if let Ok(u) = self_ {
        println!(
            "{}m{:.3}s {}m{:.3}s",
            u.user_time().tv_sec() / 60,
            u.user_time().tv_sec() % 60,
            u.system_time().tv_sec() / 60,
            u.system_time().tv_sec() % 60
        );
    }
    0
}

fn builtin_umask(args: &[String]) -> i32 {
    match args.first() {
        None => {
            let cur = nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(0o022));
            nix::sys::stat::umask(cur);
            println!("{:04o}", cur.bits());
            0
        }
        Some(s) => match u32::from_str_radix(s, 8) {
            Ok(mask) => {
                nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(mask));
                0
            }
            Err(_) => {
                eprintln!("umask: {s}: invalid octal mode");
                1
            }
        },
    }
}

fn builtin_help() -> i32 {
    let _ = std::io::stdout().write_all(
        b"cd exit export readonly set shift trap wait read eval exec . : break continue return times umask\n",
    );
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_builtin_recognizes_known_names() {
        assert!(is_builtin("cd"));
        assert!(is_builtin(":"));
        assert!(!is_builtin("ls"));
    }

    #[test]
    fn colon_is_a_no_op() {
        let mut shell = Shell::new("sh");
        let result = run(&mut shell, ":", &[], &mut |_, _| 0, &mut |_| std::io::Error::other("unused"));
        assert!(matches!(result, Ok(0)));
    }

    #[test]
    fn exit_raises_escape() {
        let mut shell = Shell::new("sh");
        let result = run(
            &mut shell,
            "exit",
            &["7".to_string()],
            &mut |_, _| 0,
            &mut |_| std::io::Error::other("unused"),
        );
        assert!(matches!(result, Err(Escape::Exit(7))));
    }

    #[test]
    fn export_marks_variable_exported() {
        let mut shell = Shell::new("sh");
        let _ = run(
            &mut shell,
            "export",
            &["FOO=bar".to_string()],
            &mut |_, _| 0,
            &mut |_| std::io::Error::other("unused"),
        );
        assert_eq!(shell.vars.get("FOO").as_deref(), Some("bar"));
    }

    #[test]
    fn shift_out_of_range_errors() {
        let mut shell = Shell::new("sh");
        let result = run(
            &mut shell,
            "shift",
            &["5".to_string()],
            &mut |_, _| 0,
            &mut |_| std::io::Error::other("unused"),
        );
        assert!(matches!(result, Ok(1)));
    }
}
