//! msh — binary entry point.

use std::process;

fn main() {
    env_logger::init();

    let mut argv: Vec<String> = std::env::args().collect();
    let arg0 = if argv.is_empty() {
        "msh".to_string()
    } else {
        argv.remove(0)
    };

    let mut shell = msh::shell::Shell::new(arg0.trim_start_matches('-'));
    let invocation = msh::driver::parse_args(&arg0, &argv, &mut shell.opts);
    shell.vars.option_flags = shell.opts.as_flag_string();

    if let Err(e) = install_default_signal_handling(&mut shell) {
        log::warn!("failed to install signal handlers: {e}");
    }

    let status = msh::driver::run(&mut shell, &invocation);
    msh::exec::run_exit_trap(&mut shell);
    process::exit(status);
}

/// `SIGINT`/`SIGQUIT` are ignored in a non-interactive shell unless
/// trapped; an interactive one catches `SIGINT` so a prompt read can be
/// unwound instead of killing the process.
fn install_default_signal_handling(shell: &mut msh::shell::Shell) -> Result<(), std::io::Error> {
    use nix::sys::signal::Signal;
    if shell.opts.interactive {
        shell.signals.catch(Signal::SIGINT)?;
    } else {
        shell
            .signals
            .ignore(Signal::SIGINT)
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        shell
            .signals
            .ignore(Signal::SIGQUIT)
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
    }
    Ok(())
}
