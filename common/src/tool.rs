//! Blocking invocation of the external command line tools.

use crate::Error;
use itertools::Itertools;
use log::debug;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

/// Render a command line for log and error messages.
pub(crate) fn describe(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy())
        .join(" ")
}

/// Run `command` with `input` on its standard input and return its standard output.
/// Standard error passes through to ours.
pub(crate) fn run_with_stdin(command: &mut Command, input: &[u8]) -> Result<Vec<u8>, Error> {
    let display = describe(command);
    debug!("run {display}");
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            command: display.clone(),
            source,
        })?;

    // stdin is written from a scoped thread while stdout drains here
    let stdin = child.stdin.take();
    let label = display.clone();
    let output = thread::scope(|scope| {
        if let Some(mut stdin) = stdin {
            scope.spawn(move || {
                if let Err(e) = stdin.write_all(input) {
                    debug!("{label} closed stdin early: {e}");
                }
            });
        }
        child.wait_with_output()
    })
    .map_err(|source| Error::Spawn {
        command: display.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(Error::ToolFailed {
            command: display,
            status: output.status,
        });
    }
    Ok(output.stdout)
}

/// Run `command` with no input and wait for it.
pub(crate) fn run(command: &mut Command) -> Result<(), Error> {
    let display = describe(command);
    debug!("run {display}");
    let status = command
        .stdin(Stdio::null())
        .status()
        .map_err(|source| Error::Spawn {
            command: display.clone(),
            source,
        })?;
    if !status.success() {
        return Err(Error::ToolFailed {
            command: display,
            status,
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_run_with_stdin_returns_stdout() {
        let out = run_with_stdin(&mut Command::new("cat"), b"hello").unwrap();
        assert_eq!(out, b"hello");
    }

    #[test_log::test]
    fn test_nonzero_exit_is_tool_failure() {
        let result = run(&mut Command::new("false"));
        assert!(matches!(result, Err(Error::ToolFailed { .. })));
    }

    #[test_log::test]
    fn test_missing_binary_is_spawn_failure() {
        let result = run_with_stdin(&mut Command::new("/nonexistent/analyze"), b"");
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }
}
