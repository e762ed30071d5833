// SPDX-License-Identifier: GPL-3.0-or-later

use super::{CancelToken, Captured, Executor};
use crate::invocation::Invocation;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// How often the running process is checked for completion or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the analyzer as a child process.
///
/// The standard output and the standard error of the child process are
/// redirected into the same pipe, so the captured output keeps the order
/// of the messages. The pipe is drained by a helper thread, while the
/// calling thread supervises the child process.
#[derive(Clone, Debug, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&self, invocation: &Invocation, cancel: &CancelToken) -> Result<Captured, ExecutionError> {
        let executable = invocation.executable.as_path();
        let capture_error = |source| ExecutionError::Capture { executable: executable.to_path_buf(), source };

        let (reader, writer) = io::pipe().map_err(capture_error)?;
        let error_writer = writer.try_clone().map_err(capture_error)?;

        let mut child = {
            let mut command = Command::from(invocation);
            command.stdin(Stdio::null()).stdout(writer).stderr(error_writer);
            #[cfg(unix)]
            {
                use std::os::unix::process::CommandExt;
                // The analyzer leads its own process group, which is killed as a whole.
                command.process_group(0);
            }
            command.spawn().map_err(|source| ExecutionError::Spawn {
                executable: executable.to_path_buf(),
                source,
            })?
            // The command is dropped here, with the write ends of the pipe it holds.
            // Otherwise the reader would never see the end of the stream.
        };

        let drain = thread::spawn(move || read_all(reader));

        let status = supervise(&mut child, cancel, executable)?;
        log::debug!("Analyzer process exited: {status:?}");

        let output = drain
            .join()
            .map_err(|_| capture_error(io::Error::other("output reader thread panicked")))?
            .map_err(capture_error)?;

        Ok(Captured { exit_code: status.code(), output })
    }
}

fn read_all(mut reader: io::PipeReader) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    reader.read_to_end(&mut output)?;
    Ok(output)
}

/// Waits for the child process to exit, while watching the cancel token.
///
/// On cancellation the child process and its descendants are killed. The
/// output reader thread is left behind in that case, because a descendant
/// which escaped its process group could keep the pipe open.
fn supervise(child: &mut Child, cancel: &CancelToken, executable: &Path) -> Result<ExitStatus, ExecutionError> {
    loop {
        if cancel.is_cancelled() {
            log::debug!("Cancelled, killing analyzer process group {}", child.id());
            kill_tree(child)
                .map_err(|source| ExecutionError::Kill { executable: executable.to_path_buf(), source })?;
            if let Err(error) = child.wait() {
                log::warn!("Failed to reap analyzer process: {error}");
            }
            return Err(ExecutionError::Cancelled);
        }

        match child.try_wait() {
            Ok(Some(exit_status)) => return Ok(exit_status),
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                return Err(ExecutionError::Wait { executable: executable.to_path_buf(), source });
            }
        }
    }
}

/// Kills the process group of the child, which holds every process the
/// analyzer started. The child is not reaped yet, so its id still names the group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> io::Result<()> {
    let group = libc::pid_t::try_from(child.id()).map_err(io::Error::other)?;
    // SAFETY: killpg takes plain integers and has no memory effects.
    let result = unsafe { libc::killpg(group, libc::SIGKILL) };
    if result == 0 {
        return Ok(());
    }
    let error = io::Error::last_os_error();
    log::debug!("Failed to kill process group {group}: {error}");
    child.kill()
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Errors that can occur during the analyzer execution.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to execute '{executable}': {source}", executable = executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to capture output of '{executable}': {source}", executable = executable.display())]
    Capture {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for process '{executable}': {source}", executable = executable.display())]
    Wait {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to kill process '{executable}': {source}", executable = executable.display())]
    Kill {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Execution was cancelled")]
    Cancelled,
}
