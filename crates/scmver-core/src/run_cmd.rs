use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::overrides;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Turn a non-zero exit into a `VcsCommandError::Failed`.
    pub fn require_success(self, program: &str) -> Result<Self, VcsCommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(VcsCommandError::Failed {
                program: program.to_owned(),
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

/// Failure of an external VCS invocation.
#[derive(Debug, thiserror::Error)]
pub enum VcsCommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {timeout_secs}s and was killed")]
    Timeout { program: String, timeout_secs: u64 },
    #[error("{program} exited with code {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },
}

/// Execute a program with the active override context's timeout.
///
/// The command is an explicit argv vector, never shell-interpreted. Both
/// streams are captured, decoded lossily, and stripped of trailing newlines.
/// A non-zero exit is returned in `RunOutput`, not treated as an error.
pub fn run_command(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
) -> Result<RunOutput, VcsCommandError> {
    run_command_with_timeout(program, args, envs, cwd, overrides::subprocess_timeout())
}

/// `run_command` with an explicit soft timeout. On expiry the child is
/// killed and a `Timeout` error is returned.
pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
    timeout: Duration,
) -> Result<RunOutput, VcsCommandError> {
    debug!(program, ?args, cwd = %cwd.display(), "running command");
    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in envs {
        command.env(key, value);
    }
    command.current_dir(cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    // The child leads its own process group so a timeout can take down any
    // grandchildren it forked, not just the immediate process.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|source| VcsCommandError::Spawn {
        program: program.to_owned(),
        source,
    })?;

    // Streams are drained on their own threads so a chatty child cannot
    // deadlock against a full pipe while we wait on it.
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    kill_process_group(&mut child);
                    return Err(VcsCommandError::Timeout {
                        program: program.to_owned(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                return Err(VcsCommandError::Io {
                    program: program.to_owned(),
                    source,
                })
            }
        }
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);
    let output = RunOutput {
        code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    };
    debug!(code = output.code, "command finished");
    Ok(output)
}

fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    // SAFETY: plain syscall; the pid names the group the child was spawned
    // into, and a stale pid at worst returns ESRCH.
    unsafe {
        libc::kill(-(child.id() as libc::pid_t), libc::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: Option<R>,
) -> Option<thread::JoinHandle<Vec<u8>>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    let bytes = handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes)
        .trim_end_matches(['\n', '\r'])
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[cfg(unix)]
    #[test]
    fn captures_output_and_exit_code() {
        let output = run_command(
            "/bin/sh",
            &[
                "-c".to_string(),
                "printf 'out\\n' && printf err >&2; exit 7".to_string(),
            ],
            &[],
            Path::new("."),
        )
        .unwrap();
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_child() {
        let err = run_command_with_timeout(
            "/bin/sh",
            &["-c".to_string(), "sleep 30".to_string()],
            &[],
            Path::new("."),
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert!(matches!(err, VcsCommandError::Timeout { .. }));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_command(
            "definitely-not-a-real-binary",
            &[],
            &[],
            Path::new("."),
        )
        .unwrap_err();
        assert!(matches!(err, VcsCommandError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn require_success_reports_stderr() {
        let output = run_command(
            "/bin/sh",
            &["-c".to_string(), "echo broken >&2; exit 1".to_string()],
            &[],
            Path::new("."),
        )
        .unwrap();
        let err = output.require_success("sh").unwrap_err();
        assert!(matches!(err, VcsCommandError::Failed { code: 1, .. }));
    }
}
