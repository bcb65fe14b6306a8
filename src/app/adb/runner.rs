use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::app::error::CommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one bridge invocation to completion or timeout.
///
/// Implementations never treat a nonzero exit code as an error.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, CommandError>;
}

/// Spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, CommandError> {
        run_command_with_timeout(program, args, timeout, trace_id)
    }
}

/// Reads `reader` to EOF on a helper thread; the buffer arrives on the returned receiver.
///
/// A descendant of the child can inherit the pipe and keep it open after the child exits, so
/// callers wait on the receiver with a deadline instead of joining the thread.
fn drain_pipe<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        let _ = tx.send(buffer);
    });
    rx
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, CommandError> {
    debug!(trace_id = %trace_id, program = %program, args = ?args, "spawning command");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| CommandError::Launch {
            program: program.to_string(),
            message: err.to_string(),
        })?;

    // Drain stdout/stderr in parallel; otherwise, a chatty child process can block once the pipe
    // buffer fills, and we will incorrectly hit the timeout.
    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => (stdout, stderr),
        _ => {
            kill_and_reap(&mut child);
            return Err(CommandError::Io {
                program: program.to_string(),
                message: "failed to capture stdout/stderr".to_string(),
            });
        }
    };
    let stdout_rx = drain_pipe(stdout);
    let stderr_rx = drain_pipe(stderr);

    let start = Instant::now();
    let deadline = start + timeout;
    let timed_out = || CommandError::Timeout {
        program: program.to_string(),
        timeout,
    };

    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if Instant::now() >= deadline {
                    // Reader threads are left to finish on their own once the pipes close.
                    kill_and_reap(&mut child);
                    warn!(trace_id = %trace_id, program = %program, timeout_ms = timeout.as_millis() as u64, "command timed out");
                    return Err(timed_out());
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                kill_and_reap(&mut child);
                return Err(CommandError::Io {
                    program: program.to_string(),
                    message: format!("failed to poll command: {err}"),
                });
            }
        }
    };

    // The child is gone, but a process it left behind may still hold the pipes open.
    let remaining = || deadline.saturating_duration_since(Instant::now());
    let stdout_bytes = match stdout_rx.recv_timeout(remaining()) {
        Ok(bytes) => bytes,
        Err(RecvTimeoutError::Disconnected) => Vec::new(),
        Err(RecvTimeoutError::Timeout) => {
            warn!(trace_id = %trace_id, program = %program, "stdout still open after exit");
            return Err(timed_out());
        }
    };
    let stderr_bytes = match stderr_rx.recv_timeout(remaining()) {
        Ok(bytes) => bytes,
        Err(RecvTimeoutError::Disconnected) => Vec::new(),
        Err(RecvTimeoutError::Timeout) => {
            warn!(trace_id = %trace_id, program = %program, "stderr still open after exit");
            return Err(timed_out());
        }
    };
    debug!(
        trace_id = %trace_id,
        exit_code = ?exit_code,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "command finished"
    );

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub program: String,
        pub args: Vec<String>,
        pub timeout: Duration,
    }

    type Responder = dyn Fn(&[String]) -> Result<CommandOutput, CommandError> + Send + Sync;

    /// Answers every invocation through a closure and records what was asked.
    pub struct ScriptedRunner {
        responder: Box<Responder>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedRunner {
        pub fn new(
            responder: impl Fn(&[String]) -> Result<CommandOutput, CommandError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(exit_code: i32, stdout: &str, stderr: &str) -> Self {
            let output = output(exit_code, stdout, stderr);
            Self::new(move |_args| Ok(output.clone()))
        }

        pub fn failing(error: CommandError) -> Self {
            Self::new(move |_args| Err(error.clone()))
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(
            &self,
            program: &str,
            args: &[String],
            timeout: Duration,
            _trace_id: &str,
        ) -> Result<CommandOutput, CommandError> {
            self.calls.lock().expect("calls lock").push(RecordedCall {
                program: program.to_string(),
                args: args.to_vec(),
                timeout,
            });
            (self.responder)(args)
        }
    }

    pub fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(exit_code),
        }
    }
}
