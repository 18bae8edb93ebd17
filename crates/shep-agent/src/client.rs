// client.rs — Single-shot agent execution over line-delimited JSON.
//
// Per invocation: spawn the configured command, send one request line,
// wait for one response line under the task deadline, terminate the
// process, drain stderr. The bounded read runs on a helper thread that
// owns the child's stdout and hands back at most one line over a channel;
// if the deadline elapses the thread is abandoned and its resources are
// released when the killed process closes its stdout.
//
// Termination ladder: polite signal, 2-second grace, force kill, another
// 2-second wait.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::error::AgentError;

const TERMINATE_GRACE: Duration = Duration::from_secs(2);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The agent's parsed response plus whatever it wrote to stderr.
#[derive(Debug)]
pub struct AgentResponse {
    pub payload: Value,
    pub stderr: String,
}

/// Executes a single task by spawning the configured agent command.
pub struct AgentClient {
    command: String,
    task_timeout: Duration,
}

impl AgentClient {
    /// Build a client. The command must be non-empty and the startup
    /// timeout non-negative; there is no readiness handshake beyond
    /// process liveness, so the startup timeout is validated and nothing
    /// more.
    pub fn new(
        command: &str,
        startup_timeout_seconds: i64,
        task_timeout_seconds: i64,
    ) -> Result<Self, AgentError> {
        if command.trim().is_empty() {
            return Err(AgentError::Process(
                "agent command must be a non-empty string".to_string(),
            ));
        }
        if startup_timeout_seconds < 0 {
            return Err(AgentError::Process(
                "startup_timeout_seconds must be non-negative".to_string(),
            ));
        }
        Ok(AgentClient {
            command: command.to_string(),
            task_timeout: Duration::from_secs(task_timeout_seconds.max(0) as u64),
        })
    }

    /// Run one task. The payload must be a JSON object; the subprocess is
    /// always terminated before this returns, on every path.
    pub fn run_task(&self, payload: &Value) -> Result<AgentResponse, AgentError> {
        if !payload.is_object() {
            return Err(AgentError::Protocol(
                "task payload must be a JSON object".to_string(),
            ));
        }

        let argv = shlex::split(&self.command).ok_or_else(|| {
            AgentError::Process(format!("agent command is not parseable: {}", self.command))
        })?;
        if argv.is_empty() {
            return Err(AgentError::Process(
                "agent command must be a non-empty string".to_string(),
            ));
        }

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| AgentError::Process(format!("failed to start agent command: {err}")))?;
        debug!(command = %self.command, pid = child.id(), "agent spawned");

        let exchange = self.exchange(&mut child, payload);
        terminate(&mut child);
        let stderr = drain_stderr(&mut child);

        let line = exchange?;
        let payload = parse_response(&line)?;
        Ok(AgentResponse { payload, stderr })
    }

    /// Send the request line and wait for at most one response line.
    fn exchange(&self, child: &mut Child, payload: &Value) -> Result<String, AgentError> {
        let startup_exit = child
            .try_wait()
            .map_err(|err| AgentError::Process(format!("failed to poll agent process: {err}")))?;
        if startup_exit.is_some() {
            return Err(AgentError::Process(
                "agent process exited during startup".to_string(),
            ));
        }

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Process("agent stdin is not available".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Process("agent stdout is not available".to_string()))?;

        let request = serde_json::to_string(payload)
            .map_err(|err| AgentError::Protocol(format!("task payload is not serializable: {err}")))?;
        writeln!(stdin, "{request}")
            .and_then(|()| stdin.flush())
            .map_err(|err| AgentError::Process(format!("failed to send task to agent: {err}")))?;

        let (line_tx, line_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            let read = reader.read_line(&mut line).map(|bytes| (bytes, line));
            // The receiver may be gone already after a timeout.
            let _ = line_tx.send(read);
        });

        match line_rx.recv_timeout(self.task_timeout) {
            Ok(Ok((0, _))) => Err(AgentError::Process(
                "agent process exited before sending a response".to_string(),
            )),
            Ok(Ok((_, line))) => Ok(line),
            Ok(Err(err)) => Err(AgentError::Process(format!(
                "failed to read agent response: {err}"
            ))),
            Err(_) => Err(AgentError::Timeout(
                "Timed out waiting for agent response.".to_string(),
            )),
        }
    }
}

fn parse_response(line: &str) -> Result<Value, AgentError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(AgentError::Protocol("agent response was empty".to_string()));
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|err| AgentError::Protocol(format!("agent response is not valid JSON: {err}")))?;
    if !value.is_object() {
        return Err(AgentError::Protocol(
            "agent response must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Polite signal, grace period, then force kill with another wait.
fn terminate(child: &mut Child) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    request_exit(child);
    if wait_with_deadline(child, TERMINATE_GRACE).is_none() {
        let _ = child.kill();
        let _ = wait_with_deadline(child, TERMINATE_GRACE);
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    // SAFETY: delivers SIGTERM to the child's pid; no memory is touched.
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.kill();
}

fn wait_with_deadline(child: &mut Child, deadline: Duration) -> Option<ExitStatus> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(_) => return None,
        }
        if started.elapsed() >= deadline {
            return None;
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn drain_stderr(child: &mut Child) -> String {
    let mut buffer = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buffer);
    }
    buffer
}
