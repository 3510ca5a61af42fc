// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runs one host's command through the transport.
//!
//! The runner owns the host's plumbing: it binds stdin, spawns the transport,
//! and drains stdout and stderr in two independent tasks, each with its own
//! formatter and sink. Output is written as it arrives, so whatever a host
//! printed before being interrupted is already on screen or on disk.

use anyhow::{Context, Result};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::INTERRUPTED_EXIT_CODE;

use super::formatter::{Bracketing, StreamFormatter};
use super::interrupt::wait_for_interrupt;
use super::output_mode::HeaderStyle;
use super::output_sync::{synchronized_eprintln, Sink};
use super::result_types::{RunResult, TRANSPORT_FAILURE_EXIT_CODE};
use super::task::{HostTask, StdinSource};
use super::transport::Transport;

const READ_CHUNK_SIZE: usize = 8192;

/// How long a killed host's pipes may take to reach end-of-file.
///
/// Grandchildren of the transport can keep a pipe open after it dies.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

type PumpHandle = JoinHandle<(StreamFormatter, Sink)>;

/// Per-run hooks the scheduler hands to a runner.
#[derive(Debug, Clone)]
pub struct RunControl {
    /// Cancelled when the whole run is aborted.
    pub cancel: CancellationToken,
    /// When set, each interrupt is forwarded to the transport as SIGINT.
    pub interrupts: Option<watch::Receiver<u64>>,
}

impl RunControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            interrupts: None,
        }
    }

    pub fn forwarding_interrupts(mut self, interrupts: watch::Receiver<u64>) -> Self {
        self.interrupts = Some(interrupts);
        self
    }
}

enum Exit {
    /// The transport exited on its own. `interrupted` is set when an
    /// interrupt was forwarded to it while it ran.
    Status {
        status: ExitStatus,
        interrupted: bool,
    },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RemoteCommandRunner {
    transport: Transport,
    style: HeaderStyle,
}

impl RemoteCommandRunner {
    pub fn new(transport: Transport, style: HeaderStyle) -> Self {
        Self { transport, style }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Run the task to completion (or cancellation).
    ///
    /// Never fails: problems that prevent the command from running are
    /// reported on screen and recorded as a transport failure for the host.
    pub async fn run(&self, task: HostTask, control: RunControl) -> RunResult {
        let host = task.host.clone();
        match self.try_run(task, control).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Failed to run command on {}: {:#}", host, e);
                if let Err(write_err) = synchronized_eprintln(&format!("sshfan: {host}: {e:#}")) {
                    debug!("Failed to report error for {}: {}", host, write_err);
                }
                RunResult::new(host, TRANSPORT_FAILURE_EXIT_CODE)
            }
        }
    }

    async fn try_run(&self, task: HostTask, mut control: RunControl) -> Result<RunResult> {
        let stdout_sink = Sink::open(&task.stdout).await?;
        let stderr_sink = Sink::open(&task.stderr).await?;
        let stdout_fmt = StreamFormatter::new(&task.host, self.style);
        let stderr_fmt =
            StreamFormatter::new(&task.host, self.style).with_bracketing(Bracketing::Lazy);

        let mut command = self.transport.command(&task);
        command.stdin(open_stdin(&task.stdin)?);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let note = format!(
                    "sshfan: {}: failed to start {}: {e}\n",
                    task.host,
                    self.transport.program()
                );
                finish_stream(stdout_fmt, stdout_sink, None).await;
                finish_stream(stderr_fmt, stderr_sink, Some(&note)).await;
                return Ok(RunResult::new(task.host, TRANSPORT_FAILURE_EXIT_CODE));
            }
        };
        debug!(
            "Started transport for {} (pid {:?})",
            task.host,
            child.id()
        );

        let stdout = child
            .stdout
            .take()
            .context("transport stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("transport stderr was not captured")?;
        let stdout_pump: PumpHandle = tokio::spawn(pump(stdout, stdout_fmt, stdout_sink));
        let stderr_pump: PumpHandle = tokio::spawn(pump(stderr, stderr_fmt, stderr_sink));

        let exit = supervise(&mut child, &task.host, &mut control).await?;
        let (exit_code, grace) = match exit {
            Exit::Status {
                status,
                interrupted,
            } => (reported_exit_code(status, interrupted), None),
            Exit::Cancelled => (INTERRUPTED_EXIT_CODE, Some(DRAIN_GRACE)),
        };

        if let Some((formatter, sink)) = collect(stdout_pump, grace, &task.host).await {
            finish_stream(formatter, sink, None).await;
        }
        if let Some((formatter, sink)) = collect(stderr_pump, grace, &task.host).await {
            let note = (exit_code != 0 && grace.is_none()).then(|| {
                format!("sshfan: {}: exited with status {exit_code}\n", task.host)
            });
            finish_stream(formatter, sink, note.as_deref()).await;
        }

        debug!("Command on {} finished with {}", task.host, exit_code);
        Ok(RunResult::new(task.host, exit_code))
    }
}

/// Exit code recorded for a transport that exited on its own.
///
/// `ssh` catches SIGINT and exits 255, so a failure after a forwarded
/// interrupt counts as the interrupt.
fn reported_exit_code(status: ExitStatus, interrupted: bool) -> i32 {
    let code = exit_code_of(status);
    if interrupted && code != 0 {
        if code != INTERRUPTED_EXIT_CODE {
            debug!("Transport exited with {} after an interrupt", code);
        }
        INTERRUPTED_EXIT_CODE
    } else {
        code
    }
}

/// Translate a process status into a shell-style exit code.
///
/// A process killed by signal N reports `128 + N`, so an interrupted
/// transport surfaces as 130.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    TRANSPORT_FAILURE_EXIT_CODE
}

fn open_stdin(source: &StdinSource) -> Result<Stdio> {
    Ok(match source {
        StdinSource::None => Stdio::null(),
        StdinSource::Terminal => Stdio::inherit(),
        StdinSource::File(path) => Stdio::from(
            std::fs::File::open(path)
                .with_context(|| format!("Failed to open script {}", path.display()))?,
        ),
    })
}

async fn supervise(child: &mut Child, host: &str, control: &mut RunControl) -> Result<Exit> {
    let mut interrupted = false;
    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.with_context(|| format!("Failed to wait for transport of {host}"))?;
                return Ok(Exit::Status { status, interrupted });
            }
            _ = control.cancel.cancelled() => {
                debug!("Terminating transport for {}", host);
                if let Err(e) = child.start_kill() {
                    debug!("Transport for {} already gone: {}", host, e);
                }
                if let Err(e) = child.wait().await {
                    warn!("Failed to reap transport for {}: {}", host, e);
                }
                return Ok(Exit::Cancelled);
            }
            _ = next_interrupt(&mut control.interrupts) => {
                interrupted = true;
                forward_interrupt(child, host);
            }
        }
    }
}

async fn next_interrupt(interrupts: &mut Option<watch::Receiver<u64>>) {
    match interrupts {
        Some(rx) => wait_for_interrupt(rx).await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn forward_interrupt(child: &Child, host: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        debug!("Forwarding SIGINT to transport for {} (pid {})", host, pid);
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
            debug!("Failed to forward SIGINT to {}: {}", host, e);
        }
    }
}

#[cfg(not(unix))]
fn forward_interrupt(_child: &Child, host: &str) {
    debug!("Interrupt forwarding unsupported on this platform ({})", host);
}

async fn pump<R>(mut reader: R, mut formatter: StreamFormatter, mut sink: Sink) -> (StreamFormatter, Sink)
where
    R: AsyncRead + Unpin,
{
    let opening = formatter.begin();
    write_or_log(&mut sink, &opening, formatter.host()).await;

    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let out = formatter.push(&buf[..n]);
                write_or_log(&mut sink, &out, formatter.host()).await;
            }
            Err(e) => {
                warn!("Failed to read output from {}: {}", formatter.host(), e);
                break;
            }
        }
    }

    (formatter, sink)
}

async fn collect(
    mut pump: PumpHandle,
    grace: Option<Duration>,
    host: &str,
) -> Option<(StreamFormatter, Sink)> {
    let joined = match grace {
        Some(grace) => match tokio::time::timeout(grace, &mut pump).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!("Output of {} still open after termination, dropping it", host);
                pump.abort();
                return None;
            }
        },
        None => pump.await,
    };

    match joined {
        Ok(parts) => Some(parts),
        Err(e) => {
            warn!("Output task for {} failed: {}", host, e);
            None
        }
    }
}

async fn finish_stream(mut formatter: StreamFormatter, mut sink: Sink, note: Option<&str>) {
    let mut out = formatter.begin();
    if let Some(note) = note {
        out.extend(formatter.push(note.as_bytes()));
    }
    out.extend(formatter.finish());
    write_or_log(&mut sink, &out, formatter.host()).await;
}

async fn write_or_log(sink: &mut Sink, bytes: &[u8], host: &str) {
    if let Err(e) = sink.write(bytes).await {
        warn!("Failed to write output of {}: {}", host, e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_exit_code_of_normal_exit() {
        assert_eq!(exit_code_of(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code_of(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[test]
    fn test_exit_code_of_signal() {
        // SIGINT
        assert_eq!(exit_code_of(ExitStatus::from_raw(2)), 130);
        // SIGKILL
        assert_eq!(exit_code_of(ExitStatus::from_raw(9)), 137);
    }

    #[test]
    fn test_failure_after_interrupt_is_reported_as_interrupt() {
        // ssh's own exit code after catching SIGINT
        assert_eq!(reported_exit_code(ExitStatus::from_raw(255 << 8), true), 130);
        assert_eq!(reported_exit_code(ExitStatus::from_raw(2), true), 130);
        assert_eq!(reported_exit_code(ExitStatus::from_raw(255 << 8), false), 255);
        // Finished cleanly despite the interrupt
        assert_eq!(reported_exit_code(ExitStatus::from_raw(0), true), 0);
    }

    #[test]
    fn test_open_stdin_missing_script() {
        let err = open_stdin(&StdinSource::File("/nonexistent/script.sh".into())).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to open script"));
    }
}
