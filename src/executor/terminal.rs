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

//! Detached-window mode: one terminal-emulator window per host.
//!
//! Windows run the transport themselves, so the formatter is not involved.
//! They are cascaded across the display starting at the top-left corner.

use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TerminalSettings;
use crate::error::SshfanError;

use super::output_sync::synchronized_eprintln;
use super::result_types::{RunResult, TRANSPORT_FAILURE_EXIT_CODE};
use super::runner::exit_code_of;
use super::task::{HostTask, StdinSource};
use super::transport::Transport;

/// Resolution assumed when the display cannot be queried.
pub const FALLBACK_RESOLUTION: (u32, u32) = (1024, 768);

const WINDOW_START: u32 = 0;
const WINDOW_DELTA: u32 = 30;
/// Share of the display the window origins may wander over.
const DISPLAY_MARGIN: f64 = 0.6;

/// Queries the display resolution in pixels.
pub trait DisplayProbe {
    fn resolution(&self) -> Option<(u32, u32)>;
}

/// Reads the resolution from `xdpyinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XdpyinfoProbe;

impl DisplayProbe for XdpyinfoProbe {
    fn resolution(&self) -> Option<(u32, u32)> {
        let output = match std::process::Command::new("xdpyinfo")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!("xdpyinfo exited with {}", output.status);
                return None;
            }
            Err(e) => {
                debug!("Failed to run xdpyinfo: {}", e);
                return None;
            }
        };
        parse_xdpyinfo(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extract `WIDTHxHEIGHT` from the `dimensions:` line of `xdpyinfo` output.
pub fn parse_xdpyinfo(output: &str) -> Option<(u32, u32)> {
    let line = output
        .lines()
        .find(|line| line.trim_start().starts_with("dimensions:"))?;
    let dims = line.split_whitespace().nth(1)?;
    let (width, height) = dims.split_once('x')?;
    Some((width.parse().ok()?, height.parse().ok()?))
}

/// Fail unless a display is available for terminal windows.
pub fn require_display() -> Result<(), SshfanError> {
    match std::env::var_os("DISPLAY") {
        Some(display) if !display.is_empty() => Ok(()),
        _ => Err(SshfanError::environment(
            "detached-window mode needs a display, but DISPLAY is not set",
        )),
    }
}

/// Cascading window placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLayout {
    max_x: u32,
    max_y: u32,
}

impl WindowLayout {
    pub fn for_resolution((width, height): (u32, u32)) -> Self {
        let scale = |axis: u32| ((axis as f64 * DISPLAY_MARGIN) as u32).max(1);
        Self {
            max_x: scale(width),
            max_y: scale(height),
        }
    }

    pub fn detect(probe: &dyn DisplayProbe) -> Self {
        let resolution = probe.resolution().unwrap_or_else(|| {
            debug!("Display resolution unknown, assuming {:?}", FALLBACK_RESOLUTION);
            FALLBACK_RESOLUTION
        });
        Self::for_resolution(resolution)
    }

    /// Top-left corner of the window for the `index`-th host.
    pub fn position(&self, index: usize) -> (u32, u32) {
        let offset = u64::from(WINDOW_START) + index as u64 * u64::from(WINDOW_DELTA);
        (
            (offset % u64::from(self.max_x)) as u32,
            (offset % u64::from(self.max_y)) as u32,
        )
    }
}

impl Default for WindowLayout {
    fn default() -> Self {
        Self::for_resolution(FALLBACK_RESOLUTION)
    }
}

#[derive(Debug, Clone)]
pub struct TerminalLauncher {
    settings: TerminalSettings,
    transport: Transport,
    layout: WindowLayout,
}

impl TerminalLauncher {
    pub fn new(settings: TerminalSettings, transport: Transport, layout: WindowLayout) -> Self {
        Self {
            settings,
            transport,
            layout,
        }
    }

    pub fn layout(&self) -> WindowLayout {
        self.layout
    }

    /// Emulator argument vector for the `index`-th host.
    pub fn argv(&self, index: usize, task: &HostTask) -> Vec<String> {
        let (x, y) = self.layout.position(index);
        let mut argv = vec![
            self.settings.program.clone(),
            "-geometry".to_string(),
            format!("{}+{x}+{y}", self.settings.geometry),
            "-title".to_string(),
            task.host.clone(),
        ];
        if self.settings.hold {
            argv.push("-hold".to_string());
        }
        argv.push("-e".to_string());

        match task.stdin {
            // The redirection needs a shell inside the window
            StdinSource::File(_) => {
                argv.push("sh".to_string());
                argv.push("-c".to_string());
                argv.push(self.transport.render(task));
            }
            // The window is the terminal
            StdinSource::None | StdinSource::Terminal => {
                argv.extend(self.transport.argv(&task.host, &task.command, true));
            }
        }
        argv
    }

    pub fn render(&self, index: usize, task: &HostTask) -> String {
        shell_words::join(self.argv(index, task))
    }

    /// Open the window and wait until it is closed or the run is cancelled.
    pub async fn launch(&self, index: usize, task: HostTask, cancel: CancellationToken) -> RunResult {
        let argv = self.argv(index, &task);
        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!(
                    "sshfan: {}: failed to open {}: {e}",
                    task.host, self.settings.program
                );
                if let Err(write_err) = synchronized_eprintln(&message) {
                    debug!("Failed to report error for {}: {}", task.host, write_err);
                }
                return RunResult::new(task.host, TRANSPORT_FAILURE_EXIT_CODE);
            }
        };
        debug!("Opened window for {} (pid {:?})", task.host, child.id());

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => RunResult::new(task.host, exit_code_of(status)),
                Err(e) => {
                    warn!("Failed to wait for window of {}: {}", task.host, e);
                    RunResult::new(task.host, TRANSPORT_FAILURE_EXIT_CODE)
                }
            },
            _ = cancel.cancelled() => {
                debug!("Closing window for {}", task.host);
                if let Err(e) = child.start_kill() {
                    debug!("Window for {} already gone: {}", task.host, e);
                }
                if let Err(e) = child.wait().await {
                    warn!("Failed to reap window for {}: {}", task.host, e);
                }
                RunResult::interrupted(task.host)
            }
        }
    }
}
