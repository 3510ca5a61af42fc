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

//! Result types for host dispatch.

use owo_colors::OwoColorize;

use crate::error::{SshfanError, INTERRUPTED_EXIT_CODE};

use super::output_mode::should_use_colors;
use super::output_sync::synchronized_eprintln;

/// Exit code recorded when the transport could not be started or the
/// worker task died; mirrors the `ssh` convention for connection failures.
pub const TRANSPORT_FAILURE_EXIT_CODE: i32 = 255;

/// Result of running the command on a single host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub host: String,
    pub exit_code: i32,
    /// True iff `exit_code` is the reserved interrupt code 130.
    pub was_interrupted: bool,
}

impl RunResult {
    pub fn new(host: impl Into<String>, exit_code: i32) -> Self {
        Self {
            host: host.into(),
            exit_code,
            was_interrupted: exit_code == INTERRUPTED_EXIT_CODE,
        }
    }

    pub fn interrupted(host: impl Into<String>) -> Self {
        Self::new(host, INTERRUPTED_EXIT_CODE)
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunOutcome {
    /// Every launched host ran to completion.
    #[default]
    Completed,
    /// An interrupt aborted the run; remaining hosts were not launched.
    Interrupted,
}

/// Everything a dispatch produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Hosts in the order they were launched.
    pub launched: Vec<String>,
    /// One result per launched host, in launch order.
    pub results: Vec<RunResult>,
    /// Command lines printed instead of executed (dry run), in launch order.
    pub emitted: Vec<String>,
    pub outcome: RunOutcome,
}

impl RunReport {
    /// Hosts whose command exited non-zero.
    pub fn failed(&self) -> Vec<&RunResult> {
        self.results.iter().filter(|r| !r.is_success()).collect()
    }

    pub fn is_interrupted(&self) -> bool {
        self.outcome == RunOutcome::Interrupted
    }

    /// Fail with [`SshfanError::Interrupted`] when the run was aborted.
    pub fn ensure_completed(&self) -> Result<(), SshfanError> {
        match self.outcome {
            RunOutcome::Completed => Ok(()),
            RunOutcome::Interrupted => Err(SshfanError::Interrupted),
        }
    }

    /// Process exit code for the whole run.
    ///
    /// Per-host failures are reported, not aggregated into the exit code.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Completed => 0,
            RunOutcome::Interrupted => INTERRUPTED_EXIT_CODE,
        }
    }

    /// Print a one-line failure summary to stderr when any host failed.
    pub fn print_summary(&self) {
        let failed = self.failed();
        if failed.is_empty() {
            return;
        }

        let hosts = failed
            .iter()
            .map(|r| format!("{} ({})", r.host, r.exit_code))
            .collect::<Vec<_>>()
            .join(", ");
        let label = format!("{} of {} hosts failed:", failed.len(), self.results.len());

        let line = if should_use_colors() {
            format!("{} {} {}", "●".red(), label.red().bold(), hosts)
        } else {
            format!("{label} {hosts}")
        };
        if let Err(e) = synchronized_eprintln(&line) {
            tracing::error!("Failed to write run summary: {}", e);
        }
    }
}
