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

//! Resolved run parameters consumed read-only by the executor.

use std::path::PathBuf;

use crate::error::SshfanError;

use super::output_mode::{ExecutionMode, HeaderMode, HeaderStyle};

pub const DEFAULT_FANOUT: usize = 20;
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Run parameters, already merged from CLI flags and the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Maximum concurrently active hosts in parallel mode.
    pub fanout: usize,
    /// Transport connect timeout in seconds.
    pub connect_timeout: u64,
    pub header_mode: HeaderMode,
    /// Pass the local terminal through to the remote process (allocates a pty).
    pub interactive: bool,
    pub output_to_files: bool,
    /// Directory that receives `<host>.stdout` / `<host>.stderr`.
    pub output_dir: PathBuf,
    pub verbose: bool,
    pub dry_run: bool,
    pub detached_windows: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            fanout: DEFAULT_FANOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            header_mode: HeaderMode::default(),
            interactive: false,
            output_to_files: false,
            output_dir: PathBuf::from("."),
            verbose: false,
            dry_run: false,
            detached_windows: false,
        }
    }
}

impl ExecutionConfig {
    /// The header style for the whole run.
    pub fn header_style(&self) -> HeaderStyle {
        self.header_mode.resolve(self.mode, self.output_to_files)
    }

    /// Whether interrupts are handled per host (serial, formatted output)
    /// or globally (parallel and detached-window modes).
    pub fn per_host_interrupts(&self) -> bool {
        self.mode == ExecutionMode::Serial && !self.detached_windows
    }

    pub fn validate(&self) -> Result<(), SshfanError> {
        if self.fanout == 0 {
            return Err(SshfanError::usage("fanout must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.mode, ExecutionMode::Parallel);
        assert_eq!(config.fanout, 20);
        assert_eq!(config.connect_timeout, 10);
        assert_eq!(config.header_style(), HeaderStyle::Inline);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_fanout_is_usage_error() {
        let config = ExecutionConfig {
            fanout: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().exit_code(), 65);
    }

    #[test]
    fn test_interrupt_policy_by_mode() {
        let serial = ExecutionConfig {
            mode: ExecutionMode::Serial,
            ..Default::default()
        };
        assert!(serial.per_host_interrupts());

        let serial_windows = ExecutionConfig {
            detached_windows: true,
            ..serial.clone()
        };
        assert!(!serial_windows.per_host_interrupts());
        assert!(!ExecutionConfig::default().per_host_interrupts());
    }
}
