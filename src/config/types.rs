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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::executor::{
    ExecutionMode, HeaderMode, DEFAULT_SCRIPT_INTERPRETER,
};

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub transport: TransportSettings,

    #[serde(default)]
    pub terminal: TerminalSettings,
}

/// Defaults for run parameters; command-line flags take precedence.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub mode: Option<ExecutionMode>,
    pub fanout: Option<usize>,
    /// Connect timeout in seconds.
    pub connect_timeout: Option<u64>,
    pub header: Option<HeaderMode>,
    /// Directory for per-host output files. `~` and `${VAR}` are expanded.
    pub output_dir: Option<PathBuf>,
}

/// How the remote-execution transport is invoked.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    /// Program to run, `ssh` or anything accepting the same arguments.
    pub program: String,
    /// Extra arguments placed before the host, e.g. `["-o", "BatchMode=yes"]`.
    pub options: Vec<String>,
    /// Remote command that reads a piped script from stdin.
    pub script_interpreter: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            options: Vec::new(),
            script_interpreter: DEFAULT_SCRIPT_INTERPRETER.to_string(),
        }
    }
}

/// Terminal emulator used in detached-window mode.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TerminalSettings {
    /// An xterm-compatible emulator (`-geometry`, `-title`, `-e`).
    pub program: String,
    /// Window size as `COLSxROWS`; the position is appended per host.
    pub geometry: String,
    /// Keep the window open after the remote command exits.
    pub hold: bool,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            program: "xterm".to_string(),
            geometry: "80x24".to_string(),
            hold: true,
        }
    }
}
