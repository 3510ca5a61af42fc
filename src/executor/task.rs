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

//! Per-host task planning.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::SshfanError;

use super::execution_config::ExecutionConfig;
use super::output_sync::SinkTarget;

/// Remote command used to run a piped script when none is configured.
pub const DEFAULT_SCRIPT_INTERPRETER: &str = "bash -s";

/// What to run on every host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Inline command text.
    Code(String),
    /// Local script piped to the remote interpreter's stdin.
    Script(PathBuf),
}

/// Where the remote process reads its input from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    /// No input; the remote side sees end-of-file.
    None,
    /// A local file.
    File(PathBuf),
    /// The local terminal, through a remote pseudo-terminal.
    Terminal,
}

impl StdinSource {
    /// A pty is requested exactly when the terminal is passed through.
    pub fn wants_pty(&self) -> bool {
        matches!(self, StdinSource::Terminal)
    }
}

/// Everything needed to run the payload on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTask {
    pub host: String,
    pub command: String,
    pub stdin: StdinSource,
    pub stdout: SinkTarget,
    pub stderr: SinkTarget,
}

impl HostTask {
    pub fn plan(
        host: &str,
        payload: &Payload,
        config: &ExecutionConfig,
        script_interpreter: &str,
    ) -> Self {
        let (command, stdin) = match payload {
            Payload::Code(code) => {
                let stdin = if config.interactive {
                    StdinSource::Terminal
                } else {
                    StdinSource::None
                };
                (code.clone(), stdin)
            }
            Payload::Script(path) => (
                script_interpreter.to_string(),
                StdinSource::File(path.clone()),
            ),
        };

        let (stdout, stderr) = if config.output_to_files {
            let (out, err) = output_file_paths(&config.output_dir, host);
            (SinkTarget::File(out), SinkTarget::File(err))
        } else {
            (SinkTarget::Stdout, SinkTarget::Stderr)
        };

        Self {
            host: host.to_string(),
            command,
            stdin,
            stdout,
            stderr,
        }
    }
}

/// `<dir>/<host>.stdout` and `<dir>/<host>.stderr`.
pub fn output_file_paths(dir: &Path, host: &str) -> (PathBuf, PathBuf) {
    let name = output_file_stem(host);
    (
        dir.join(format!("{name}.stdout")),
        dir.join(format!("{name}.stderr")),
    )
}

/// File name stem for a host's output files.
fn output_file_stem(host: &str) -> String {
    host.replace('/', "_")
}

/// Reject hosts whose output files would have the same name, e.g. `x/y`
/// and `x_y`.
pub fn ensure_distinct_output_files(hosts: &[String]) -> Result<(), SshfanError> {
    let mut seen = HashMap::with_capacity(hosts.len());
    for host in hosts {
        if let Some(other) = seen.insert(output_file_stem(host), host.as_str()) {
            return Err(SshfanError::usage(format!(
                "hosts '{other}' and '{host}' would write to the same output files"
            )));
        }
    }
    Ok(())
}

/// Reject a host list that names the same host twice.
///
/// Two tasks for one host would race on the same output files.
pub fn ensure_unique_hosts(hosts: &[String]) -> Result<(), SshfanError> {
    let mut seen = HashSet::with_capacity(hosts.len());
    for host in hosts {
        if !seen.insert(host.as_str()) {
            return Err(SshfanError::usage(format!(
                "host '{host}' is listed more than once"
            )));
        }
    }
    Ok(())
}
