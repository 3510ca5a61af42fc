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

//! Fatal error categories and their process exit codes.

use thiserror::Error;

/// Exit code for command-line usage errors (`EX_DATAERR`).
pub const USAGE_EXIT_CODE: i32 = 65;

/// Exit code for unmet environment preconditions.
pub const ENVIRONMENT_EXIT_CODE: i32 = 1;

/// Exit code reported when the run is aborted by an operator interrupt.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Errors that stop a run before (or instead of) finishing every host.
///
/// Per-host failures are never represented here: a host whose remote command
/// exits non-zero is recorded in the run report and the run carries on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SshfanError {
    /// Bad flags, missing code or hosts, invalid header mode, duplicate hosts.
    #[error("{0}")]
    Usage(String),

    /// A precondition of the environment is not met (e.g. no display).
    #[error("{0}")]
    Environment(String),

    /// The operator interrupted the run.
    #[error("interrupted")]
    Interrupted,
}

impl SshfanError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment(message.into())
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => USAGE_EXIT_CODE,
            Self::Environment(_) => ENVIRONMENT_EXIT_CODE,
            Self::Interrupted => INTERRUPTED_EXIT_CODE,
        }
    }
}

/// Map any error escaping the run to an exit code.
///
/// Typed errors keep their own code; anything else (I/O, config parsing)
/// is treated as an environment failure.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SshfanError>())
        .map(SshfanError::exit_code)
        .unwrap_or(ENVIRONMENT_EXIT_CODE)
}
