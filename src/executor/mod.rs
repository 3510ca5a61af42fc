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

//! Execution engine: dispatches one command to many hosts.

mod execution_config;
mod formatter;
mod output_mode;
mod result_types;
mod scheduler;
mod task;

pub mod interrupt;
pub mod output_sync;
pub mod runner;
pub mod terminal;
pub mod transport;

// Re-export public types
pub use execution_config::{ExecutionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_FANOUT};
pub use formatter::{Bracketing, StreamFormatter};
pub use interrupt::{
    listen_for_signals, ControllerState, Decision, InterruptController, InterruptHandle,
    InterruptPolicy, OperatorConsole, TerminalConsole,
};
pub use output_mode::{
    is_interactive_terminal, is_tty, should_use_colors, ExecutionMode, HeaderMode, HeaderStyle,
};
pub use result_types::{RunOutcome, RunReport, RunResult, TRANSPORT_FAILURE_EXIT_CODE};
pub use runner::RemoteCommandRunner;
pub use scheduler::{Scheduler, Worker};
pub use task::{
    ensure_distinct_output_files, ensure_unique_hosts, output_file_paths, HostTask, Payload,
    StdinSource, DEFAULT_SCRIPT_INTERPRETER,
};
pub use terminal::{TerminalLauncher, WindowLayout, XdpyinfoProbe};
pub use transport::Transport;
