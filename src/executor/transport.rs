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

//! Command lines for the remote-execution transport.
//!
//! The transport is an external `ssh`-compatible client. Authentication,
//! host keys and connection reuse are entirely its business; this module
//! only decides the argument vector for one host.

use std::process::Stdio;
use tokio::process::Command;

use crate::config::TransportSettings;

use super::task::{HostTask, StdinSource};

pub const DEFAULT_TRANSPORT_PROGRAM: &str = "ssh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    program: String,
    /// Extra arguments placed after the generated options and before the host.
    options: Vec<String>,
    connect_timeout: u64,
}

impl Transport {
    pub fn new(program: impl Into<String>, connect_timeout: u64) -> Self {
        Self {
            program: program.into(),
            options: Vec::new(),
            connect_timeout,
        }
    }

    pub fn from_settings(settings: &TransportSettings, connect_timeout: u64) -> Self {
        Self::new(settings.program.clone(), connect_timeout).with_options(settings.options.clone())
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    /// Arguments passed to the transport program.
    ///
    /// The generated options come first: `ssh` keeps the first value it sees
    /// for an option, so the command-line timeout wins over user options.
    pub fn args(&self, host: &str, command: &str, pty: bool) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
            if pty { "-t" } else { "-T" }.to_string(),
        ];
        args.extend(self.options.iter().cloned());
        args.push(host.to_string());
        args.push(command.to_string());
        args
    }

    /// Full argument vector including the program.
    pub fn argv(&self, host: &str, command: &str, pty: bool) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.options.len() + 6);
        argv.push(self.program.clone());
        argv.extend(self.args(host, command, pty));
        argv
    }

    /// The command line for a task, shell-quoted for display.
    ///
    /// A file stdin is rendered as a redirection so the line can be pasted
    /// into a shell as-is.
    pub fn render(&self, task: &HostTask) -> String {
        let line = shell_words::join(self.argv(&task.host, &task.command, task.stdin.wants_pty()));
        match &task.stdin {
            StdinSource::File(path) => {
                format!(
                    "{line} < {}",
                    shell_words::quote(&path.to_string_lossy())
                )
            }
            _ => line,
        }
    }

    /// A process builder for a task, with both output streams piped.
    ///
    /// The caller binds stdin.
    pub fn command(&self, task: &HostTask) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(&task.host, &task.command, task.stdin.wants_pty()))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(
            DEFAULT_TRANSPORT_PROGRAM,
            super::execution_config::DEFAULT_CONNECT_TIMEOUT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::output_sync::SinkTarget;
    use std::path::PathBuf;

    fn task(stdin: StdinSource) -> HostTask {
        HostTask {
            host: "web1".to_string(),
            command: "echo hi".to_string(),
            stdin,
            stdout: SinkTarget::Stdout,
            stderr: SinkTarget::Stderr,
        }
    }

    #[test]
    fn test_args_without_pty() {
        let transport = Transport::new("ssh", 5);
        assert_eq!(
            transport.args("web1", "uptime", false),
            vec!["-o", "ConnectTimeout=5", "-T", "web1", "uptime"]
        );
    }

    #[test]
    fn test_args_with_pty_and_options() {
        let transport = Transport::new("ssh", 0)
            .with_options(vec!["-o".into(), "BatchMode=yes".into()]);
        assert_eq!(
            transport.args("web1", "top", true),
            vec!["-o", "ConnectTimeout=0", "-t", "-o", "BatchMode=yes", "web1", "top"]
        );
    }

    #[test]
    fn test_render_quotes_command() {
        let transport = Transport::new("ssh", 10);
        let line = transport.render(&task(StdinSource::None));
        assert!(line.starts_with("ssh "));
        assert!(line.ends_with(" web1 'echo hi'"));
        assert_eq!(
            shell_words::split(&line).unwrap(),
            transport.argv("web1", "echo hi", false)
        );
    }

    #[test]
    fn test_render_script_redirect() {
        let transport = Transport::new("ssh", 10);
        let mut t = task(StdinSource::File(PathBuf::from("/tmp/my script.sh")));
        t.command = "bash -s".to_string();
        let line = transport.render(&t);
        assert!(line.ends_with(" < '/tmp/my script.sh'"));

        let mut expected = transport.argv("web1", "bash -s", false);
        expected.push("<".to_string());
        expected.push("/tmp/my script.sh".to_string());
        assert_eq!(shell_words::split(&line).unwrap(), expected);
    }

    #[test]
    fn test_render_interactive_requests_pty() {
        let transport = Transport::new("ssh", 10);
        let line = transport.render(&task(StdinSource::Terminal));
        assert!(shell_words::split(&line).unwrap().contains(&"-t".to_string()));
    }

    #[test]
    fn test_default_transport() {
        let transport = Transport::default();
        assert_eq!(transport.program(), "ssh");
        assert_eq!(transport.connect_timeout(), 10);
    }
}
