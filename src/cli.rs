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

use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::error::USAGE_EXIT_CODE;
use crate::executor::{ExecutionMode, HeaderMode};

#[derive(Parser, Debug)]
#[command(
    name = "sshfan",
    version,
    about = "Run one command or script on many hosts over ssh",
    long_about = "sshfan sends a single shell command, or a local script piped to the remote shell, to a list of hosts.\nHosts run one at a time (serial) or with bounded concurrency (parallel). Output of every host is\nlabelled on screen, written to per-host files, or shown in one terminal window per host.\nAuthentication and connection settings are left to the ssh client and its configuration.",
    after_help = "EXAMPLES:\n  Parallel uptime:               sshfan -c uptime web1 web2 web3\n  One host at a time:            sshfan -m serial -c 'apt-get -y upgrade' db1 db2\n  Run a local script:            sshfan -s ./deploy.sh app1 app2\n  Per-host output files:         sshfan -o --output-dir logs -c 'dmesg' node1 node2\n  Show what would run:           sshfan -n -c 'df -h' web1 web2\n\nEXIT STATUS:\n  0 finished (host failures are reported, not aggregated), 65 usage error,\n  1 environment error, 130 interrupted"
)]
#[command(group(
    ArgGroup::new("payload")
        .required(true)
        .args(["code", "script"])
))]
pub struct Cli {
    #[arg(short = 'c', long, value_name = "TEXT", help = "Command text to run on every host")]
    pub code: Option<String>,

    #[arg(
        short = 's',
        long,
        value_name = "PATH",
        help = "Local script piped to the remote interpreter's stdin\nThe remote side runs the configured interpreter (default: bash -s)"
    )]
    pub script: Option<PathBuf>,

    #[arg(
        short = 'm',
        long,
        value_enum,
        help = "Execution mode [default: parallel]"
    )]
    pub mode: Option<ExecutionMode>,

    #[arg(short = 'w', long, help = "Open one terminal window per host")]
    pub windows: bool,

    #[arg(
        short = 'i',
        long,
        conflicts_with = "script",
        help = "Pass terminal input through to the remote command (allocates a pty)"
    )]
    pub interactive: bool,

    #[arg(
        short = 'o',
        long,
        help = "Write each host's output to <host>.stdout and <host>.stderr"
    )]
    pub output_to_files: bool,

    #[arg(
        long,
        value_name = "DIR",
        help = "Directory for per-host output files [default: .]"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_name = "N",
        value_parser = parse_fanout,
        help = "Maximum number of hosts running at once in parallel mode [default: 20]"
    )]
    pub fanout: Option<usize>,

    #[arg(
        short = 't',
        long,
        value_name = "SECS",
        help = "Connect timeout passed to ssh [default: 10]"
    )]
    pub connect_timeout: Option<u64>,

    #[arg(
        short = 'H',
        long,
        value_enum,
        value_name = "MODE",
        help = "How hosts are labelled in the output [default: auto]\n  auto      - inline in parallel mode, multiline in serial mode, none with --output-to-files\n  multiline - '=== host ===' above each host's output\n  inline    - 'host: ' in front of every line\n  none      - output as-is"
    )]
    pub header: Option<HeaderMode>,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Print each command line before it runs; repeat to raise the log level (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'n',
        long,
        help = "Print the command line for every host instead of running it"
    )]
    pub dry_run: bool,

    #[arg(
        long,
        value_name = "PATH",
        help = "Configuration file path\nConfig loading priority:\n  1. This flag's value (must exist)\n  2. Current directory (./sshfan.yaml)\n  3. Platform config dir (sshfan/config.yaml, $XDG_CONFIG_HOME on Linux)\n  4. User config (~/.config/sshfan/config.yaml)"
    )]
    pub config: Option<PathBuf>,

    #[arg(value_name = "HOST", required = true, help = "Hosts to run on ([user@]host or ssh config alias)")]
    pub hosts: Vec<String>,
}

fn parse_fanout(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("fanout must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Exit code for a command-line parse failure.
///
/// `--help` and `--version` also surface as errors from clap but are not
/// failures.
pub fn parse_error_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        USAGE_EXIT_CODE
    } else {
        0
    }
}
