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

//! Shared helpers for integration tests: a fake `ssh` and a scripted console.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sshfan::executor::{OperatorConsole, Transport};
use tempfile::TempDir;

/// A stand-in for `ssh` that runs the command locally.
///
/// It skips `ssh`-style options, logs `start <host>` / `end <host>` to a
/// shared log file and runs the command with `sh -c`. The target host is
/// exported as `SSHFAN_FAKE_HOST` so commands can behave per host.
pub struct FakeTransport {
    dir: TempDir,
    program: PathBuf,
    log: PathBuf,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Variant that `exec`s the command, so killing the transport kills
    /// the command too. No `end` marker is logged.
    pub fn exec() -> Self {
        Self::build(true)
    }

    fn build(exec: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let program = dir.path().join("fake-ssh");
        let log = dir.path().join("transport.log");

        let run = if exec {
            "exec sh -c \"$1\"".to_string()
        } else {
            format!(
                "sh -c \"$1\"\nstatus=$?\necho \"end $host\" >> '{log}'\nexit $status",
                log = log.display()
            )
        };
        let script = format!(
            r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -o) shift 2 ;;
    -t|-T) shift ;;
    *) break ;;
  esac
done
host="$1"
shift
SSHFAN_FAKE_HOST="$host"
export SSHFAN_FAKE_HOST
echo "start $host" >> '{log}'
{run}
"#,
            log = log.display()
        );

        std::fs::write(&program, script).expect("write fake transport");
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake transport");

        Self { dir, program, log }
    }

    /// A stand-in for `xterm` that logs `start <title>` to the shared log
    /// and stays open until killed.
    pub fn terminal(&self) -> PathBuf {
        let program = self.dir.path().join("fake-xterm");
        let script = format!(
            r#"#!/bin/sh
title=""
while [ $# -gt 0 ]; do
  case "$1" in
    -title) title="$2"; shift 2 ;;
    -e) break ;;
    *) shift ;;
  esac
done
echo "start $title" >> '{log}'
exec sleep 30
"#,
            log = self.log.display()
        );
        std::fs::write(&program, script).expect("write fake terminal");
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake terminal");
        program
    }

    pub fn transport(&self) -> Transport {
        Transport::new(self.program.to_string_lossy(), 5)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// A scratch directory next to the fake transport.
    pub fn scratch(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path).expect("create scratch dir");
        path
    }

    pub fn log_exists(&self) -> bool {
        self.log.exists()
    }

    pub fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Hosts in the order their transport started.
    pub fn started(&self) -> Vec<String> {
        self.log_lines()
            .iter()
            .filter_map(|line| line.strip_prefix("start ").map(str::to_string))
            .collect()
    }

    /// Highest number of hosts running at the same time.
    pub fn max_concurrency(&self) -> usize {
        let mut active = 0usize;
        let mut max = 0usize;
        for line in self.log_lines() {
            if line.starts_with("start ") {
                active += 1;
                max = max.max(active);
            } else if line.starts_with("end ") {
                active = active.saturating_sub(1);
            }
        }
        max
    }

    /// Poll until `count` hosts have started.
    pub async fn wait_for_starts(&self, count: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.started().len() < count {
            assert!(
                Instant::now() < deadline,
                "only {:?} started within {:?}",
                self.started(),
                timeout
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// An operator console with canned answers.
pub struct ScriptedConsole {
    interactive: bool,
    answers: VecDeque<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConsole {
    pub fn new(interactive: bool, answers: &[&str]) -> Self {
        Self {
            interactive,
            answers: answers.iter().map(|a| a.to_string()).collect(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Prompts shown so far; stays readable after the console is boxed.
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

impl OperatorConsole for ScriptedConsole {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answers.pop_front())
    }
}

pub fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
