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

//! Host dispatch: serial, bounded-parallel and dry-run.

use anyhow::{Context, Result};
use futures::future::join_all;
use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SshfanError;

use super::execution_config::ExecutionConfig;
use super::interrupt::{wait_for_interrupt, Decision, InterruptController, InterruptHandle};
use super::output_mode::{should_use_colors, ExecutionMode};
use super::output_sync::{synchronized_eprintln, synchronized_println};
use super::result_types::{RunOutcome, RunReport, RunResult, TRANSPORT_FAILURE_EXIT_CODE};
use super::runner::{RemoteCommandRunner, RunControl};
use super::task::{
    ensure_distinct_output_files, ensure_unique_hosts, HostTask, Payload,
    DEFAULT_SCRIPT_INTERPRETER,
};
use super::terminal::TerminalLauncher;

/// What runs a host: the transport with formatted output, or a window.
#[derive(Debug, Clone)]
pub enum Worker {
    Remote(RemoteCommandRunner),
    Window(TerminalLauncher),
}

impl Worker {
    /// The command line this worker would execute for a host.
    pub fn render(&self, index: usize, task: &HostTask) -> String {
        match self {
            Worker::Remote(runner) => runner.transport().render(task),
            Worker::Window(launcher) => launcher.render(index, task),
        }
    }

    async fn run(&self, index: usize, task: HostTask, control: RunControl) -> RunResult {
        match self {
            Worker::Remote(runner) => runner.run(task, control).await,
            Worker::Window(launcher) => launcher.launch(index, task, control.cancel).await,
        }
    }
}

pub struct Scheduler {
    config: ExecutionConfig,
    worker: Arc<Worker>,
    payload: Payload,
    script_interpreter: String,
    interrupts: InterruptHandle,
}

impl Scheduler {
    pub fn new(
        config: ExecutionConfig,
        worker: Worker,
        payload: Payload,
        interrupts: InterruptHandle,
    ) -> Self {
        Self {
            config,
            worker: Arc::new(worker),
            payload,
            script_interpreter: DEFAULT_SCRIPT_INTERPRETER.to_string(),
            interrupts,
        }
    }

    /// Remote command that reads a piped script from stdin.
    pub fn with_script_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.script_interpreter = interpreter.into();
        self
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// One task per host, in input order.
    pub fn plan(&self, hosts: &[String]) -> Vec<HostTask> {
        hosts
            .iter()
            .map(|host| HostTask::plan(host, &self.payload, &self.config, &self.script_interpreter))
            .collect()
    }

    /// Dispatch the payload to every host.
    ///
    /// Returns once every launched host has finished, or once the run has
    /// been aborted and every launched host has been terminated.
    pub async fn run(
        &self,
        hosts: &[String],
        controller: &mut InterruptController,
    ) -> Result<RunReport> {
        if hosts.is_empty() {
            return Err(SshfanError::usage("at least one host is required").into());
        }
        ensure_unique_hosts(hosts)?;
        if self.config.output_to_files {
            ensure_distinct_output_files(hosts)?;
        }
        self.config.validate()?;

        let tasks = self.plan(hosts);
        if self.config.dry_run {
            return self.dry_run(tasks);
        }

        if self.config.output_to_files {
            tokio::fs::create_dir_all(&self.config.output_dir)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create output directory {}",
                        self.config.output_dir.display()
                    )
                })?;
        }

        info!(
            "Running on {} hosts ({:?}, fanout {})",
            tasks.len(),
            self.config.mode,
            self.config.fanout
        );
        let report = match self.config.mode {
            ExecutionMode::Serial => self.run_serial(tasks, controller).await,
            ExecutionMode::Parallel => self.run_parallel(tasks, controller).await?,
        };
        controller.finish();
        Ok(report)
    }

    fn dry_run(&self, tasks: Vec<HostTask>) -> Result<RunReport> {
        let mut report = RunReport::default();
        for (index, task) in tasks.iter().enumerate() {
            let line = self.worker.render(index, task);
            synchronized_println(&line).context("Failed to write command line")?;
            report.launched.push(task.host.clone());
            report.emitted.push(line);
        }
        Ok(report)
    }

    async fn run_serial(
        &self,
        tasks: Vec<HostTask>,
        controller: &mut InterruptController,
    ) -> RunReport {
        let mut report = RunReport::default();
        let cancel = CancellationToken::new();
        let mut interrupts = self.interrupts.subscribe();
        let per_host = self.config.per_host_interrupts();

        for (index, task) in tasks.into_iter().enumerate() {
            if interrupts.has_changed().unwrap_or(false) {
                if !per_host {
                    controller.on_signal();
                    report.outcome = RunOutcome::Interrupted;
                    break;
                }
                // No host was running to receive it
                let count = *interrupts.borrow_and_update();
                info!(
                    "Interrupt received while no host was running (total {}), launching {}",
                    count, task.host
                );
            }

            self.announce(index, &task);
            report.launched.push(task.host.clone());

            let control = RunControl::new(cancel.child_token());
            let result = if per_host {
                let control = control.forwarding_interrupts(self.interrupts.subscribe());
                let result = self.worker.run(index, task, control).await;
                // Interrupts raised during the run were forwarded to the host
                let _ = interrupts.borrow_and_update();
                result
            } else {
                self.run_until_interrupted(index, task, control, &mut interrupts, &cancel, controller)
                    .await
            };
            debug!("{} finished with {}", result.host, result.exit_code);

            let aborted = cancel.is_cancelled() || controller.on_result(&result) == Decision::Abort;
            report.results.push(result);
            if aborted {
                report.outcome = RunOutcome::Interrupted;
                break;
            }
        }

        report
    }

    async fn run_until_interrupted(
        &self,
        index: usize,
        task: HostTask,
        control: RunControl,
        interrupts: &mut watch::Receiver<u64>,
        cancel: &CancellationToken,
        controller: &mut InterruptController,
    ) -> RunResult {
        let run = self.worker.run(index, task, control);
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => result,
            _ = wait_for_interrupt(interrupts) => {
                controller.on_signal();
                cancel.cancel();
                run.await
            }
        }
    }

    async fn run_parallel(
        &self,
        tasks: Vec<HostTask>,
        controller: &mut InterruptController,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();
        let semaphore = Arc::new(Semaphore::new(self.config.fanout));
        let cancel = CancellationToken::new();
        let mut interrupts = self.interrupts.subscribe();
        let mut interrupted = false;
        let mut handles = Vec::with_capacity(tasks.len());

        for (index, task) in tasks.into_iter().enumerate() {
            // Launch order is input order: the permit is taken before spawning
            let permit = tokio::select! {
                biased;
                _ = wait_for_interrupt(&mut interrupts) => None,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    Some(permit.context("Concurrency budget closed unexpectedly")?)
                }
            };
            let Some(permit) = permit else {
                interrupted = true;
                break;
            };

            self.announce(index, &task);
            report.launched.push(task.host.clone());

            let worker = Arc::clone(&self.worker);
            let control = RunControl::new(cancel.child_token());
            handles.push(tokio::spawn(async move {
                let result = worker.run(index, task, control).await;
                drop(permit);
                result
            }));
        }

        if interrupted {
            controller.on_signal();
            cancel.cancel();
        }

        let barrier = join_all(handles);
        tokio::pin!(barrier);
        let joined = if interrupted {
            barrier.await
        } else {
            tokio::select! {
                joined = &mut barrier => joined,
                _ = wait_for_interrupt(&mut interrupts) => {
                    interrupted = true;
                    controller.on_signal();
                    cancel.cancel();
                    barrier.await
                }
            }
        };

        report.results = collect_results(&report.launched, joined);
        if interrupted {
            report.outcome = RunOutcome::Interrupted;
        }
        Ok(report)
    }

    /// Verbose echo of the command line before a host is launched.
    fn announce(&self, index: usize, task: &HostTask) {
        if !self.config.verbose {
            return;
        }
        let line = self.worker.render(index, task);
        let text = if should_use_colors() {
            format!("{} {} {}", "▶".cyan(), task.host.bold(), line.dimmed())
        } else {
            format!("> {} {}", task.host, line)
        };
        if let Err(e) = synchronized_eprintln(&text) {
            debug!("Failed to echo command line: {}", e);
        }
    }
}

fn collect_results(
    hosts: &[String],
    joined: Vec<Result<RunResult, JoinError>>,
) -> Vec<RunResult> {
    hosts
        .iter()
        .zip(joined)
        .map(|(host, result)| match result {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Task failed for host {}: {}", host, e);
                RunResult::new(host.clone(), TRANSPORT_FAILURE_EXIT_CODE)
            }
        })
        .collect()
}
