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

//! Builds the execution engine from the application context and runs it

use anyhow::Result;
use sshfan::executor::{
    listen_for_signals, InterruptController, InterruptHandle, RemoteCommandRunner, RunReport,
    Scheduler, TerminalConsole, TerminalLauncher, Transport, WindowLayout, Worker, XdpyinfoProbe,
};

use super::initialization::AppContext;

/// Run the payload on every host and print the failure summary.
pub async fn dispatch_command(ctx: AppContext) -> Result<RunReport> {
    let AppContext {
        config,
        execution,
        payload,
        hosts,
    } = ctx;

    let transport = Transport::from_settings(&config.transport, execution.connect_timeout);
    let worker = if execution.detached_windows {
        let layout = WindowLayout::detect(&XdpyinfoProbe);
        tracing::debug!("Window layout: {:?}", layout);
        Worker::Window(TerminalLauncher::new(config.terminal.clone(), transport, layout))
    } else {
        Worker::Remote(RemoteCommandRunner::new(transport, execution.header_style()))
    };

    // Dry runs spawn nothing, so there is nothing to interrupt
    let interrupts = InterruptHandle::new();
    let listener = if execution.dry_run {
        None
    } else {
        Some(listen_for_signals(interrupts.clone())?)
    };

    let mut controller = InterruptController::for_config(&execution, Box::new(TerminalConsole));
    let scheduler = Scheduler::new(execution, worker, payload, interrupts)
        .with_script_interpreter(config.transport.script_interpreter.clone());

    let report = scheduler.run(&hosts, &mut controller).await;
    if let Some(listener) = listener {
        listener.abort();
    }

    let report = report?;
    report.print_summary();
    tracing::debug!(
        "Run finished: {} launched, {} failed, {:?}",
        report.launched.len(),
        report.failed().len(),
        report.outcome
    );
    Ok(report)
}
