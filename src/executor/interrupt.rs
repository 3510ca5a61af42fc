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

//! Interrupt handling and operator recovery.
//!
//! Interrupt signals are turned into a counter on a `watch` channel so any
//! number of runners and the scheduler can observe them. What an interrupt
//! means depends on the policy:
//! - per host (serial mode): the interrupted host reports exit code 130 and
//!   the operator is asked whether to continue with the remaining hosts
//! - global (parallel and detached-window modes): the whole run is aborted

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::io::{self, BufRead};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::execution_config::ExecutionConfig;
use super::output_mode::{is_interactive_terminal, should_use_colors};
use super::output_sync::synchronized_eprint;
use super::result_types::RunResult;

pub const CONTINUE_PROMPT: &str = "continue with remaining hosts, or abort? [y/n] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptPolicy {
    /// Ask the operator after each interrupted host.
    PerHost,
    /// Any interrupt aborts the whole run.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    InterruptPending,
    Aborting,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Abort,
}

/// Where the continue/abort question is asked.
pub trait OperatorConsole: Send {
    /// Whether both the input and the error stream reach a human.
    fn is_interactive(&self) -> bool;

    /// Show `prompt` and read one answer. `None` means end of input.
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Prompts on stderr and reads the answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsole;

impl OperatorConsole for TerminalConsole {
    fn is_interactive(&self) -> bool {
        is_interactive_terminal()
    }

    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        if should_use_colors() {
            synchronized_eprint(&prompt.yellow().bold().to_string())?;
        } else {
            synchronized_eprint(prompt)?;
        }

        let mut answer = String::new();
        let read = io::stdin().lock().read_line(&mut answer)?;
        Ok((read > 0).then_some(answer))
    }
}

/// Shared interrupt counter.
///
/// Cloning is cheap; every clone triggers and observes the same counter.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Record one interrupt.
    pub fn trigger(&self) {
        self.tx.send_modify(|count| *count += 1);
    }

    /// A receiver that sees interrupts raised from now on.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Interrupts raised so far.
    pub fn count(&self) -> u64 {
        *self.tx.borrow()
    }
}

/// Resolve when the next interrupt is raised.
///
/// Never resolves once every handle has been dropped.
pub async fn wait_for_interrupt(rx: &mut watch::Receiver<u64>) {
    if rx.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Forward SIGINT (and SIGTERM on unix) to `handle` until the runtime stops.
pub fn listen_for_signals(handle: InterruptHandle) -> Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to set up SIGTERM handler")?;

    Ok(tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            let received = tokio::select! {
                r = signal::ctrl_c() => r.map(|_| "SIGINT"),
                Some(()) = sigterm.recv() => Ok("SIGTERM"),
            };
            #[cfg(not(unix))]
            let received = signal::ctrl_c().await.map(|_| "Ctrl+C");

            match received {
                Ok(name) => {
                    info!("Received {} signal", name);
                    handle.trigger();
                }
                Err(e) => {
                    warn!("Stopped listening for interrupts: {}", e);
                    break;
                }
            }
        }
    }))
}

/// Decides what an interrupt means for the rest of the run.
pub struct InterruptController {
    policy: InterruptPolicy,
    state: ControllerState,
    console: Box<dyn OperatorConsole>,
}

impl std::fmt::Debug for InterruptController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptController")
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl InterruptController {
    pub fn new(policy: InterruptPolicy, console: Box<dyn OperatorConsole>) -> Self {
        Self {
            policy,
            state: ControllerState::Running,
            console,
        }
    }

    pub fn for_config(config: &ExecutionConfig, console: Box<dyn OperatorConsole>) -> Self {
        let policy = if config.per_host_interrupts() {
            InterruptPolicy::PerHost
        } else {
            InterruptPolicy::Global
        };
        Self::new(policy, console)
    }

    pub fn policy(&self) -> InterruptPolicy {
        self.policy
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Look at a finished host's result (per-host policy).
    ///
    /// Under the global policy an exit code of 130 is an ordinary failure.
    pub fn on_result(&mut self, result: &RunResult) -> Decision {
        if self.policy == InterruptPolicy::Global || !result.was_interrupted {
            return Decision::Continue;
        }

        self.state = ControllerState::InterruptPending;
        let decision = self.ask_operator(&result.host);
        self.state = match decision {
            Decision::Continue => ControllerState::Running,
            Decision::Abort => ControllerState::Aborting,
        };
        decision
    }

    /// An interrupt signal reached the controlling process.
    ///
    /// Under the per-host policy the signal reaches the running host and
    /// surfaces through its exit code, so nothing is decided here.
    pub fn on_signal(&mut self) -> Decision {
        match self.policy {
            InterruptPolicy::PerHost => Decision::Continue,
            InterruptPolicy::Global => {
                self.state = ControllerState::Aborting;
                Decision::Abort
            }
        }
    }

    /// Mark the run as finished unless it is being aborted.
    pub fn finish(&mut self) {
        if self.state != ControllerState::Aborting {
            self.state = ControllerState::Done;
        }
    }

    // Blocking read: no other host runs while the operator is asked.
    fn ask_operator(&mut self, host: &str) -> Decision {
        if !self.console.is_interactive() {
            warn!("{} was interrupted and no terminal is attached, aborting", host);
            return Decision::Abort;
        }

        let prompt = format!("sshfan: {host} interrupted; {CONTINUE_PROMPT}");
        loop {
            match self.console.ask(&prompt) {
                Ok(Some(answer)) => match answer.trim_start().chars().next() {
                    Some('y' | 'Y') => return Decision::Continue,
                    Some('n' | 'N') => return Decision::Abort,
                    _ => continue,
                },
                Ok(None) => return Decision::Abort,
                Err(e) => {
                    warn!("Failed to read answer from terminal: {}", e);
                    return Decision::Abort;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        interactive: bool,
        answers: VecDeque<Option<String>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(interactive: bool, answers: &[Option<&str>]) -> (Self, Arc<Mutex<Vec<String>>>) {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            let console = Self {
                interactive,
                answers: answers.iter().map(|a| a.map(str::to_string)).collect(),
                prompts: Arc::clone(&prompts),
            };
            (console, prompts)
        }
    }

    impl OperatorConsole for Scripted {
        fn is_interactive(&self) -> bool {
            self.interactive
        }

        fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answers.pop_front().flatten())
        }
    }

    fn controller(interactive: bool, answers: &[Option<&str>]) -> (InterruptController, Arc<Mutex<Vec<String>>>) {
        let (console, prompts) = Scripted::new(interactive, answers);
        (
            InterruptController::new(InterruptPolicy::PerHost, Box::new(console)),
            prompts,
        )
    }

    #[test]
    fn test_non_interrupted_result_continues_without_prompt() {
        let (mut ctl, prompts) = controller(true, &[]);
        assert_eq!(ctl.on_result(&RunResult::new("a", 1)), Decision::Continue);
        assert_eq!(ctl.state(), ControllerState::Running);
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_non_interactive_aborts_immediately() {
        let (mut ctl, prompts) = controller(false, &[Some("y\n")]);
        assert_eq!(ctl.on_result(&RunResult::interrupted("a")), Decision::Abort);
        assert_eq!(ctl.state(), ControllerState::Aborting);
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_yes_continues() {
        let (mut ctl, prompts) = controller(true, &[Some("Yes please\n")]);
        assert_eq!(ctl.on_result(&RunResult::interrupted("a")), Decision::Continue);
        assert_eq!(ctl.state(), ControllerState::Running);
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(CONTINUE_PROMPT));
        assert!(prompts[0].contains("a interrupted"));
    }

    #[test]
    fn test_no_aborts() {
        let (mut ctl, _) = controller(true, &[Some("n\n")]);
        assert_eq!(ctl.on_result(&RunResult::interrupted("a")), Decision::Abort);
        ctl.finish();
        assert_eq!(ctl.state(), ControllerState::Aborting);
    }

    #[test]
    fn test_other_answers_reprompt() {
        let (mut ctl, prompts) = controller(true, &[Some("\n"), Some("maybe\n"), Some("N\n")]);
        assert_eq!(ctl.on_result(&RunResult::interrupted("a")), Decision::Abort);
        assert_eq!(prompts.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_end_of_input_aborts() {
        let (mut ctl, _) = controller(true, &[None]);
        assert_eq!(ctl.on_result(&RunResult::interrupted("a")), Decision::Abort);
    }

    #[test]
    fn test_global_policy() {
        let (console, prompts) = Scripted::new(true, &[]);
        let mut ctl = InterruptController::new(InterruptPolicy::Global, Box::new(console));
        // 130 is an ordinary failure here
        assert_eq!(ctl.on_result(&RunResult::interrupted("a")), Decision::Continue);
        assert!(prompts.lock().unwrap().is_empty());

        assert_eq!(ctl.on_signal(), Decision::Abort);
        assert_eq!(ctl.state(), ControllerState::Aborting);
    }

    #[test]
    fn test_per_host_policy_ignores_signal() {
        let (mut ctl, _) = controller(true, &[]);
        assert_eq!(ctl.on_signal(), Decision::Continue);
        ctl.finish();
        assert_eq!(ctl.state(), ControllerState::Done);
    }

    #[test]
    fn test_policy_from_config() {
        use crate::executor::output_mode::ExecutionMode;

        let serial = ExecutionConfig {
            mode: ExecutionMode::Serial,
            ..Default::default()
        };
        let ctl = InterruptController::for_config(&serial, Box::new(TerminalConsole));
        assert_eq!(ctl.policy(), InterruptPolicy::PerHost);

        let ctl = InterruptController::for_config(&ExecutionConfig::default(), Box::new(TerminalConsole));
        assert_eq!(ctl.policy(), InterruptPolicy::Global);
    }

    #[tokio::test]
    async fn test_interrupt_handle_wakes_subscribers() {
        let handle = InterruptHandle::new();
        let mut rx = handle.subscribe();
        let waiter = tokio::spawn(async move {
            wait_for_interrupt(&mut rx).await;
        });
        handle.trigger();
        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("subscriber was not woken")
            .unwrap();
        assert_eq!(handle.count(), 1);
    }
}
