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

//! Application initialization and configuration loading

use anyhow::Result;
use sshfan::{
    cli::Cli,
    config::Config,
    error::SshfanError,
    executor::{
        ensure_distinct_output_files, ensure_unique_hosts, terminal::require_display,
        ExecutionConfig, Payload, DEFAULT_CONNECT_TIMEOUT, DEFAULT_FANOUT,
    },
    utils::{init_logging, validate_hosts},
};
use std::path::PathBuf;

/// Application context after initialization
pub struct AppContext {
    pub config: Config,
    pub execution: ExecutionConfig,
    pub payload: Payload,
    pub hosts: Vec<String>,
}

/// Validate the command line, load configuration and check preconditions.
///
/// Nothing is launched here: every usage or environment error surfaces
/// before the first host is processed.
pub async fn initialize_app(cli: &Cli) -> Result<AppContext> {
    init_logging(cli.verbose);

    validate_hosts(&cli.hosts)?;
    ensure_unique_hosts(&cli.hosts)?;

    let config = Config::load_with_priority(cli.config.as_deref()).await?;
    let execution = resolve_execution_config(cli, &config);
    execution.validate()?;
    if execution.output_to_files {
        ensure_distinct_output_files(&cli.hosts)?;
    }

    let payload = resolve_payload(cli)?;

    if execution.detached_windows && !execution.dry_run {
        require_display()?;
    }

    tracing::debug!("Resolved execution config: {:?}", execution);
    Ok(AppContext {
        config,
        execution,
        payload,
        hosts: cli.hosts.clone(),
    })
}

/// Merge CLI flags over configuration defaults over built-in defaults.
pub fn resolve_execution_config(cli: &Cli, config: &Config) -> ExecutionConfig {
    let defaults = &config.defaults;
    ExecutionConfig {
        mode: cli.mode.or(defaults.mode).unwrap_or_default(),
        fanout: cli.fanout.or(defaults.fanout).unwrap_or(DEFAULT_FANOUT),
        connect_timeout: cli
            .connect_timeout
            .or(defaults.connect_timeout)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        header_mode: cli.header.or(defaults.header).unwrap_or_default(),
        interactive: cli.interactive,
        output_to_files: cli.output_to_files,
        output_dir: cli
            .output_dir
            .clone()
            .or_else(|| defaults.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        verbose: cli.verbose > 0,
        dry_run: cli.dry_run,
        detached_windows: cli.windows,
    }
}

/// The command text or script to send, checked for usability.
pub fn resolve_payload(cli: &Cli) -> Result<Payload> {
    match (&cli.code, &cli.script) {
        (Some(code), None) => {
            if code.trim().is_empty() {
                return Err(SshfanError::usage("the command text is empty").into());
            }
            Ok(Payload::Code(code.clone()))
        }
        (None, Some(script)) => {
            if let Err(e) = std::fs::File::open(script) {
                return Err(SshfanError::environment(format!(
                    "cannot read script {}: {e}",
                    script.display()
                ))
                .into());
            }
            Ok(Payload::Script(script.clone()))
        }
        _ => Err(SshfanError::usage("exactly one of --code or --script is required").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use sshfan::config::Defaults;
    use sshfan::error::exit_code_for;
    use sshfan::executor::{ExecutionMode, HeaderMode, HeaderStyle};

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sshfan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_builtin_defaults() {
        let execution = resolve_execution_config(&cli(&["-c", "x", "a"]), &Config::default());
        assert_eq!(execution, ExecutionConfig::default());
        assert_eq!(execution.header_style(), HeaderStyle::Inline);
    }

    #[test]
    fn test_config_defaults_apply() {
        let config = Config {
            defaults: Defaults {
                mode: Some(ExecutionMode::Serial),
                fanout: Some(3),
                connect_timeout: Some(1),
                header: Some(HeaderMode::None),
                output_dir: Some(PathBuf::from("/tmp/out")),
            },
            ..Config::default()
        };
        let execution = resolve_execution_config(&cli(&["-c", "x", "a"]), &config);
        assert_eq!(execution.mode, ExecutionMode::Serial);
        assert_eq!(execution.fanout, 3);
        assert_eq!(execution.connect_timeout, 1);
        assert_eq!(execution.header_mode, HeaderMode::None);
        assert_eq!(execution.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = Config {
            defaults: Defaults {
                mode: Some(ExecutionMode::Serial),
                fanout: Some(3),
                ..Defaults::default()
            },
            ..Config::default()
        };
        let execution = resolve_execution_config(
            &cli(&["-c", "x", "-m", "parallel", "-f", "8", "-v", "a"]),
            &config,
        );
        assert_eq!(execution.mode, ExecutionMode::Parallel);
        assert_eq!(execution.fanout, 8);
        assert!(execution.verbose);
    }

    #[test]
    fn test_empty_code_is_usage_error() {
        let err = resolve_payload(&cli(&["-c", "  ", "a"])).unwrap_err();
        assert_eq!(exit_code_for(&err), 65);
    }

    #[test]
    fn test_unreadable_script_is_environment_error() {
        let err = resolve_payload(&cli(&["-s", "/nonexistent/run.sh", "a"])).unwrap_err();
        assert_eq!(exit_code_for(&err), 1);
    }

    #[test]
    fn test_readable_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        std::fs::write(&script, "echo hi\n").unwrap();

        let payload = resolve_payload(&cli(&["-s", script.to_str().unwrap(), "a"])).unwrap();
        assert_eq!(payload, Payload::Script(script));
    }
}
