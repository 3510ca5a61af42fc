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

//! Execution mode and header mode configuration for multi-host output.
//!
//! The operator picks a [`HeaderMode`]; before any host is processed it is
//! resolved once into a concrete [`HeaderStyle`]:
//! - Auto: inline in parallel mode, multiline in serial mode, none when
//!   output goes to per-host files
//! - Multiline / Inline / None: used as given

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;

/// How hosts are launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One host at a time, in order, with per-host interrupt recovery.
    Serial,
    /// Up to `fanout` hosts at once.
    #[default]
    Parallel,
}

/// Header policy requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    #[default]
    Auto,
    Multiline,
    Inline,
    None,
}

/// Concrete header style applied to every host stream of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    /// Pass-through.
    None,
    /// Every line prefixed with `"<host>: "`.
    Inline,
    /// `"=== <host> ==="` above the output, one blank line below it.
    Multiline,
}

impl HeaderMode {
    /// Resolve the requested mode into the style used for the whole run.
    pub fn resolve(self, mode: ExecutionMode, output_to_files: bool) -> HeaderStyle {
        match self {
            HeaderMode::Multiline => HeaderStyle::Multiline,
            HeaderMode::Inline => HeaderStyle::Inline,
            HeaderMode::None => HeaderStyle::None,
            // Headers are redundant once output is segregated per host
            HeaderMode::Auto if output_to_files => HeaderStyle::None,
            HeaderMode::Auto => match mode {
                ExecutionMode::Parallel => HeaderStyle::Inline,
                ExecutionMode::Serial => HeaderStyle::Multiline,
            },
        }
    }
}

/// Check if stderr is a TTY
///
/// Operator-facing messages (prompts, verbose echo, summaries) go to
/// stderr, so that is the stream whose terminal-ness decides styling.
pub fn is_tty() -> bool {
    std::io::stderr().is_terminal()
}

/// Check whether an operator can be prompted.
///
/// Both the input stream and the error stream must be attached to a
/// terminal; the prompt is written to stderr and the answer read from stdin.
pub fn is_interactive_terminal() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

/// Check if colors should be enabled
///
/// Colors are enabled when:
/// - stderr is a TTY
/// - NO_COLOR environment variable is not set
/// - TERM is not "dumb"
pub fn should_use_colors() -> bool {
    if !is_tty() {
        return false;
    }

    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_resolution() {
        assert_eq!(
            HeaderMode::Auto.resolve(ExecutionMode::Parallel, false),
            HeaderStyle::Inline
        );
        assert_eq!(
            HeaderMode::Auto.resolve(ExecutionMode::Serial, false),
            HeaderStyle::Multiline
        );
    }

    #[test]
    fn test_auto_with_files_is_none() {
        assert_eq!(
            HeaderMode::Auto.resolve(ExecutionMode::Parallel, true),
            HeaderStyle::None
        );
        assert_eq!(
            HeaderMode::Auto.resolve(ExecutionMode::Serial, true),
            HeaderStyle::None
        );
    }

    #[test]
    fn test_explicit_modes_are_kept() {
        for files in [false, true] {
            for mode in [ExecutionMode::Serial, ExecutionMode::Parallel] {
                assert_eq!(HeaderMode::Inline.resolve(mode, files), HeaderStyle::Inline);
                assert_eq!(
                    HeaderMode::Multiline.resolve(mode, files),
                    HeaderStyle::Multiline
                );
                assert_eq!(HeaderMode::None.resolve(mode, files), HeaderStyle::None);
            }
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::Parallel);
        assert_eq!(HeaderMode::default(), HeaderMode::Auto);
    }

    #[test]
    fn test_header_mode_from_yaml() {
        let mode: HeaderMode = serde_yaml::from_str("multiline").unwrap();
        assert_eq!(mode, HeaderMode::Multiline);
        let mode: ExecutionMode = serde_yaml::from_str("serial").unwrap();
        assert_eq!(mode, ExecutionMode::Serial);
        assert!(serde_yaml::from_str::<HeaderMode>("fancy").is_err());
    }
}
