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

use tracing_subscriber::EnvFilter;

/// Create an environment filter based on verbosity level
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // RUST_LOG wins so dependencies can be traced too
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(verbosity_directive(verbosity))
    }
}

fn verbosity_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "sshfan=warn",
        1 => "sshfan=info",
        2 => "sshfan=debug",
        _ => "sshfan=trace",
    }
}

/// Initialize logging to stderr.
///
/// Stdout carries host output, so log records never go there.
pub fn init_logging(verbosity: u8) {
    let filter = create_env_filter(verbosity);

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("sshfan: logging already initialized: {e}");
    }
}
