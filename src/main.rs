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

use clap::Parser;
use owo_colors::OwoColorize;

use sshfan::{
    cli::{parse_error_exit_code, Cli},
    error::exit_code_for,
    executor::should_use_colors,
};

mod app;

use app::{dispatcher::dispatch_command, initialization::initialize_app};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = parse_error_exit_code(&e);
            if let Err(print_err) = e.print() {
                eprintln!("sshfan: {print_err}");
            }
            std::process::exit(code);
        }
    };

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if should_use_colors() {
                eprintln!("{} {e:#}", "sshfan:".red().bold());
            } else {
                eprintln!("sshfan: {e:#}");
            }
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let ctx = initialize_app(&cli).await?;
    let report = dispatch_command(ctx).await?;
    report.ensure_completed()?;
    Ok(report.exit_code())
}
