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

//! Output sinks and thread-safe screen writes.
//!
//! Every host writes to the same two screen streams, so each formatted chunk
//! is written and flushed while holding a process-wide lock. Formatters only
//! hand over whole lines in inline mode, which keeps prefixed lines from
//! different hosts from interleaving mid-line.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Global stdout mutex to prevent interleaved output
static STDOUT_MUTEX: Lazy<Mutex<io::Stdout>> = Lazy::new(|| Mutex::new(io::stdout()));

/// Global stderr mutex to prevent interleaved output
static STDERR_MUTEX: Lazy<Mutex<io::Stderr>> = Lazy::new(|| Mutex::new(io::stderr()));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave a half-built value behind
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write and flush one chunk while holding the stream's lock.
///
/// Chunks from different writers never interleave.
fn write_locked<W: Write>(mutex: &Mutex<W>, bytes: &[u8]) -> io::Result<()> {
    let mut writer = lock(mutex);
    writer.write_all(bytes)?;
    writer.flush()
}

/// Screen write from async code.
///
/// Runs on the blocking pool: a stalled terminal must not occupy runtime
/// workers.
async fn write_screen<W>(mutex: &'static Lazy<Mutex<W>>, bytes: &[u8]) -> io::Result<()>
where
    W: Write + Send + 'static,
{
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || write_locked(mutex, &bytes))
        .await
        .map_err(io::Error::other)?
}

/// Thread-safe println! that prevents output interleaving
pub fn synchronized_println(text: &str) -> io::Result<()> {
    let mut stdout = lock(&STDOUT_MUTEX);
    writeln!(stdout, "{text}")?;
    stdout.flush()
}

/// Thread-safe eprintln! that prevents output interleaving
pub fn synchronized_eprintln(text: &str) -> io::Result<()> {
    let mut stderr = lock(&STDERR_MUTEX);
    writeln!(stderr, "{text}")?;
    stderr.flush()
}

/// Write a prompt to stderr without a trailing newline.
pub fn synchronized_eprint(text: &str) -> io::Result<()> {
    let mut stderr = lock(&STDERR_MUTEX);
    write!(stderr, "{text}")?;
    stderr.flush()
}

/// Where one of a host's streams should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// The controlling process's stdout.
    Stdout,
    /// The controlling process's stderr.
    Stderr,
    /// A per-host file, truncated when the host is launched.
    File(PathBuf),
}

/// An opened sink for one stream of one host.
#[derive(Debug)]
pub enum Sink {
    Stdout,
    Stderr,
    File { path: PathBuf, file: fs::File },
}

impl Sink {
    pub async fn open(target: &SinkTarget) -> Result<Self> {
        match target {
            SinkTarget::Stdout => Ok(Sink::Stdout),
            SinkTarget::Stderr => Ok(Sink::Stderr),
            SinkTarget::File(path) => {
                let file = fs::File::create(path)
                    .await
                    .with_context(|| format!("Failed to create output file {}", path.display()))?;
                Ok(Sink::File {
                    path: path.clone(),
                    file,
                })
            }
        }
    }

    /// Write a formatted chunk and flush it so output is visible as it arrives.
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        match self {
            Sink::Stdout => write_screen(&STDOUT_MUTEX, bytes).await,
            Sink::Stderr => write_screen(&STDERR_MUTEX, bytes).await,
            Sink::File { file, .. } => {
                file.write_all(bytes).await?;
                file.flush().await
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Sink::File { path, .. } => Some(path),
            _ => None,
        }
    }
}
