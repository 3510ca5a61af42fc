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

//! Per-stream output formatting.
//!
//! Each host stream (stdout or stderr) gets its own [`StreamFormatter`]. The
//! formatter is a pure byte transformer: the caller feeds raw chunks with
//! [`StreamFormatter::push`] and writes whatever comes back to the sink, then
//! calls [`StreamFormatter::finish`] once the stream is closed.

use super::output_mode::HeaderStyle;

/// When the multiline header is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracketing {
    /// Header and trailer even when the stream carries no data.
    Eager,
    /// Header only in front of the first byte of data.
    Lazy,
}

/// Formats one stream of one host according to the run's header style.
#[derive(Debug)]
pub struct StreamFormatter {
    host: String,
    style: HeaderStyle,
    bracketing: Bracketing,
    /// Inline mode: bytes of a line whose newline has not arrived yet.
    pending: Vec<u8>,
    opened: bool,
    at_line_start: bool,
    finished: bool,
}

impl StreamFormatter {
    pub fn new(host: impl Into<String>, style: HeaderStyle) -> Self {
        Self {
            host: host.into(),
            style,
            bracketing: Bracketing::Eager,
            pending: Vec::new(),
            opened: false,
            at_line_start: true,
            finished: false,
        }
    }

    pub fn with_bracketing(mut self, bracketing: Bracketing) -> Self {
        self.bracketing = bracketing;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn style(&self) -> HeaderStyle {
        self.style
    }

    /// Output to write before any data is read.
    pub fn begin(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        if self.style == HeaderStyle::Multiline && self.bracketing == Bracketing::Eager {
            self.open(&mut out);
        }
        out
    }

    /// Format a chunk of raw stream data.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        if chunk.is_empty() || self.finished {
            return Vec::new();
        }

        match self.style {
            HeaderStyle::None => chunk.to_vec(),
            HeaderStyle::Multiline => {
                let mut out = Vec::with_capacity(chunk.len() + self.host.len() + 9);
                self.open(&mut out);
                out.extend_from_slice(chunk);
                self.at_line_start = chunk.ends_with(b"\n");
                out
            }
            HeaderStyle::Inline => {
                self.pending.extend_from_slice(chunk);
                let mut out = Vec::new();
                while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = self.pending.drain(..=pos).collect();
                    self.write_prefix(&mut out);
                    out.extend_from_slice(&line);
                }
                out
            }
        }
    }

    /// Output to write once the stream is closed. Idempotent.
    pub fn finish(&mut self) -> Vec<u8> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut out = Vec::new();
        match self.style {
            HeaderStyle::None => {}
            HeaderStyle::Inline => {
                if !self.pending.is_empty() {
                    let rest = std::mem::take(&mut self.pending);
                    self.write_prefix(&mut out);
                    out.extend_from_slice(&rest);
                    out.push(b'\n');
                }
            }
            HeaderStyle::Multiline => {
                if self.opened {
                    if !self.at_line_start {
                        out.push(b'\n');
                    }
                    out.push(b'\n');
                }
            }
        }
        out
    }

    fn open(&mut self, out: &mut Vec<u8>) {
        if !self.opened {
            out.extend_from_slice(format!("=== {} ===\n", self.host).as_bytes());
            self.opened = true;
            self.at_line_start = true;
        }
    }

    fn write_prefix(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.host.as_bytes());
        out.extend_from_slice(b": ");
    }
}
