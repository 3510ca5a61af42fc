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

//! Validation of host identifiers given on the command line.

use crate::error::SshfanError;

/// Longest accepted identifier: a DNS name plus a user part.
const MAX_HOST_LENGTH: usize = 253 + 1 + 64;

/// Check that a host identifier can be handed to the transport as-is.
///
/// Identifiers are otherwise opaque (`host`, `user@host`, an ssh config
/// alias, a bracketed IPv6 address). They must not look like an option and
/// must stay a single shell word.
pub fn validate_host(host: &str) -> Result<(), SshfanError> {
    if host.is_empty() {
        return Err(SshfanError::usage("empty host name"));
    }
    if host.len() > MAX_HOST_LENGTH {
        return Err(SshfanError::usage(format!(
            "host name too long: {} bytes (max: {MAX_HOST_LENGTH} bytes)",
            host.len()
        )));
    }
    if host.starts_with('-') {
        return Err(SshfanError::usage(format!(
            "host '{host}' looks like an option"
        )));
    }
    if host.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SshfanError::usage(format!(
            "host '{}' contains whitespace or control characters",
            host.escape_debug()
        )));
    }
    Ok(())
}

/// Validate every host, stopping at the first bad one.
pub fn validate_hosts(hosts: &[String]) -> Result<(), SshfanError> {
    hosts.iter().try_for_each(|host| validate_host(host))
}
