// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 gsrx contributors
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

//! Error types for the emulator core
//!
//! The core emulates hardware that has no concept of host-level failure:
//! stalls, reserved opcodes and malformed GIFtags are all *hardware behavior*
//! and are reproduced in place, never raised as errors. The variants here
//! cover the few places where the host genuinely must refuse to proceed —
//! almost exclusively save-state loading and configuration parsing.

use thiserror::Error;

/// Top-level error type for all fallible core operations
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// Save state was produced by a newer build than this one
    #[error("save state version {found} is newer than supported version {supported}")]
    SaveStateVersion {
        /// Version number found in the state stream
        found: u32,
        /// Newest version this build can load
        supported: u32,
    },

    /// Save state stream could not be decoded
    #[error("save state is corrupt: {0}")]
    SaveStateCorrupt(String),

    /// Save state could not be encoded
    #[error("failed to encode save state: {0}")]
    SaveStateEncode(String),

    /// Configuration file could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error while reading/writing host files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the core
pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_savestate_version_display() {
        let err = EmulatorError::SaveStateVersion {
            found: 9,
            supported: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EmulatorError = io.into();
        assert!(matches!(err, EmulatorError::Io(_)));
    }
}
