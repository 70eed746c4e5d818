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

//! Emulator configuration
//!
//! A small key/value surface consumed once at session construction — never
//! polled per cycle. Most of these are game-compatibility hacks whose exact
//! values matter for specific titles; they are plumbed through to the
//! subsystems that consume them at reset time.

use serde::Deserialize;

use super::error::{EmulatorError, Result};

/// Mipmap emulation mode for the renderer backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MipmapMode {
    /// Let the backend decide
    #[default]
    Automatic,
    /// Never sample mipmaps
    Off,
    /// Use the guest-provided MIPTBP chain
    Full,
}

/// Dithering mode forwarded to the renderer backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DitherMode {
    Off,
    /// Apply the DIMX matrix as the hardware would
    #[default]
    Scaled,
    Unscaled,
}

/// Emulator configuration, read once at relevant subsystem construction
///
/// Parsed from TOML. Every field has a default so an empty document is a
/// valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmuConfig {
    /// Flush pending primitives when a draw reads the buffer it writes
    /// (read-after-write hazard avoidance for self-referential passes)
    pub auto_flush: bool,

    /// Mask oversized UV coordinates (the "wild arms" hack)
    pub wild_hack: bool,

    /// CRC hack aggressiveness forwarded to the backend (0 = none)
    pub crc_hack_level: u8,

    /// Internal resolution multiplier for the backend
    pub upscale_multiplier: u32,

    /// Anisotropic filtering level (0 = off)
    pub anisotropy: u8,

    /// Mipmap emulation mode
    pub mipmap: MipmapMode,

    /// Dithering mode
    pub dithering: DitherMode,

    /// Run VU1 on a worker thread
    pub mtvu: bool,

    /// Scale factor for the VU1 cycle-stealing debit against the EE.
    /// The mechanism is load-bearing; the factor is a tunable.
    pub ee_cycle_skip: f32,
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self {
            auto_flush: true,
            wild_hack: false,
            crc_hack_level: 0,
            upscale_multiplier: 1,
            anisotropy: 0,
            mipmap: MipmapMode::default(),
            dithering: DitherMode::default(),
            mtvu: false,
            ee_cycle_skip: 1.0,
        }
    }
}

impl EmuConfig {
    /// Parse a configuration from a TOML document
    ///
    /// Unknown keys are rejected so typos surface immediately instead of
    /// silently falling back to defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use gsrx::core::config::EmuConfig;
    ///
    /// let cfg = EmuConfig::from_toml("mtvu = true\nupscale_multiplier = 2").unwrap();
    /// assert!(cfg.mtvu);
    /// assert_eq!(cfg.upscale_multiplier, 2);
    /// ```
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| EmulatorError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = EmuConfig::default();
        assert!(cfg.auto_flush);
        assert!(!cfg.mtvu);
        assert_eq!(cfg.upscale_multiplier, 1);
        assert_eq!(cfg.crc_hack_level, 0);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let cfg = EmuConfig::from_toml("").unwrap();
        assert_eq!(cfg.upscale_multiplier, EmuConfig::default().upscale_multiplier);
        assert_eq!(cfg.mtvu, EmuConfig::default().mtvu);
    }

    #[test]
    fn test_partial_toml() {
        let cfg = EmuConfig::from_toml("mipmap = \"full\"\ndithering = \"off\"").unwrap();
        assert_eq!(cfg.mipmap, MipmapMode::Full);
        assert_eq!(cfg.dithering, DitherMode::Off);
        // Untouched fields keep defaults
        assert!(cfg.auto_flush);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(EmuConfig::from_toml("mtvu = \"maybe\"").is_err());
        assert!(EmuConfig::from_toml("no_such_key = 3").is_err());
    }
}
