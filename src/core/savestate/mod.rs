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

//! Save-state serialization
//!
//! A state stream is a little-endian version word followed by a bincode
//! body holding every subsystem in fixed order. The version is read and
//! checked before any decoding so a stream from a newer build is rejected
//! cleanly instead of failing mid-decode. The MTVU bridge is captured only
//! at quiescence (its ring drained), so its frozen form is just the
//! cursors and pending-event cells.

use serde::{Deserialize, Serialize};

use super::counters::Counters;
use super::error::{EmulatorError, Result};
use super::gif::GifUnit;
use super::gs::Gs;
use super::intc::Intc;
use super::mtvu::MtvuFreeze;
use super::vif::Vif;
use super::vu::VuMem;

/// Newest stream version this build reads and the version it writes
pub const SAVESTATE_VERSION: u32 = 1;

/// Everything a state stream carries, in stream order
#[derive(Serialize, Deserialize)]
pub struct SaveState {
    pub cycle: u64,
    pub counters: Counters,
    pub intc: Intc,
    pub gs: Gs,
    pub gif: GifUnit,
    pub vif0: Vif,
    pub vif1: Vif,
    pub vu0_mem: VuMem,
    pub vu1_mem: VuMem,
    pub mtvu: Option<MtvuFreeze>,
}

impl SaveState {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = SAVESTATE_VERSION.to_le_bytes().to_vec();
        let body = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| EmulatorError::SaveStateEncode(e.to_string()))?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(head) = bytes.get(..4) else {
            return Err(EmulatorError::SaveStateCorrupt(
                "stream shorter than the version header".into(),
            ));
        };
        let found = u32::from_le_bytes(head.try_into().unwrap());
        if found > SAVESTATE_VERSION {
            return Err(EmulatorError::SaveStateVersion {
                found,
                supported: SAVESTATE_VERSION,
            });
        }
        let (state, _) = bincode::serde::decode_from_slice(&bytes[4..], bincode::config::standard())
            .map_err(|e| EmulatorError::SaveStateCorrupt(e.to_string()))?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SaveState {
        let mut gs = Gs::new();
        gs.sigid = 0xDEAD;
        gs.vram[0x1234] = 0x5A;
        SaveState {
            cycle: 987_654,
            counters: Counters::new(),
            intc: Intc::new(),
            gs,
            gif: GifUnit::new(),
            vif0: Vif::new(0),
            vif1: Vif::new(1),
            vu0_mem: VuMem::vu0(),
            vu1_mem: VuMem::vu1(),
            mtvu: None,
        }
    }

    #[test]
    fn test_round_trip_preserves_state() {
        let state = sample();
        let bytes = state.to_bytes().unwrap();
        let back = SaveState::from_bytes(&bytes).unwrap();
        assert_eq!(back.cycle, 987_654);
        assert_eq!(back.gs.sigid, 0xDEAD);
        assert_eq!(back.gs.vram[0x1234], 0x5A);
        assert_eq!(back.vu1_mem.data.len(), state.vu1_mem.data.len());
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[..4].copy_from_slice(&(SAVESTATE_VERSION + 1).to_le_bytes());
        match SaveState::from_bytes(&bytes) {
            Err(EmulatorError::SaveStateVersion { found, supported }) => {
                assert_eq!(found, SAVESTATE_VERSION + 1);
                assert_eq!(supported, SAVESTATE_VERSION);
            }
            other => panic!("expected version error, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let bytes = sample().to_bytes().unwrap();
        assert!(matches!(
            SaveState::from_bytes(&bytes[..10]),
            Err(EmulatorError::SaveStateCorrupt(_))
        ));
        assert!(matches!(
            SaveState::from_bytes(&[1, 0]),
            Err(EmulatorError::SaveStateCorrupt(_))
        ));
    }
}
