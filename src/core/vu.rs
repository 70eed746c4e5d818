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

//! Vector unit execution seam
//!
//! Opcode execution is an external collaborator: the core only owns the VU
//! memories and drives a backend through "set the start PC, execute a cycle
//! budget" calls. A run may hand back a PATH1 GS packet (XGKICK output) for
//! the GIF arbiter.

use serde::{Deserialize, Serialize};

pub const VU0_MICRO_SIZE: usize = 4 * 1024;
pub const VU0_DATA_SIZE: usize = 4 * 1024;
pub const VU1_MICRO_SIZE: usize = 16 * 1024;
pub const VU1_DATA_SIZE: usize = 16 * 1024;

/// Micro (instruction) and data memory of one vector unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VuMem {
    pub micro: Box<[u8]>,
    pub data: Box<[u8]>,
}

impl VuMem {
    pub fn vu0() -> Self {
        Self {
            micro: vec![0u8; VU0_MICRO_SIZE].into_boxed_slice(),
            data: vec![0u8; VU0_DATA_SIZE].into_boxed_slice(),
        }
    }

    pub fn vu1() -> Self {
        Self {
            micro: vec![0u8; VU1_MICRO_SIZE].into_boxed_slice(),
            data: vec![0u8; VU1_DATA_SIZE].into_boxed_slice(),
        }
    }

    /// Data memory size in quadwords; addresses wrap at this boundary
    pub fn data_qwords(&self) -> u32 {
        (self.data.len() / 16) as u32
    }

    /// Store one quadword of data memory at quadword address `addr`
    pub fn write_data_qword(&mut self, addr: u32, qw: [u32; 4]) {
        let base = (addr % self.data_qwords()) as usize * 16;
        for (k, v) in qw.iter().enumerate() {
            self.data[base + k * 4..base + k * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
    }

    pub fn read_data_qword(&self, addr: u32) -> [u32; 4] {
        let base = (addr % self.data_qwords()) as usize * 16;
        let mut qw = [0u32; 4];
        for (k, v) in qw.iter_mut().enumerate() {
            *v = u32::from_le_bytes(self.data[base + k * 4..base + k * 4 + 4].try_into().unwrap());
        }
        qw
    }

    /// Store microcode starting at byte address `addr`, wrapping
    pub fn write_micro(&mut self, addr: u32, bytes: &[u8]) {
        let len = self.micro.len();
        for (i, &b) in bytes.iter().enumerate() {
            self.micro[(addr as usize + i) % len] = b;
        }
    }
}

/// Result of one backend run
#[derive(Debug, Default)]
pub struct VuRun {
    pub cycles_used: u32,
    /// PATH1 packet produced by XGKICK, if any
    pub gif_packet: Option<Vec<u8>>,
}

/// Opaque execution backend (interpreter or recompiler)
pub trait VuBackend: Send {
    fn set_start_pc(&mut self, pc: u32);
    fn execute(&mut self, mem: &mut VuMem, cycle_budget: u32) -> VuRun;
    /// Invalidate recompiled code over a self-modified micro range
    fn clear_range(&mut self, addr: u32, len: u32);
    /// True when no program is in flight
    fn is_idle(&self) -> bool;
}

/// Backend that completes every program instantly
#[derive(Debug, Default)]
pub struct NullVuBackend {
    pub start_pc: u32,
    pub runs: u64,
}

impl VuBackend for NullVuBackend {
    fn set_start_pc(&mut self, pc: u32) {
        self.start_pc = pc;
    }

    fn execute(&mut self, _mem: &mut VuMem, _cycle_budget: u32) -> VuRun {
        self.runs += 1;
        VuRun::default()
    }

    fn clear_range(&mut self, _addr: u32, _len: u32) {}

    fn is_idle(&self) -> bool {
        true
    }
}

/// One vector unit: its memories plus the execution backend
pub struct Vu {
    pub mem: VuMem,
    pub backend: Box<dyn VuBackend>,
}

impl Vu {
    pub fn vu0() -> Self {
        Self {
            mem: VuMem::vu0(),
            backend: Box::new(NullVuBackend::default()),
        }
    }

    pub fn vu1() -> Self {
        Self {
            mem: VuMem::vu1(),
            backend: Box::new(NullVuBackend::default()),
        }
    }

    /// MSCAL-style start: position the PC and run. `pc` of `None` resumes
    /// in place (MSCNT).
    pub fn exec(&mut self, pc: Option<u32>, cycle_budget: u32) -> VuRun {
        if let Some(pc) = pc {
            self.backend.set_start_pc(pc);
        }
        self.backend.execute(&mut self.mem, cycle_budget)
    }

    pub fn is_idle(&self) -> bool {
        self.backend.is_idle()
    }
}
