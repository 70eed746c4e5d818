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

//! VIF UNPACK decompression
//!
//! UNPACK expands compact wire formats (scalar and 2/3/4-vector forms of
//! 32/16/8-bit elements, plus the RGBA5551 "V4-5" form) into full 128-bit
//! quadwords in VU data memory. Sub-32-bit signed elements sign-extend,
//! unsigned elements zero-extend. Three orthogonal modifiers apply:
//!
//! - STMASK: per-component, per-cycle source select (data/row/col/skip)
//! - STMOD: additive row offset, optionally accumulating (mode 2)
//! - STCYCL CL/WL: address skipping (WL < CL) or filling writes (WL > CL)
//!
//! The job is a resumable state machine because a DMA burst can split an
//! UNPACK payload at any byte.

use serde::{Deserialize, Serialize};

use crate::core::vu::VuMem;

/// Registers an unpack samples; owned by the VIF, mirrored across the
/// VU1 bridge so the worker sees identical values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnpackRegs {
    pub cl: u32,
    pub wl: u32,
    pub mode: u32,
    pub mask: u32,
    pub row: [u32; 4],
    pub col: [u32; 4],
}

impl Default for UnpackRegs {
    fn default() -> Self {
        Self {
            cl: 1,
            wl: 1,
            mode: 0,
            mask: 0,
            row: [0; 4],
            col: [0; 4],
        }
    }
}

/// Effective write length: WL of 0 behaves as 256
fn eff_wl(regs: &UnpackRegs) -> u32 {
    if regs.wl == 0 {
        256
    } else {
        regs.wl
    }
}

/// One in-flight UNPACK
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnpackJob {
    pub active: bool,
    /// Element width selector (VL field)
    pub vl: u32,
    /// Component count minus one (VN field)
    pub vn: u32,
    /// Zero-extend instead of sign-extend
    pub usn: bool,
    /// Apply STMASK
    pub masked: bool,
    /// Current destination quadword address
    pub addr: u32,
    /// Writes remaining (NUM)
    pub num: u32,
    /// Position within the current CL/WL group
    pub cycle: u32,
    /// Carried partial input between bursts
    pub buf: Vec<u8>,
    /// Last decoded components, reused by filling writes
    pub last: [u32; 4],
}

impl UnpackJob {
    /// Wire bytes consumed per written quadword
    pub fn input_bytes_per_write(&self) -> usize {
        if self.vl == 3 {
            2 // V4-5: one 16-bit RGBA5551 word
        } else {
            (self.vn as usize + 1) * (4 >> self.vl)
        }
    }

    /// Input quadwords the wire carries for `num` writes under CL/WL.
    /// Filling writes synthesize the surplus from row/col, so only CL of
    /// every WL writes consume data.
    pub fn input_writes(num: u32, regs: &UnpackRegs) -> u32 {
        let wl = eff_wl(regs);
        if wl <= regs.cl {
            num
        } else {
            regs.cl * (num / wl) + (num % wl).min(regs.cl)
        }
    }

    /// Total payload words (32-bit) for this job given `num` writes
    pub fn payload_words(&self, num: u32, regs: &UnpackRegs) -> u32 {
        let writes = Self::input_writes(num, regs);
        let bytes = writes as usize * self.input_bytes_per_write();
        (bytes as u32).div_ceil(4)
    }

    /// Consume `bytes`, writing completed quadwords into `mem`. Buffers any
    /// trailing partial element. Returns true when the job completed.
    pub fn feed(&mut self, regs: &mut UnpackRegs, mem: &mut VuMem, bytes: &[u8]) -> bool {
        let stitched;
        let input: &[u8] = if self.buf.is_empty() {
            bytes
        } else {
            let mut v = std::mem::take(&mut self.buf);
            v.extend_from_slice(bytes);
            stitched = v;
            &stitched
        };

        let per = self.input_bytes_per_write();
        let wl = eff_wl(regs);
        let mut pos = 0usize;

        while self.num > 0 {
            let filling = regs.cl < wl && self.cycle >= regs.cl;
            if filling {
                // Filling write: no input consumed; data slots replay the
                // last decoded element group
                let comps = self.last;
                self.store(regs, mem, comps);
                self.advance(regs, wl);
                continue;
            }
            if input.len() - pos < per {
                break;
            }
            let comps = self.decode(&input[pos..pos + per]);
            pos += per;
            self.last = comps;
            self.store(regs, mem, comps);
            self.advance(regs, wl);
        }

        if self.num == 0 {
            self.active = false;
            self.buf.clear();
            true
        } else {
            self.buf = input[pos..].to_vec();
            false
        }
    }

    fn advance(&mut self, regs: &UnpackRegs, wl: u32) {
        self.num -= 1;
        self.addr += 1;
        self.cycle += 1;
        if self.cycle >= wl {
            // Group complete
            if wl < regs.cl {
                // Skipping write: jump over the unwritten addresses
                self.addr += regs.cl - wl;
            }
            self.cycle = 0;
        }
    }

    /// Expand one element group into four 32-bit components
    fn decode(&self, bytes: &[u8]) -> [u32; 4] {
        if self.vl == 3 {
            // V4-5: RGBA5551 expansion
            let v = u16::from_le_bytes([bytes[0], bytes[1]]);
            return [
                u32::from(v & 0x1F) << 3,
                u32::from((v >> 5) & 0x1F) << 3,
                u32::from((v >> 10) & 0x1F) << 3,
                u32::from(v >> 15) << 7,
            ];
        }
        let mut comps = [0u32; 4];
        let width = 4 >> self.vl;
        for k in 0..=self.vn as usize {
            let off = k * width;
            comps[k] = match self.vl {
                0 => u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()),
                1 => {
                    let v = u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());
                    if self.usn {
                        u32::from(v)
                    } else {
                        v as i16 as i32 as u32
                    }
                }
                _ => {
                    let v = bytes[off];
                    if self.usn {
                        u32::from(v)
                    } else {
                        v as i8 as i32 as u32
                    }
                }
            };
        }
        if self.vn == 0 {
            // S forms broadcast the scalar across all four lanes
            comps = [comps[0]; 4];
        }
        comps
    }

    /// Write one quadword applying STMASK source selection and STMOD
    fn store(&self, regs: &mut UnpackRegs, mem: &mut VuMem, comps: [u32; 4]) {
        let cyc = self.cycle.min(3) as usize;
        let mut qw = mem.read_data_qword(self.addr);
        for k in 0..4 {
            let sel = if self.masked {
                (regs.mask >> (cyc * 8 + k * 2)) & 3
            } else {
                0
            };
            match sel {
                0 => {
                    let v = comps[k];
                    qw[k] = match regs.mode {
                        0 => v,
                        2 => {
                            let sum = v.wrapping_add(regs.row[k]);
                            regs.row[k] = sum;
                            sum
                        }
                        // Mode 3 is undocumented; hardware behaves like 1
                        _ => v.wrapping_add(regs.row[k]),
                    };
                }
                1 => qw[k] = regs.row[k],
                2 => qw[k] = regs.col[cyc],
                _ => {} // skip: existing memory survives
            }
        }
        mem.write_data_qword(self.addr, qw);
    }
}
