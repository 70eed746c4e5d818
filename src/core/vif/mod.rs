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

//! VIF0/VIF1 interface units
//!
//! Each VIF consumes a 32-bit word stream of VIFcodes from its DMA channel
//! and drives a vector unit: UNPACK expands wire data into VU memory, MPG
//! uploads microprograms, MSCAL launches them, and (VIF1 only) DIRECT
//! forwards raw GS packets to GIF PATH2.
//!
//! Processing is resumable at every word boundary since a DMA burst can
//! stop anywhere. A stall is one of three shapes: an i-bit or error stall
//! that a FBRST.STC write clears, a stop requested through FBRST, or a
//! timing break where the unit retries by itself after a fixed delay.
//!
//! ## References
//!
//! - EE User's Manual, chapter 9 (VIF)
//! - https://psi-rockin.github.io/ps2tek/#vif

pub mod commands;
pub mod unpack;

use serde::{Deserialize, Serialize};

use super::gif::GifUnit;
use super::gs::Gs;
use super::intc::{lines, Intc};
use super::mtvu::MtvuBridge;
use super::renderer::RendererBackend;
use super::vu::Vu;
use unpack::{UnpackJob, UnpackRegs};

/// Cycles before a timing-break stall is retried
pub const STALL_RETRY_CYCLES: u32 = 128;

/// Everything a VIF touches while processing. The session wires VIF0 to
/// VU0 and VIF1 to VU1 plus the optional VU1 worker bridge.
pub struct VifBus<'a> {
    pub gif: &'a mut GifUnit,
    pub gs: &'a mut Gs,
    pub intc: &'a mut Intc,
    pub vu: &'a mut Vu,
    pub mtvu: Option<&'a mut MtvuBridge>,
    pub renderer: &'a mut dyn RendererBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VifStall {
    #[default]
    None,
    /// Stopped until FBRST.STC: i-bit, invalid code, STOP or ForceBreak
    Irq,
    /// Transient resource wait; retried after [`STALL_RETRY_CYCLES`]
    TimingBreak,
}

/// VU-side operation parked behind a busy unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VuOp {
    Flushe,
    Flush,
    Flusha,
    Mscal { pc: u32 },
    Mscalf { pc: u32 },
    Mscnt,
}

/// Multi-word command in flight
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Pending {
    #[default]
    None,
    Stmask,
    Strow {
        idx: usize,
    },
    Stcol {
        idx: usize,
    },
    Mpg {
        addr: u32,
        left_words: u32,
        buf: Vec<u8>,
    },
    Direct {
        left_qwords: u32,
        buf: Vec<u8>,
    },
    Unpack {
        left_words: u32,
    },
    WaitVu {
        then: VuOp,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vif {
    /// 0 or 1; gates the VIF1-only command set
    idx: usize,
    pub err: u32,
    pub mark: u32,
    /// Most recent VIFcode, visible through the CODE register
    pub code: u32,
    pub regs: UnpackRegs,
    pub itops: u32,
    pub base: u32,
    pub ofst: u32,
    pub tops: u32,
    pub itop: u32,
    pub top: u32,
    dbf: bool,
    mrk: bool,
    vss: bool,
    vfs: bool,
    vis: bool,
    int_pending: bool,
    er1: bool,
    /// VIF1 FIFO reversed for GS local→host readback
    fdr_reverse: bool,
    /// i-bit seen on the current code; stall once it completes
    irq_on_done: bool,
    pending: Pending,
    stall: VifStall,
    wait_cycles: u32,
    unpack: UnpackJob,
    /// Accumulated UNPACK payload when the job ships to the VU1 worker
    unpack_defer: Vec<u8>,
}

// ERR register bits
const ERR_MII: u32 = 1 << 0;
const ERR_ME1: u32 = 1 << 2;

impl Vif {
    pub fn new(idx: usize) -> Self {
        Self {
            idx,
            err: 0,
            mark: 0,
            code: 0,
            regs: UnpackRegs::default(),
            itops: 0,
            base: 0,
            ofst: 0,
            tops: 0,
            itop: 0,
            top: 0,
            dbf: false,
            mrk: false,
            vss: false,
            vfs: false,
            vis: false,
            int_pending: false,
            er1: false,
            fdr_reverse: false,
            irq_on_done: false,
            pending: Pending::None,
            stall: VifStall::None,
            wait_cycles: 0,
            unpack: UnpackJob::default(),
            unpack_defer: Vec::new(),
        }
    }

    fn intc_line(&self) -> u32 {
        if self.idx == 0 {
            lines::VIF0
        } else {
            lines::VIF1
        }
    }

    pub fn stall(&self) -> VifStall {
        self.stall
    }

    /// Can the DMA channel push words right now?
    pub fn ready(&self) -> bool {
        self.stall == VifStall::None && self.wait_cycles == 0
    }

    // --------------------------------------------------------------
    // EE-visible registers
    // --------------------------------------------------------------

    pub fn read_stat(&self) -> u32 {
        let vps: u32 = match self.pending {
            Pending::None => 0,
            Pending::WaitVu { .. } => 0,
            _ => 3,
        };
        let vew = matches!(self.pending, Pending::WaitVu { .. });
        let mut v = vps;
        v |= u32::from(vew) << 2;
        v |= u32::from(self.mrk) << 6;
        v |= u32::from(self.dbf) << 7;
        v |= u32::from(self.vss) << 8;
        v |= u32::from(self.vfs) << 9;
        v |= u32::from(self.vis) << 10;
        v |= u32::from(self.int_pending) << 11;
        v |= u32::from(self.er1) << 13;
        v |= u32::from(self.fdr_reverse) << 23;
        v
    }

    pub fn write_err(&mut self, value: u32) {
        self.err = value & 7;
    }

    /// EE write to MARK clears the MRK flag
    pub fn write_mark(&mut self, value: u32) {
        self.mark = value & 0xFFFF;
        self.mrk = false;
    }

    pub fn write_fbrst(&mut self, value: u32) {
        if value & 1 != 0 {
            // RST: full unit reset
            let idx = self.idx;
            *self = Self::new(idx);
            return;
        }
        if value & 2 != 0 {
            // FBK: force break
            self.vfs = true;
            self.stall = VifStall::Irq;
        }
        if value & 4 != 0 {
            // STP: stop after the current code
            self.vss = true;
            self.stall = VifStall::Irq;
        }
        if value & 8 != 0 {
            // STC: cancel the stall and clear the status flags
            self.vss = false;
            self.vfs = false;
            self.vis = false;
            self.int_pending = false;
            self.er1 = false;
            if self.stall == VifStall::Irq {
                self.stall = VifStall::None;
            }
        }
    }

    /// VIF1 FDR: flips the FIFO for GS readback
    pub fn write_fdr(&mut self, value: u32) {
        self.fdr_reverse = self.idx == 1 && value & 1 != 0;
    }

    pub fn fifo_reversed(&self) -> bool {
        self.fdr_reverse
    }

    /// Reverse-FIFO read, serviced straight from the GS transfer engine
    pub fn read_fifo(&mut self, gs: &mut Gs, count: usize) -> Vec<u8> {
        gs.read_fifo(count)
    }

    // --------------------------------------------------------------
    // Word stream
    // --------------------------------------------------------------

    /// Feed DMA words. Returns how many were consumed; fewer than
    /// `data.len()` means the unit stalled and the rest must be re-sent
    /// after the stall clears.
    pub fn transfer(&mut self, data: &[u32], bus: &mut VifBus) -> usize {
        let mut pos = 0;
        loop {
            if !self.ready() {
                break;
            }
            // A parked VU operation blocks the stream without eating words
            if let Pending::WaitVu { then } = self.pending {
                if !self.try_vu_op(then, bus) {
                    self.timing_break();
                    break;
                }
                self.pending = Pending::None;
                self.finish_code(bus);
                continue;
            }
            if pos >= data.len() {
                // An empty burst retries a DIRECT chunk the GIF refused
                if matches!(&self.pending, Pending::Direct { buf, .. } if !buf.is_empty()) {
                    self.continue_command(&[], bus);
                    if self.pending == Pending::None && matches!(self.stall, VifStall::None) {
                        self.finish_code(bus);
                    }
                }
                break;
            }
            if self.pending == Pending::None {
                self.code = data[pos];
                pos += 1;
                self.start_code(bus);
            } else {
                pos += self.continue_command(&data[pos..], bus);
            }
            if self.pending == Pending::None && matches!(self.stall, VifStall::None) {
                self.finish_code(bus);
            }
        }
        pos
    }

    /// Command boundary: deliver a pending i-bit stall
    fn finish_code(&mut self, bus: &mut VifBus) {
        if self.irq_on_done {
            self.irq_on_done = false;
            self.int_pending = true;
            self.vis = true;
            self.stall = VifStall::Irq;
            bus.intc.raise(self.intc_line());
        }
    }

    pub(crate) fn timing_break(&mut self) {
        self.stall = VifStall::TimingBreak;
        self.wait_cycles = STALL_RETRY_CYCLES;
    }

    /// Advance retry timers. Returns true when a timing break expired and
    /// the DMA channel should resume.
    pub fn tick(&mut self, cycles: u32) -> bool {
        if self.wait_cycles > 0 {
            self.wait_cycles = self.wait_cycles.saturating_sub(cycles);
            if self.wait_cycles == 0 && self.stall == VifStall::TimingBreak {
                self.stall = VifStall::None;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::renderer::NullRenderer;

    struct Rig {
        gif: GifUnit,
        gs: Gs,
        intc: Intc,
        vu: Vu,
        r: NullRenderer,
    }

    impl Rig {
        fn new(vif_idx: usize) -> Self {
            Self {
                gif: GifUnit::new(),
                gs: Gs::new(),
                intc: Intc::new(),
                vu: if vif_idx == 0 { Vu::vu0() } else { Vu::vu1() },
                r: NullRenderer::default(),
            }
        }

        fn feed(&mut self, vif: &mut Vif, words: &[u32]) -> usize {
            let mut bus = VifBus {
                gif: &mut self.gif,
                gs: &mut self.gs,
                intc: &mut self.intc,
                vu: &mut self.vu,
                mtvu: None,
                renderer: &mut self.r,
            };
            vif.transfer(words, &mut bus)
        }
    }

    fn code(cmd: u32, num: u32, imm: u32) -> u32 {
        (cmd << 24) | (num << 16) | (imm & 0xFFFF)
    }

    #[test]
    fn test_stcycl_stmod_update_regs() {
        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        rig.feed(&mut vif, &[code(0x01, 0, 0x0102), code(0x05, 0, 2)]);
        assert_eq!(vif.regs.cl, 2);
        assert_eq!(vif.regs.wl, 1);
        assert_eq!(vif.regs.mode, 2);
    }

    #[test]
    fn test_strow_stcol_split_across_bursts() {
        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        let n = rig.feed(&mut vif, &[code(0x30, 0, 0), 1, 2]);
        assert_eq!(n, 3);
        rig.feed(&mut vif, &[3, 4, code(0x31, 0, 0), 9, 9, 9, 9]);
        assert_eq!(vif.regs.row, [1, 2, 3, 4]);
        assert_eq!(vif.regs.col, [9, 9, 9, 9]);
    }

    #[test]
    fn test_unpack_v4_32_round_trip() {
        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        let mut words = vec![code(0x6C, 2, 0x10)]; // V4-32, num=2, addr 0x10
        words.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let n = rig.feed(&mut vif, &words);
        assert_eq!(n, words.len());
        assert_eq!(rig.vu.mem.read_data_qword(0x10), [1, 2, 3, 4]);
        assert_eq!(rig.vu.mem.read_data_qword(0x11), [5, 6, 7, 8]);
        assert!(vif.ready());
    }

    #[test]
    fn test_unpack_v3_16_signed_round_trip() {
        let mut rig = Rig::new(0);
        let mut vif = Vif::new(0);
        // V3-16 (vn=2, vl=1), num=2: 12 bytes -> 3 words
        let mut words = vec![code(0x69, 2, 0)];
        let vals: [i16; 6] = [-1, 2, -3, 4, -5, 6];
        let mut bytes = Vec::new();
        for v in vals {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for ch in bytes.chunks(4) {
            words.push(u32::from_le_bytes(ch.try_into().unwrap()));
        }
        rig.feed(&mut vif, &words);
        let q0 = rig.vu.mem.read_data_qword(0);
        assert_eq!(&q0[..3], &[0xFFFF_FFFF, 2, 0xFFFF_FFFD]);
        let q1 = rig.vu.mem.read_data_qword(1);
        assert_eq!(&q1[..3], &[4, 0xFFFF_FFFB, 6]);
    }

    #[test]
    fn test_unpack_split_mid_payload_resumes() {
        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        let words = [code(0x6C, 1, 0), 0xA, 0xB, 0xC, 0xD];
        assert_eq!(rig.feed(&mut vif, &words[..3]), 3);
        assert!(!vif.ready() || matches!(vif.pending, Pending::Unpack { .. }));
        assert_eq!(rig.feed(&mut vif, &words[3..]), 2);
        assert_eq!(rig.vu.mem.read_data_qword(0), [0xA, 0xB, 0xC, 0xD]);
    }

    #[test]
    fn test_unpack_flg_adds_tops() {
        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        vif.tops = 0x100;
        let words = [code(0x6C, 1, 0x8000 | 0x20), 1, 2, 3, 4];
        rig.feed(&mut vif, &words);
        assert_eq!(rig.vu.mem.read_data_qword(0x120), [1, 2, 3, 4]);
    }

    #[test]
    fn test_mpg_uploads_microcode() {
        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        // 2 instructions at micro address 8*8
        let words = [code(0x4A, 2, 8), 0x1111, 0x2222, 0x3333, 0x4444];
        rig.feed(&mut vif, &words);
        assert_eq!(&rig.vu.mem.micro[64..68], &0x1111u32.to_le_bytes());
        assert_eq!(&rig.vu.mem.micro[76..80], &0x4444u32.to_le_bytes());
    }

    #[test]
    fn test_mscal_rotates_double_buffer() {
        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        let setup = [
            code(0x03, 0, 0x40), // BASE
            code(0x02, 0, 0x20), // OFFSET: clears DBF, TOPS=BASE
            code(0x04, 0, 0x11), // ITOP
        ];
        rig.feed(&mut vif, &setup);
        assert_eq!(vif.tops, 0x40);

        rig.feed(&mut vif, &[code(0x14, 0, 0)]);
        assert_eq!(vif.top, 0x40);
        assert_eq!(vif.itop, 0x11);
        assert_eq!(vif.tops, 0x60); // BASE + OFST after the toggle

        rig.feed(&mut vif, &[code(0x17, 0, 0)]); // MSCNT
        assert_eq!(vif.top, 0x60);
        assert_eq!(vif.tops, 0x40);
    }

    #[test]
    fn test_ibit_raises_interrupt_and_stalls() {
        let mut rig = Rig::new(0);
        let mut vif = Vif::new(0);
        let words = [0x8000_0000 | code(0x00, 0, 0), code(0x05, 0, 1)];
        let n = rig.feed(&mut vif, &words);
        assert_eq!(n, 1);
        assert_eq!(vif.stall(), VifStall::Irq);
        assert!(rig.intc.line_pending(lines::VIF0));
        assert_ne!(vif.read_stat() & (1 << 11), 0);

        // STC clears the stall; the stream then continues
        vif.write_fbrst(8);
        assert!(vif.ready());
        rig.feed(&mut vif, &words[1..]);
        assert_eq!(vif.regs.mode, 1);
    }

    #[test]
    fn test_ibit_masked_by_err_mii() {
        let mut rig = Rig::new(0);
        let mut vif = Vif::new(0);
        vif.write_err(ERR_MII);
        let n = rig.feed(&mut vif, &[0x8000_0000 | code(0x00, 0, 0)]);
        assert_eq!(n, 1);
        assert!(vif.ready());
        assert!(!rig.intc.line_pending(lines::VIF0));
    }

    #[test]
    fn test_invalid_code_sets_er1_and_stalls() {
        let mut rig = Rig::new(0);
        let mut vif = Vif::new(0);
        // DIRECT is VIF1-only; on VIF0 it is an invalid code
        let n = rig.feed(&mut vif, &[code(0x50, 0, 1), 0, 0, 0, 0]);
        assert_eq!(n, 1);
        assert_eq!(vif.stall(), VifStall::Irq);
        assert_ne!(vif.read_stat() & (1 << 13), 0);

        // ME1 masks the stall but still latches ER1
        let mut vif = Vif::new(0);
        vif.write_err(ERR_ME1);
        rig.feed(&mut vif, &[code(0x99, 0, 0)]);
        assert!(vif.ready());
        assert_ne!(vif.read_stat() & (1 << 13), 0);
    }

    #[test]
    fn test_direct_routes_to_gif_path2() {
        use crate::core::gif::tests::ad_packet;
        use crate::core::gs::registers::reg;

        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        let pkt = ad_packet(reg::FOGCOL, 0x123456);
        let mut words = vec![code(0x50, 0, 2)]; // DIRECT, 2 qwords
        for ch in pkt.chunks(4) {
            words.push(u32::from_le_bytes(ch.try_into().unwrap()));
        }
        rig.feed(&mut vif, &words);
        assert_eq!(rig.gs.fogcol, 0x123456);
        assert!(vif.ready());
        assert!(rig.gif.path[1].is_done());
    }

    #[test]
    fn test_mark_sets_and_ee_write_clears_mrk() {
        let mut rig = Rig::new(0);
        let mut vif = Vif::new(0);
        rig.feed(&mut vif, &[code(0x07, 0, 0xBEEF)]);
        assert_eq!(vif.mark, 0xBEEF);
        assert_ne!(vif.read_stat() & (1 << 6), 0);
        vif.write_mark(0);
        assert_eq!(vif.read_stat() & (1 << 6), 0);
    }

    #[test]
    fn test_stop_and_force_break() {
        let mut vif = Vif::new(0);
        vif.write_fbrst(4);
        assert_eq!(vif.stall(), VifStall::Irq);
        assert_ne!(vif.read_stat() & (1 << 8), 0);
        vif.write_fbrst(8);
        assert!(vif.ready());

        vif.write_fbrst(2);
        assert_ne!(vif.read_stat() & (1 << 9), 0);
        vif.write_fbrst(1);
        assert!(vif.ready());
        assert_eq!(vif.read_stat() & (1 << 9), 0);
    }

    #[test]
    fn test_mskpath3_reaches_gif() {
        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        rig.feed(&mut vif, &[code(0x06, 0, 0x8000)]);
        assert!(rig.gif.path3_masked());
        rig.feed(&mut vif, &[code(0x06, 0, 0)]);
        assert!(!rig.gif.path3_masked());
    }

    #[test]
    fn test_timing_break_retries_after_delay() {
        let mut vif = Vif::new(1);
        vif.timing_break();
        assert!(!vif.ready());
        assert!(!vif.tick(64));
        assert!(vif.tick(64));
        assert!(vif.ready());
    }

    #[test]
    fn test_unpack_with_mask_and_row() {
        let mut rig = Rig::new(1);
        let mut vif = Vif::new(1);
        // STROW then masked V4-32: x from data, y/z/w from row
        let setup = [code(0x30, 0, 0), 100, 200, 300, 400];
        rig.feed(&mut vif, &setup);
        let mask = 0b01_01_01_00;
        let words = [code(0x20, 0, 0), mask, code(0x7C, 1, 0), 7, 0, 0, 0];
        rig.feed(&mut vif, &words);
        assert_eq!(rig.vu.mem.read_data_qword(0), [7, 200, 300, 400]);
    }
}
