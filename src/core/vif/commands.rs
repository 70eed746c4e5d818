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

//! VIFcode decode and execution
//!
//! A VIFcode is one 32-bit word: CMD in bits 24-30, the interrupt bit at
//! 31, NUM in 16-23 and IMMEDIATE in 0-15. Single-word commands run
//! immediately; the payload-carrying ones (STMASK, STROW, STCOL, MPG,
//! DIRECT, UNPACK) park a [`Pending`] state that later bursts continue.

use super::unpack::UnpackJob;
use super::{Pending, Vif, VifBus, VifStall, VuOp};
use crate::core::gif::GifPathKind;

impl Vif {
    /// Decode and begin the code currently latched in `self.code`.
    pub(super) fn start_code(&mut self, bus: &mut VifBus) {
        let cmd = (self.code >> 24) & 0x7F;
        let num = (self.code >> 16) & 0xFF;
        let imm = self.code & 0xFFFF;

        if self.code & 0x8000_0000 != 0 && self.err & super::ERR_MII == 0 {
            self.irq_on_done = true;
        }

        match cmd {
            0x00 => {} // NOP
            0x01 => {
                // STCYCL
                self.regs.cl = imm & 0xFF;
                self.regs.wl = (imm >> 8) & 0xFF;
            }
            0x02 if self.idx == 1 => {
                // OFFSET: resets the double buffer
                self.ofst = imm & 0x3FF;
                self.dbf = false;
                self.tops = self.base;
            }
            0x03 if self.idx == 1 => self.base = imm & 0x3FF,
            0x04 => self.itops = imm & 0x3FF,
            0x05 => self.regs.mode = imm & 3,
            0x06 if self.idx == 1 => bus.gif.set_mskpath3(imm & 0x8000 != 0),
            0x07 => {
                self.mark = imm;
                self.mrk = true;
            }
            0x10 => self.queue_vu_op(VuOp::Flushe, bus),
            0x11 if self.idx == 1 => self.queue_vu_op(VuOp::Flush, bus),
            0x13 if self.idx == 1 => self.queue_vu_op(VuOp::Flusha, bus),
            0x14 => self.queue_vu_op(VuOp::Mscal { pc: imm * 8 }, bus),
            0x15 if self.idx == 1 => self.queue_vu_op(VuOp::Mscalf { pc: imm * 8 }, bus),
            0x17 => self.queue_vu_op(VuOp::Mscnt, bus),
            0x20 => self.pending = Pending::Stmask,
            0x30 => self.pending = Pending::Strow { idx: 0 },
            0x31 => self.pending = Pending::Stcol { idx: 0 },
            0x4A => {
                let n = if num == 0 { 256 } else { num };
                self.pending = Pending::Mpg {
                    addr: imm * 8,
                    left_words: n * 2,
                    buf: Vec::new(),
                };
            }
            0x50 | 0x51 if self.idx == 1 => {
                // DIRECT / DIRECTHL both carry a raw PATH2 packet
                let q = if imm == 0 { 0x10000 } else { imm };
                self.pending = Pending::Direct {
                    left_qwords: q,
                    buf: Vec::new(),
                };
            }
            0x60..=0x7F => self.start_unpack(cmd, num, imm),
            _ => self.invalid_code(cmd),
        }
    }

    fn invalid_code(&mut self, cmd: u32) {
        log::warn!("vif{}: invalid code {cmd:#04x}", self.idx);
        self.er1 = true;
        self.irq_on_done = false;
        if self.err & super::ERR_ME1 == 0 {
            self.stall = VifStall::Irq;
        }
    }

    /// Park a VU-dependent op; runs immediately when the unit is free.
    fn queue_vu_op(&mut self, op: VuOp, bus: &mut VifBus) {
        if self.try_vu_op(op, bus) {
            return;
        }
        self.pending = Pending::WaitVu { then: op };
        self.timing_break();
    }

    /// Attempt a parked VU op. Returns false while its precondition is
    /// still unmet.
    pub(super) fn try_vu_op(&mut self, op: VuOp, bus: &mut VifBus) -> bool {
        let vu_idle = match &bus.mtvu {
            Some(b) if self.idx == 1 => b.vu_idle(),
            _ => bus.vu.is_idle(),
        };
        if !vu_idle {
            return false;
        }
        match op {
            VuOp::Flushe => true,
            VuOp::Flush => bus.gif.path[0].is_done() && bus.gif.path[1].is_done(),
            VuOp::Flusha | VuOp::Mscalf { .. } => bus.gif.path.iter().all(|p| p.is_done()),
            VuOp::Mscal { .. } | VuOp::Mscnt => true,
        }
        .then(|| {
            if let VuOp::Mscal { pc } | VuOp::Mscalf { pc } = op {
                self.start_program(Some(pc), bus);
            } else if op == VuOp::Mscnt {
                self.start_program(None, bus);
            }
        })
        .is_some()
    }

    /// Launch a microprogram, rotating the double-buffer registers first.
    fn start_program(&mut self, pc: Option<u32>, bus: &mut VifBus) {
        self.itop = self.itops;
        if self.idx == 1 {
            self.top = self.tops;
            self.dbf = !self.dbf;
            self.tops = self.base + if self.dbf { self.ofst } else { 0 };
        }
        if let Some(bridge) = bus.mtvu.as_deref_mut() {
            if self.idx == 1 {
                bridge.execute(pc, bus.gs, bus.intc);
                return;
            }
        }
        let run = bus.vu.exec(pc, u32::MAX);
        if let Some(pkt) = run.gif_packet {
            bus.gif
                .transfer_gs_packet_data(GifPathKind::Path1, &pkt, bus.gs, bus.intc, bus.renderer);
        }
    }

    fn start_unpack(&mut self, cmd: u32, num: u32, imm: u32) {
        let vn = (cmd >> 2) & 3;
        let vl = cmd & 3;
        if vl == 3 && vn != 3 {
            // V4-5 is the only valid 5-bit form
            self.invalid_code(cmd);
            return;
        }
        let mut addr = imm & 0x3FF;
        if self.idx == 1 && imm & 0x8000 != 0 {
            addr += self.tops;
        }
        let n = if num == 0 { 256 } else { num };
        self.unpack = UnpackJob {
            active: true,
            vl,
            vn,
            usn: imm & 0x4000 != 0,
            masked: cmd & 0x10 != 0,
            addr,
            num: n,
            cycle: 0,
            buf: Vec::new(),
            last: [0; 4],
        };
        self.unpack_defer.clear();
        let words = self.unpack.payload_words(n, &self.regs);
        self.pending = Pending::Unpack { left_words: words };
    }

    /// Continue a payload-carrying command. Returns the words consumed.
    pub(super) fn continue_command(&mut self, data: &[u32], bus: &mut VifBus) -> usize {
        match std::mem::take(&mut self.pending) {
            Pending::Stmask => {
                if data.is_empty() {
                    self.pending = Pending::Stmask;
                    return 0;
                }
                self.regs.mask = data[0];
                1
            }
            Pending::Strow { mut idx } => {
                let take = data.len().min(4 - idx);
                for w in &data[..take] {
                    self.regs.row[idx] = *w;
                    idx += 1;
                }
                if idx < 4 {
                    self.pending = Pending::Strow { idx };
                } else if let Some(bridge) = bus.mtvu.as_deref_mut() {
                    if self.idx == 1 {
                        bridge.write_row(self.regs.row);
                    }
                }
                take
            }
            Pending::Stcol { mut idx } => {
                let take = data.len().min(4 - idx);
                for w in &data[..take] {
                    self.regs.col[idx] = *w;
                    idx += 1;
                }
                if idx < 4 {
                    self.pending = Pending::Stcol { idx };
                } else if let Some(bridge) = bus.mtvu.as_deref_mut() {
                    if self.idx == 1 {
                        bridge.write_col(self.regs.col);
                    }
                }
                take
            }
            Pending::Mpg {
                addr,
                mut left_words,
                mut buf,
            } => {
                let take = data.len().min(left_words as usize);
                for w in &data[..take] {
                    buf.extend_from_slice(&w.to_le_bytes());
                }
                left_words -= take as u32;
                if left_words > 0 {
                    self.pending = Pending::Mpg {
                        addr,
                        left_words,
                        buf,
                    };
                } else {
                    self.commit_micro(addr, &buf, bus);
                }
                take
            }
            Pending::Direct {
                mut left_qwords,
                mut buf,
            } => {
                // Consume at most what the packet still needs
                let need_words = left_qwords as usize * 4 - buf.len() / 4;
                let take = data.len().min(need_words);
                for w in &data[..take] {
                    buf.extend_from_slice(&w.to_le_bytes());
                }
                let whole = buf.len() / 16 * 16;
                if whole > 0 {
                    let chunk: Vec<u8> = buf.drain(..whole).collect();
                    left_qwords -= (whole / 16) as u32;
                    if !bus.gif.transfer_gs_packet_data(
                        GifPathKind::Path2,
                        &chunk,
                        bus.gs,
                        bus.intc,
                        bus.renderer,
                    ) {
                        // PATH2 buffer saturated: keep the packet open and
                        // retry after a settle delay
                        buf.splice(..0, chunk);
                        left_qwords += (whole / 16) as u32;
                        self.timing_break();
                    }
                }
                if left_qwords > 0 || !buf.is_empty() {
                    self.pending = Pending::Direct { left_qwords, buf };
                }
                take
            }
            Pending::Unpack { mut left_words } => {
                let take = data.len().min(left_words as usize);
                let mut bytes = Vec::with_capacity(take * 4);
                for w in &data[..take] {
                    bytes.extend_from_slice(&w.to_le_bytes());
                }
                left_words -= take as u32;
                self.feed_unpack(&bytes, left_words == 0, bus);
                if left_words > 0 {
                    self.pending = Pending::Unpack { left_words };
                }
                take
            }
            other => {
                // None and WaitVu never reach here
                self.pending = other;
                0
            }
        }
    }

    fn commit_micro(&mut self, addr: u32, bytes: &[u8], bus: &mut VifBus) {
        if let Some(bridge) = bus.mtvu.as_deref_mut() {
            if self.idx == 1 {
                bridge.write_micro(addr, bytes);
                return;
            }
        }
        bus.vu.mem.write_micro(addr, bytes);
        bus.vu.backend.clear_range(addr, bytes.len() as u32);
    }

    fn feed_unpack(&mut self, bytes: &[u8], last: bool, bus: &mut VifBus) {
        if let Some(bridge) = bus.mtvu.as_deref_mut() {
            if self.idx == 1 {
                // Worker path: ship the whole payload as one record so the
                // consumer replays it against its own VU1 memory
                self.unpack_defer.extend_from_slice(bytes);
                if last {
                    let payload = std::mem::take(&mut self.unpack_defer);
                    bridge.unpack(&self.unpack, &self.regs, &payload);
                    self.unpack.active = false;
                }
                return;
            }
        }
        self.unpack.feed(&mut self.regs, &mut bus.vu.mem, bytes);
    }
}
