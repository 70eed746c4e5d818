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

//! GIF path arbitration
//!
//! Three producers feed the single GS register consumer: PATH1 (VU1 XGKICK),
//! PATH2 (VIF1 DIRECT/DIRECTHL) and PATH3 (GIF DMA/FIFO). Each path buffers
//! its bytes and runs a tag-driven state machine; the arbiter activates one
//! path at a time with strict priority 1 > 2 > 3. The one exception is
//! PATH3's intermittent mode (IMT), which lets an in-flight IMAGE transfer
//! yield at slice boundaries so PATH1/PATH2 can interleave.
//!
//! SIGNAL is the global brake: a second SIGNAL arriving while CSR.SIGNAL is
//! still unacknowledged queues up and suspends all path activity until the
//! game clears the CSR bit.
//!
//! ## References
//!
//! - EE User's Manual, chapter "GIF"
//! - ps2tek: GIF

pub mod tag;

use serde::{Deserialize, Serialize};

use crate::core::gs::registers::reg;
use crate::core::gs::Gs;
use crate::core::intc::Intc;
use crate::core::renderer::RendererBackend;

use self::tag::{GifFlag, GifTag};

/// Per-path buffer capacity: one VU1 memory's worth of packet plus margin
/// so a tag never splits across the wrap.
const PATH_BUF_CAPACITY: usize = 0x4000 + 0x400;

/// IMAGE qwords PATH3 may move per activation in intermittent mode
const IMAGE_SLICE_QWORDS: u32 = 8;

/// Post-mask settle delay applied when a masked PATH3 packet finishes
const PATH3_WAIT_CYCLES: u32 = 16;

/// The three GIF producers, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GifPathKind {
    Path1 = 0,
    Path2 = 1,
    Path3 = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathState {
    Idle,
    Packed,
    Reglist,
    Image,
    /// PATH3 only: settling after finishing while masked
    Wait,
}

/// Linear byte buffer with front compaction. Appends always land in
/// contiguous storage so qword reads never straddle a wrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl PathBuffer {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            offset: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append, compacting consumed bytes first. Fails when the payload
    /// would not fit; the producer must stall and retry.
    fn append(&mut self, bytes: &[u8]) -> bool {
        if self.offset == self.data.len() {
            self.data.clear();
            self.offset = 0;
        } else if self.data.len() + bytes.len() > PATH_BUF_CAPACITY && self.offset > 0 {
            self.data.drain(..self.offset);
            self.offset = 0;
        }
        if self.len() + bytes.len() > PATH_BUF_CAPACITY {
            return false;
        }
        self.data.extend_from_slice(bytes);
        true
    }

    fn peek_qword(&self) -> Option<(u64, u64)> {
        if self.len() < 16 {
            return None;
        }
        let b = &self.data[self.offset..self.offset + 16];
        let lo = u64::from_le_bytes(b[..8].try_into().unwrap());
        let hi = u64::from_le_bytes(b[8..].try_into().unwrap());
        Some((lo, hi))
    }

    fn peek_bytes(&self, n: usize) -> &[u8] {
        &self.data[self.offset..self.offset + n]
    }

    fn consume(&mut self, n: usize) {
        self.offset += n;
        debug_assert!(self.offset <= self.data.len());
    }

    fn clear(&mut self) {
        self.data.clear();
        self.offset = 0;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GifPath {
    pub buffer: PathBuffer,
    pub state: PathState,
    tag: GifTag,
    /// NLOOP iterations left on the open tag
    nloop: u32,
    /// Register descriptor cursor within the current loop
    reg_idx: u32,
    /// Remaining Wait-state cycles (PATH3)
    wait_cycles: u32,
    /// Total payload bytes handed to the GS, for diagnostics and tests
    pub bytes_consumed: u64,
}

impl GifPath {
    fn new() -> Self {
        Self {
            buffer: PathBuffer::new(),
            state: PathState::Idle,
            tag: GifTag::default(),
            nloop: 0,
            reg_idx: 0,
            wait_cycles: 0,
            bytes_consumed: 0,
        }
    }

    /// No open tag and nothing buffered
    pub fn is_done(&self) -> bool {
        matches!(self.state, PathState::Idle | PathState::Wait) && self.buffer.is_empty()
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.state = PathState::Idle;
        self.nloop = 0;
        self.reg_idx = 0;
        self.wait_cycles = 0;
    }
}

enum PacketStatus {
    /// Tag chain hit EOP with all loops consumed
    Done,
    /// Buffer ran dry mid-packet
    NeedData,
    /// PATH3 IMT slice boundary; arbitration may run other paths
    Sliced,
    /// SIGNAL queued; all path activity suspends until CSR ack
    Stalled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GifUnit {
    pub path: [GifPath; 3],
    /// Active path, 0 = none, 1-3
    pub apath: u8,
    /// SIGNAL that arrived while a previous one was unacknowledged
    signal_queued: Option<u64>,
    finish_latched: bool,
    /// GIF MODE.M3R: PATH3 mask from the EE side
    m3r: bool,
    /// GIF MODE.IMT: PATH3 intermittent transfer mode
    imt: bool,
    /// MSKPATH3 from VIF1
    mskpath3: bool,
}

impl GifUnit {
    pub fn new() -> Self {
        Self {
            path: [GifPath::new(), GifPath::new(), GifPath::new()],
            apath: 0,
            signal_queued: None,
            finish_latched: false,
            m3r: false,
            imt: false,
            mskpath3: false,
        }
    }

    /// Mirror of a GS reset: all in-flight path state is dropped.
    pub fn reset(&mut self) {
        for p in &mut self.path {
            p.reset();
        }
        self.apath = 0;
        self.signal_queued = None;
        self.finish_latched = false;
    }

    // --------------------------------------------------------------
    // Registers
    // --------------------------------------------------------------

    pub fn write_mode(&mut self, value: u32) {
        self.m3r = value & 1 != 0;
        self.imt = value & 4 != 0;
    }

    pub fn read_stat(&self) -> u32 {
        let mut v = 0u32;
        v |= u32::from(self.m3r);
        v |= u32::from(self.imt) << 2;
        // P3Q/P2Q/P1Q: data queued per path
        v |= u32::from(!self.path[2].is_done()) << 6;
        v |= u32::from(!self.path[1].is_done()) << 7;
        v |= u32::from(!self.path[0].is_done()) << 8;
        // OPH + APATH
        v |= u32::from(self.apath != 0) << 9;
        v |= u32::from(self.apath) << 10;
        v
    }

    pub fn set_mskpath3(&mut self, masked: bool) {
        self.mskpath3 = masked;
        if !masked && self.path[2].state == PathState::Wait && self.path[2].wait_cycles == 0 {
            self.path[2].state = PathState::Idle;
        }
    }

    pub fn path3_masked(&self) -> bool {
        self.m3r || self.mskpath3
    }

    /// DMA-side predicate: may PATH3 start a fresh packet now?
    pub fn can_do_path3(&self) -> bool {
        self.apath == 0
            && !self.path3_masked()
            && self.path[2].state != PathState::Wait
            && self.signal_queued.is_none()
    }

    pub fn signal_blocked(&self) -> bool {
        self.signal_queued.is_some()
    }

    /// Advance PATH3's Wait-state settle timer.
    pub fn tick(&mut self, cycles: u32) {
        let masked = self.path3_masked();
        let p3 = &mut self.path[2];
        if p3.state == PathState::Wait {
            p3.wait_cycles = p3.wait_cycles.saturating_sub(cycles);
            if p3.wait_cycles == 0 && !masked {
                p3.state = PathState::Idle;
            }
        }
    }

    // --------------------------------------------------------------
    // Data entry
    // --------------------------------------------------------------

    /// Producer entry point. Buffers `data` on the path and runs the
    /// arbiter. Returns false when the path buffer is full even after
    /// draining; the producer must suspend and retry later.
    pub fn transfer_gs_packet_data(
        &mut self,
        kind: GifPathKind,
        data: &[u8],
        gs: &mut Gs,
        intc: &mut Intc,
        r: &mut dyn RendererBackend,
    ) -> bool {
        let idx = kind as usize;
        if !self.path[idx].buffer.append(data) {
            self.execute(gs, intc, r);
            if !self.path[idx].buffer.append(data) {
                return false;
            }
        }
        self.execute(gs, intc, r);
        true
    }

    /// Called after the game acknowledges CSR.SIGNAL: promote the queued
    /// SIGNAL and resume path processing.
    pub fn signal_resume(&mut self, gs: &mut Gs, intc: &mut Intc, r: &mut dyn RendererBackend) {
        if let Some(data) = self.signal_queued.take() {
            apply_signal(gs, intc, data);
        }
        self.execute(gs, intc, r);
    }

    // --------------------------------------------------------------
    // Arbitration
    // --------------------------------------------------------------

    /// Pick the highest-priority ready path. Only called with no path
    /// active; an open packet holds the bus except across IMT slices.
    fn arbitrate(&mut self) {
        for idx in 0..3 {
            if idx == 2 && (self.path3_masked() || self.path[2].state == PathState::Wait) {
                continue;
            }
            if self.path[idx].buffer.len() >= 16 {
                self.apath = idx as u8 + 1;
                return;
            }
        }
    }

    /// Core arbitration loop: advance the active path until nothing can
    /// proceed, then promote FINISH if everything drained.
    pub fn execute(&mut self, gs: &mut Gs, intc: &mut Intc, r: &mut dyn RendererBackend) {
        loop {
            if self.signal_queued.is_some() {
                break;
            }
            if self.apath == 0 {
                self.arbitrate();
            }
            if self.apath == 0 {
                break;
            }
            let idx = usize::from(self.apath - 1);
            match self.execute_gs_packet(idx, gs, intc, r) {
                PacketStatus::Done => {
                    self.apath = 0;
                    if idx == 2 && self.path3_masked() {
                        self.path[2].state = PathState::Wait;
                        self.path[2].wait_cycles = PATH3_WAIT_CYCLES;
                    }
                }
                PacketStatus::Sliced => {
                    // Slice point: release the bus so PATH1/2 can run
                    self.apath = 0;
                }
                PacketStatus::NeedData => {
                    if idx == 2 && self.imt {
                        // A starved intermittent PATH3 also yields
                        self.apath = 0;
                    }
                    break;
                }
                PacketStatus::Stalled => break,
            }
        }
        self.check_finish(gs, intc);
    }

    /// Advance one path's tag state machine as far as buffered data allows.
    fn execute_gs_packet(
        &mut self,
        idx: usize,
        gs: &mut Gs,
        intc: &mut Intc,
        r: &mut dyn RendererBackend,
    ) -> PacketStatus {
        let mut image_budget = if idx == 2 && self.imt {
            Some(IMAGE_SLICE_QWORDS)
        } else {
            None
        };

        loop {
            match self.path[idx].state {
                PathState::Wait => return PacketStatus::Done,
                PathState::Idle => {
                    let Some((lo, hi)) = self.path[idx].buffer.peek_qword() else {
                        return PacketStatus::NeedData;
                    };
                    self.path[idx].buffer.consume(16);
                    let tag = GifTag::parse(lo, hi);
                    self.path[idx].tag = tag;
                    self.path[idx].nloop = tag.nloop;
                    self.path[idx].reg_idx = 0;
                    if tag.nloop == 0 {
                        // Degenerate tag: nothing to transfer
                        if tag.eop {
                            return PacketStatus::Done;
                        }
                        continue;
                    }
                    if tag.flag() == GifFlag::Packed && tag.pre {
                        gs.write_register(reg::PRIM, tag.prim, r);
                    }
                    self.path[idx].state = match tag.flag() {
                        GifFlag::Packed => PathState::Packed,
                        GifFlag::Reglist => PathState::Reglist,
                        GifFlag::Image => PathState::Image,
                    };
                }
                PathState::Packed => {
                    if self.path[idx].nloop == 0 {
                        self.path[idx].state = PathState::Idle;
                        if self.path[idx].tag.eop {
                            return PacketStatus::Done;
                        }
                        continue;
                    }
                    let Some((lo, hi)) = self.path[idx].buffer.peek_qword() else {
                        return PacketStatus::NeedData;
                    };
                    self.path[idx].buffer.consume(16);
                    self.path[idx].bytes_consumed += 16;
                    let regd = self.path[idx].tag.reg(self.path[idx].reg_idx);
                    self.advance_packed_cursor(idx);
                    if regd == reg::AD {
                        let addr = (hi & 0xFF) as u8;
                        if self.handle_ad(gs, intc, r, addr, lo) {
                            return PacketStatus::Stalled;
                        }
                    } else {
                        gs.write_packed(regd, lo, hi, r);
                    }
                }
                PathState::Reglist => {
                    if self.path[idx].nloop == 0 {
                        self.path[idx].state = PathState::Idle;
                        if self.path[idx].tag.eop {
                            return PacketStatus::Done;
                        }
                        continue;
                    }
                    let Some((lo, hi)) = self.path[idx].buffer.peek_qword() else {
                        return PacketStatus::NeedData;
                    };
                    self.path[idx].buffer.consume(16);
                    self.path[idx].bytes_consumed += 16;
                    for half in [lo, hi] {
                        if self.path[idx].nloop == 0 {
                            // Odd register count: the pad half is dropped
                            break;
                        }
                        let regd = self.path[idx].tag.reg(self.path[idx].reg_idx);
                        // 4-bit descriptors cannot encode A+D; 0xE is a nop
                        if regd != reg::AD && regd != reg::NOP {
                            gs.write_register(regd, half, r);
                        }
                        self.advance_packed_cursor(idx);
                    }
                }
                PathState::Image => {
                    if self.path[idx].nloop == 0 {
                        self.path[idx].state = PathState::Idle;
                        if self.path[idx].tag.eop {
                            return PacketStatus::Done;
                        }
                        continue;
                    }
                    let avail = (self.path[idx].buffer.len() / 16) as u32;
                    if avail == 0 {
                        return PacketStatus::NeedData;
                    }
                    let mut take = avail.min(self.path[idx].nloop);
                    if let Some(b) = image_budget {
                        if b == 0 {
                            return PacketStatus::Sliced;
                        }
                        take = take.min(b);
                    }
                    let n = take as usize * 16;
                    gs.write_image(self.path[idx].buffer.peek_bytes(n), r);
                    self.path[idx].buffer.consume(n);
                    self.path[idx].bytes_consumed += n as u64;
                    self.path[idx].nloop -= take;
                    if let Some(b) = image_budget.as_mut() {
                        *b -= take;
                        if *b == 0 && self.path[idx].nloop > 0 {
                            return PacketStatus::Sliced;
                        }
                    }
                }
            }
        }
    }

    fn advance_packed_cursor(&mut self, idx: usize) {
        let p = &mut self.path[idx];
        p.reg_idx += 1;
        if p.reg_idx >= p.tag.nreg {
            p.reg_idx = 0;
            p.nloop -= 1;
        }
    }

    /// A+D qword: SIGNAL/FINISH/LABEL live here; anything else is a plain
    /// register write. Returns true when the path must stall.
    fn handle_ad(
        &mut self,
        gs: &mut Gs,
        intc: &mut Intc,
        r: &mut dyn RendererBackend,
        addr: u8,
        data: u64,
    ) -> bool {
        match addr {
            reg::SIGNAL => {
                if gs.signal_pending() {
                    // Previous SIGNAL unacknowledged: queue and suspend
                    self.signal_queued = Some(data);
                    true
                } else {
                    apply_signal(gs, intc, data);
                    false
                }
            }
            reg::FINISH => {
                self.finish_latched = true;
                false
            }
            reg::LABEL => {
                let mask = (data >> 32) as u32;
                gs.lblid = (gs.lblid & !mask) | (data as u32 & mask);
                false
            }
            _ => {
                gs.write_register(addr, data, r);
                false
            }
        }
    }

    /// Promote a latched FINISH to the CSR exactly once per drain, never
    /// while packets are still in flight.
    pub fn check_finish(&mut self, gs: &mut Gs, intc: &mut Intc) {
        if self.finish_latched
            && self.apath == 0
            && self.path.iter().all(|p| p.is_done())
            && !gs.finish_pending()
        {
            self.finish_latched = false;
            gs.set_finish(intc);
        }
    }
}

impl Default for GifUnit {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_signal(gs: &mut Gs, intc: &mut Intc, data: u64) {
    let mask = (data >> 32) as u32;
    gs.sigid = (gs.sigid & !mask) | (data as u32 & mask);
    gs.set_signal(intc);
}
