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

//! Graphics Synthesizer register state
//!
//! Owns the GS's 4MB local memory, the privileged CSR/IMR registers, and the
//! full drawing environment (two contexts plus globals). Register writes
//! arrive here already demultiplexed by the GIF; the one hard ordering rule
//! is flush-before-apply: a write that changes state affecting queued but
//! undrawn primitives must rasterize the batch with the OLD value first.
//!
//! ## References
//!
//! - GS User's Manual, chapters "Drawing" and "Privileged Registers"
//! - ps2tek: GS

pub mod clut;
pub mod context;
pub mod registers;
pub mod transfer;
pub mod vertex;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::core::intc::{lines, Intc};
use crate::core::renderer::RendererBackend;

use self::clut::ClutCache;
use self::context::DrawingContext;
use self::registers::{reg, BitBltBuf, Prim, Texa, TexClut, TrxPos, TrxReg};
use self::transfer::TransferState;
use self::vertex::VertexBatch;

/// GS local memory size (4MB)
pub const LOCAL_MEM_SIZE: usize = 4 * 1024 * 1024;

bitflags! {
    /// CSR: control/status. The low 5 bits are event latches cleared by
    /// writing 1; FIELD/NFIELD are read-only display status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Csr: u32 {
        const SIGNAL = 1 << 0;
        const FINISH = 1 << 1;
        const HSINT = 1 << 2;
        const VSINT = 1 << 3;
        const EDWINT = 1 << 4;
        const FLUSH = 1 << 8;
        const RESET = 1 << 9;
        const NFIELD = 1 << 12;
        const FIELD = 1 << 13;
        /// FIFO status "empty" (the core never buffers, so always set)
        const FIFO_EMPTY = 1 << 14;
        const FIFO_FULL = 1 << 15;
    }
}

bitflags! {
    /// IMR: a set bit masks the corresponding CSR event from raising the
    /// GS interrupt line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Imr: u32 {
        const SIGMSK = 1 << 8;
        const FINISHMSK = 1 << 9;
        const HSMSK = 1 << 10;
        const VSMSK = 1 << 11;
        const EDWMSK = 1 << 12;
    }
}

impl Default for Imr {
    fn default() -> Self {
        Imr::all()
    }
}

/// Side effects of a CSR write the caller must mirror into collaborators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsrWriteEffects {
    /// The game acknowledged a SIGNAL; the GIF may release a queued one.
    pub signal_cleared: bool,
    /// RESET was written; GIF paths and the VU bridge must also reset.
    pub reset: bool,
}

/// Latched data registers filled by RGBAQ/ST/UV/FOG ahead of a vertex kick
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VertexLatch {
    pub rgba: u32,
    pub q: f32,
    pub s: f32,
    pub t: f32,
    pub u: u16,
    pub v: u16,
    pub fog: u8,
    /// XYZ of the kick in progress
    pub x: u16,
    pub y: u16,
    pub z: u32,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Gs {
    /// Local memory image, exclusively owned here
    pub vram: Box<[u8]>,

    // Privileged registers
    pub csr: Csr,
    pub imr: Imr,
    /// SIGLBLID halves updated by SIGNAL/LABEL masked merges
    pub sigid: u32,
    pub lblid: u32,

    // Global environment
    pub prim: Prim,
    pub prmode: Prim,
    pub prmodecont: bool,
    pub ctx: [DrawingContext; 2],
    pub texclut: TexClut,
    pub scanmsk: u64,
    pub texa: Texa,
    pub fogcol: u64,
    pub dimx: u64,
    pub dthe: bool,
    pub colclamp: bool,
    pub pabe: bool,

    // Transfer environment
    pub bitbltbuf: BitBltBuf,
    pub trxpos: TrxPos,
    pub trxreg: TrxReg,

    pub(crate) latch: VertexLatch,
    pub(crate) batch: VertexBatch,
    pub(crate) transfer: TransferState,
    pub(crate) clut: ClutCache,

    /// Flush eagerly when a textured primitive samples its own frame buffer
    pub auto_flush: bool,
    /// Flushes performed since construction, exposed for diagnostics
    pub flush_count: u64,
}

impl Gs {
    pub fn new() -> Self {
        Self {
            vram: vec![0u8; LOCAL_MEM_SIZE].into_boxed_slice(),
            csr: Csr::FIFO_EMPTY,
            imr: Imr::all(),
            sigid: 0,
            lblid: 0,
            prim: Prim(0),
            prmode: Prim(0),
            prmodecont: true,
            ctx: [DrawingContext::default(), DrawingContext::default()],
            texclut: TexClut(0),
            scanmsk: 0,
            texa: Texa(0),
            fogcol: 0,
            dimx: 0,
            dthe: false,
            colclamp: false,
            pabe: false,
            bitbltbuf: BitBltBuf(0),
            trxpos: TrxPos(0),
            trxreg: TrxReg(0),
            latch: VertexLatch::default(),
            batch: VertexBatch::new(),
            transfer: TransferState::default(),
            clut: ClutCache::new(),
            auto_flush: false,
            flush_count: 0,
        }
    }

    /// Drawing-environment reset, shared by construction and CSR RESET.
    /// Local memory contents survive a soft reset on hardware.
    fn reset_environment(&mut self) {
        self.csr = Csr::FIFO_EMPTY;
        self.prim = Prim(0);
        self.prmode = Prim(0);
        self.prmodecont = true;
        self.ctx = [DrawingContext::default(), DrawingContext::default()];
        self.latch = VertexLatch::default();
        self.batch = VertexBatch::new();
        self.transfer = TransferState::default();
    }

    // ------------------------------------------------------------------
    // Privileged register access
    // ------------------------------------------------------------------

    pub fn read_csr(&self) -> u64 {
        // Revision/ID in bits 16-31, matching retail silicon
        u64::from(self.csr.bits()) | (0x1B << 16) | (0x55 << 24)
    }

    pub fn write_csr(
        &mut self,
        value: u64,
        r: &mut dyn RendererBackend,
    ) -> CsrWriteEffects {
        let v = Csr::from_bits_truncate(value as u32);
        let mut fx = CsrWriteEffects::default();

        if v.contains(Csr::RESET) {
            self.reset_environment();
            r.reset_device();
            fx.reset = true;
            return fx;
        }

        // Write-1-to-clear event latches
        if v.contains(Csr::SIGNAL) && self.csr.contains(Csr::SIGNAL) {
            self.csr.remove(Csr::SIGNAL);
            fx.signal_cleared = true;
        }
        for bit in [Csr::FINISH, Csr::HSINT, Csr::VSINT, Csr::EDWINT] {
            if v.contains(bit) {
                self.csr.remove(bit);
            }
        }
        fx
    }

    pub fn read_imr(&self) -> u64 {
        u64::from(self.imr.bits())
    }

    /// Unmasking an already-latched event retriggers the GS interrupt.
    pub fn write_imr(&mut self, value: u64, intc: &mut Intc) {
        self.imr = Imr::from_bits_truncate(value as u32);
        let unmasked_pending = (self.csr.contains(Csr::SIGNAL) && !self.imr.contains(Imr::SIGMSK))
            || (self.csr.contains(Csr::FINISH) && !self.imr.contains(Imr::FINISHMSK))
            || (self.csr.contains(Csr::HSINT) && !self.imr.contains(Imr::HSMSK))
            || (self.csr.contains(Csr::VSINT) && !self.imr.contains(Imr::VSMSK))
            || (self.csr.contains(Csr::EDWINT) && !self.imr.contains(Imr::EDWMSK));
        if unmasked_pending {
            intc.raise(lines::GS);
        }
    }

    fn raise_event(&mut self, bit: Csr, mask: Imr, intc: &mut Intc) {
        if !self.csr.contains(bit) {
            self.csr.insert(bit);
            if !self.imr.contains(mask) {
                intc.raise(lines::GS);
            }
        }
    }

    /// Hblank edge reached the GS: latch HSINT
    pub fn raise_hsync_irq(&mut self, intc: &mut Intc) {
        self.raise_event(Csr::HSINT, Imr::HSMSK, intc);
    }

    /// GS-side vsync acknowledge: toggle FIELD (interlaced only), latch VSINT
    pub fn vsync_ack(&mut self, interlaced: bool, intc: &mut Intc) {
        if interlaced {
            self.csr.toggle(Csr::FIELD);
        }
        self.raise_event(Csr::VSINT, Imr::VSMSK, intc);
    }

    pub fn csr_field(&self) -> bool {
        self.csr.contains(Csr::FIELD)
    }

    /// SIGNAL event from the GIF after SIGID has been merged
    pub fn set_signal(&mut self, intc: &mut Intc) {
        self.raise_event(Csr::SIGNAL, Imr::SIGMSK, intc);
    }

    pub fn signal_pending(&self) -> bool {
        self.csr.contains(Csr::SIGNAL)
    }

    /// FINISH promotion, called once per flush window by the GIF
    pub fn set_finish(&mut self, intc: &mut Intc) {
        self.raise_event(Csr::FINISH, Imr::FINISHMSK, intc);
    }

    pub fn finish_pending(&self) -> bool {
        self.csr.contains(Csr::FINISH)
    }

    // ------------------------------------------------------------------
    // Environment helpers
    // ------------------------------------------------------------------

    /// PRIM, or PRIM's type combined with PRMODE's attributes when
    /// PRMODECONT selects PRMODE.
    pub fn effective_prim(&self) -> Prim {
        if self.prmodecont {
            self.prim
        } else {
            Prim((self.prim.0 & 7) | (self.prmode.0 & !7))
        }
    }

    /// Context the next primitive draws with
    pub fn active_ctx(&self) -> usize {
        self.effective_prim().ctxt()
    }

    pub fn pending_prims(&self) -> bool {
        !self.batch.idx.is_empty()
    }

    /// Commit any outstanding transfer write and rasterize the batch.
    pub fn flush(&mut self, r: &mut dyn RendererBackend) {
        self.commit_transfer(r);
        self.flush_prim(r);
    }

    /// Flush iff the batch is non-empty and `changed` holds. Every
    /// context-affecting register write funnels through here so the
    /// flush-before-apply ordering lives in exactly one place.
    fn flush_on_change(&mut self, changed: bool, r: &mut dyn RendererBackend) {
        if changed && self.pending_prims() {
            self.flush_prim(r);
        }
    }

    // ------------------------------------------------------------------
    // Register write dispatch
    // ------------------------------------------------------------------

    /// Apply one general register write (REGLIST or A+D addressing).
    /// Unknown addresses are hardware no-ops.
    pub fn write_register(&mut self, id: u8, value: u64, r: &mut dyn RendererBackend) {
        match id {
            reg::PRIM => {
                let new = Prim(value & 0x7FF);
                self.flush_on_change(new != self.prim, r);
                self.prim = new;
                // A PRIM write restarts primitive assembly
                self.batch.restart();
            }
            reg::RGBAQ => {
                self.latch.rgba = value as u32;
                self.latch.q = f32::from_bits((value >> 32) as u32);
            }
            reg::ST => {
                self.latch.s = f32::from_bits(value as u32);
                self.latch.t = f32::from_bits((value >> 32) as u32);
            }
            reg::UV => {
                self.latch.u = (value & 0x3FFF) as u16;
                self.latch.v = ((value >> 16) & 0x3FFF) as u16;
            }
            reg::FOG => {
                self.latch.fog = (value >> 56) as u8;
            }
            reg::XYZF2 | reg::XYZF3 => {
                self.latch.x = value as u16;
                self.latch.y = (value >> 16) as u16;
                self.latch.z = ((value >> 32) & 0x00FF_FFFF) as u32;
                self.latch.fog = (value >> 56) as u8;
                self.vertex_kick(id == reg::XYZF3, r);
            }
            reg::XYZ2 | reg::XYZ3 => {
                self.latch.x = value as u16;
                self.latch.y = (value >> 16) as u16;
                self.latch.z = (value >> 32) as u32;
                self.vertex_kick(id == reg::XYZ3, r);
            }
            reg::PRMODECONT => {
                let new = value & 1 != 0;
                self.flush_on_change(new != self.prmodecont, r);
                self.prmodecont = new;
            }
            reg::PRMODE => {
                let new = Prim(value & 0x7F8);
                self.flush_on_change(!self.prmodecont && new != self.prmode, r);
                self.prmode = new;
            }
            reg::TEX0_1 | reg::TEX0_2 => {
                self.apply_tex0((id - reg::TEX0_1) as usize, value, r);
            }
            reg::TEX2_1 | reg::TEX2_2 => {
                // TEX2 rewrites only the CLUT-related subset of TEX0
                const TEX2_MASK: u64 = 0xFFFF_FFE0_03F0_0000;
                let i = (id - reg::TEX2_1) as usize;
                let merged = (self.ctx[i].tex0.0 & !TEX2_MASK) | (value & TEX2_MASK);
                self.apply_tex0(i, merged, r);
            }
            reg::TEX1_1 | reg::TEX1_2 => {
                let i = (id - reg::TEX1_1) as usize;
                let new = registers::Tex1(value);
                self.flush_on_change(i == self.active_ctx() && new != self.ctx[i].tex1, r);
                self.ctx[i].tex1 = new;
            }
            reg::CLAMP_1 | reg::CLAMP_2 => {
                let i = (id - reg::CLAMP_1) as usize;
                let new = registers::Clamp(value);
                self.flush_on_change(i == self.active_ctx() && new != self.ctx[i].clamp, r);
                self.ctx[i].clamp = new;
            }
            reg::XYOFFSET_1 | reg::XYOFFSET_2 => {
                let i = (id - reg::XYOFFSET_1) as usize;
                let new = registers::XyOffset(value);
                self.flush_on_change(i == self.active_ctx() && new != self.ctx[i].xyoffset, r);
                self.ctx[i].xyoffset = new;
                self.ctx[i].update_scissor();
            }
            reg::SCISSOR_1 | reg::SCISSOR_2 => {
                let i = (id - reg::SCISSOR_1) as usize;
                let new = registers::Scissor(value);
                self.flush_on_change(i == self.active_ctx() && new != self.ctx[i].scissor, r);
                self.ctx[i].scissor = new;
                self.ctx[i].update_scissor();
            }
            reg::ALPHA_1 | reg::ALPHA_2 => {
                let i = (id - reg::ALPHA_1) as usize;
                let new = registers::Alpha(value);
                self.flush_on_change(i == self.active_ctx() && new != self.ctx[i].alpha, r);
                self.ctx[i].alpha = new;
            }
            reg::TEST_1 | reg::TEST_2 => {
                let i = (id - reg::TEST_1) as usize;
                let new = registers::Test(value);
                self.flush_on_change(i == self.active_ctx() && new != self.ctx[i].test, r);
                self.ctx[i].test = new;
            }
            reg::FRAME_1 | reg::FRAME_2 => {
                let i = (id - reg::FRAME_1) as usize;
                let new = registers::Frame(value);
                self.flush_on_change(i == self.active_ctx() && new != self.ctx[i].frame, r);
                self.ctx[i].frame = new;
            }
            reg::ZBUF_1 | reg::ZBUF_2 => {
                let i = (id - reg::ZBUF_1) as usize;
                let new = registers::Zbuf(value);
                self.flush_on_change(i == self.active_ctx() && new != self.ctx[i].zbuf, r);
                self.ctx[i].zbuf = new;
            }
            reg::FBA_1 | reg::FBA_2 => {
                let i = (id - reg::FBA_1) as usize;
                let new = value & 1 != 0;
                self.flush_on_change(i == self.active_ctx() && new != self.ctx[i].fba, r);
                self.ctx[i].fba = new;
            }
            reg::MIPTBP1_1 | reg::MIPTBP1_2 => {
                let i = (id - reg::MIPTBP1_1) as usize;
                self.flush_on_change(i == self.active_ctx() && value != self.ctx[i].miptbp1, r);
                self.ctx[i].miptbp1 = value;
            }
            reg::MIPTBP2_1 | reg::MIPTBP2_2 => {
                let i = (id - reg::MIPTBP2_1) as usize;
                self.flush_on_change(i == self.active_ctx() && value != self.ctx[i].miptbp2, r);
                self.ctx[i].miptbp2 = value;
            }
            reg::TEXCLUT => {
                let new = TexClut(value);
                self.flush_on_change(new != self.texclut, r);
                self.texclut = new;
            }
            reg::SCANMSK => {
                let new = value & 3;
                self.flush_on_change(new != self.scanmsk, r);
                self.scanmsk = new;
            }
            reg::TEXA => {
                let new = Texa(value);
                self.flush_on_change(new != self.texa, r);
                self.texa = new;
            }
            reg::FOGCOL => {
                let new = value & 0x00FF_FFFF;
                self.flush_on_change(new != self.fogcol, r);
                self.fogcol = new;
            }
            reg::DIMX => {
                self.flush_on_change(value != self.dimx, r);
                self.dimx = value;
            }
            reg::DTHE => {
                let new = value & 1 != 0;
                self.flush_on_change(new != self.dthe, r);
                self.dthe = new;
            }
            reg::COLCLAMP => {
                let new = value & 1 != 0;
                self.flush_on_change(new != self.colclamp, r);
                self.colclamp = new;
            }
            reg::PABE => {
                let new = value & 1 != 0;
                self.flush_on_change(new != self.pabe, r);
                self.pabe = new;
            }
            reg::TEXFLUSH => {
                // Texture-cache synchronization point; no architectural state
            }
            reg::BITBLTBUF => {
                self.bitbltbuf = BitBltBuf(value);
            }
            reg::TRXPOS => {
                self.trxpos = TrxPos(value);
            }
            reg::TRXREG => {
                self.trxreg = TrxReg(value);
            }
            reg::TRXDIR => {
                self.begin_transfer((value & 3) as u32, r);
            }
            reg::HWREG => {
                let bytes = value.to_le_bytes();
                self.write_image(&bytes, r);
            }
            _ => {
                // Reserved / unknown: hardware tolerates these silently
                log::trace!("GS write to unknown register {:#04x}", id);
            }
        }
    }

    /// Apply one PACKED-mode qword for register slot `id`. PACKED encodings
    /// differ from the A+D 64-bit layouts for the vertex-data registers.
    /// A+D (0x0E) must be intercepted by the caller so SIGNAL/FINISH/LABEL
    /// reach the GIF latches; anything routed here is a plain write.
    pub fn write_packed(&mut self, id: u8, lo: u64, hi: u64, r: &mut dyn RendererBackend) {
        match id {
            reg::PRIM => self.write_register(reg::PRIM, lo & 0x7FF, r),
            reg::RGBAQ => {
                // R/G/B/A in byte lanes 0/4/8/12; Q comes from the ST latch
                let rr = lo & 0xFF;
                let g = (lo >> 32) & 0xFF;
                let b = hi & 0xFF;
                let a = (hi >> 32) & 0xFF;
                self.latch.rgba = (rr | (g << 8) | (b << 16) | (a << 24)) as u32;
            }
            reg::ST => {
                self.latch.s = f32::from_bits(lo as u32);
                self.latch.t = f32::from_bits((lo >> 32) as u32);
                // Packed ST also carries Q
                self.latch.q = f32::from_bits(hi as u32);
            }
            reg::UV => {
                self.latch.u = (lo & 0x3FFF) as u16;
                self.latch.v = ((lo >> 32) & 0x3FFF) as u16;
            }
            reg::XYZF2 => {
                self.latch.x = lo as u16;
                self.latch.y = (lo >> 32) as u16;
                self.latch.z = ((hi >> 4) & 0x00FF_FFFF) as u32;
                self.latch.fog = ((hi >> 36) & 0xFF) as u8;
                let adc = hi & (1 << 47) != 0;
                self.vertex_kick(adc, r);
            }
            reg::XYZ2 => {
                self.latch.x = lo as u16;
                self.latch.y = (lo >> 32) as u16;
                self.latch.z = hi as u32;
                let adc = hi & (1 << 47) != 0;
                self.vertex_kick(adc, r);
            }
            reg::FOG => {
                self.latch.fog = ((hi >> 36) & 0xFF) as u8;
            }
            reg::NOP => {}
            _ => {
                // Remaining registers use their A+D layout in the low qword
                self.write_register(id, lo, r);
            }
        }
    }
}

impl Default for Gs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::renderer::NullRenderer;

    fn setup() -> (Gs, NullRenderer, Intc) {
        (Gs::new(), NullRenderer::new(), Intc::new())
    }

    #[test]
    fn test_csr_events_write_1_to_clear() {
        let (mut gs, mut r, mut intc) = setup();
        gs.raise_hsync_irq(&mut intc);
        gs.vsync_ack(false, &mut intc);
        assert!(gs.csr.contains(Csr::HSINT));
        assert!(gs.csr.contains(Csr::VSINT));

        // Clearing only HSINT leaves VSINT latched
        gs.write_csr(Csr::HSINT.bits() as u64, &mut r);
        assert!(!gs.csr.contains(Csr::HSINT));
        assert!(gs.csr.contains(Csr::VSINT));
    }

    #[test]
    fn test_csr_field_toggles_only_interlaced() {
        let (mut gs, _r, mut intc) = setup();
        assert!(!gs.csr_field());
        gs.vsync_ack(false, &mut intc);
        assert!(!gs.csr_field());
        gs.write_csr(Csr::VSINT.bits() as u64, &mut NullRenderer::new());
        gs.vsync_ack(true, &mut intc);
        assert!(gs.csr_field());
        gs.vsync_ack(true, &mut intc);
        assert!(!gs.csr_field());
    }

    #[test]
    fn test_imr_masks_gs_interrupt() {
        let (mut gs, _r, mut intc) = setup();
        // All masked by default: event latches but no INTC line
        gs.vsync_ack(false, &mut intc);
        assert!(!intc.line_pending(lines::GS));

        // Unmasking a latched event retriggers
        gs.write_imr(0, &mut intc);
        assert!(intc.line_pending(lines::GS));
    }

    #[test]
    fn test_vsint_unmasked_raises_intc() {
        let (mut gs, _r, mut intc) = setup();
        gs.imr = Imr::empty();
        gs.vsync_ack(false, &mut intc);
        assert!(intc.line_pending(lines::GS));
    }

    #[test]
    fn test_csr_reset_clears_environment() {
        let (mut gs, mut r, _intc) = setup();
        gs.write_register(reg::PRIM, 3, &mut r);
        gs.write_register(reg::XYZ2, 0, &mut r);
        let fx = gs.write_csr(Csr::RESET.bits() as u64, &mut r);
        assert!(fx.reset);
        assert_eq!(gs.batch.tail, 0);
        assert_eq!(gs.prim, Prim(0));
    }

    #[test]
    fn test_csr_signal_ack_reports_effect() {
        let (mut gs, mut r, mut intc) = setup();
        gs.set_signal(&mut intc);
        let fx = gs.write_csr(Csr::SIGNAL.bits() as u64, &mut r);
        assert!(fx.signal_cleared);
        // Acking again with nothing latched reports nothing
        let fx = gs.write_csr(Csr::SIGNAL.bits() as u64, &mut r);
        assert!(!fx.signal_cleared);
    }

    #[test]
    fn test_effective_prim_prmode() {
        let mut gs = Gs::new();
        gs.prim = Prim(4 | 0x10); // triangle strip, textured
        gs.prmode = Prim(0x200 | 0x40); // context 1, alpha blend
        gs.prmodecont = false;
        let eff = gs.effective_prim();
        assert_eq!(eff.prim_type(), registers::PrimType::TriangleStrip);
        assert!(!eff.tme());
        assert!(eff.abe());
        assert_eq!(eff.ctxt(), 1);

        gs.prmodecont = true;
        let eff = gs.effective_prim();
        assert!(eff.tme());
        assert_eq!(eff.ctxt(), 0);
    }

    #[test]
    fn test_unknown_register_is_noop() {
        let (mut gs, mut r, _intc) = setup();
        gs.write_register(0x7F, 0xDEAD_BEEF, &mut r);
        assert_eq!(r.draw_calls, 0);
    }

    #[test]
    fn test_packed_rgbaq_takes_q_from_st() {
        let (mut gs, mut r, _intc) = setup();
        let q = 2.5f32;
        gs.write_packed(reg::ST, 0, u64::from(q.to_bits()), &mut r);
        gs.write_packed(
            reg::RGBAQ,
            0x10 | (0x20u64 << 32),
            0x30 | (0x40u64 << 32),
            &mut r,
        );
        assert_eq!(gs.latch.rgba, 0x4030_2010);
        assert_eq!(gs.latch.q, 2.5);
    }

    #[test]
    fn test_packed_xyzf2_field_extraction() {
        let (mut gs, mut r, _intc) = setup();
        gs.write_register(reg::PRIM, 0, &mut r); // points
        let lo = 0x0123u64 | (0x0456u64 << 32);
        let hi = (0xABCDEFu64 << 4) | (0x7Fu64 << 36) | (1u64 << 47);
        gs.write_packed(reg::XYZF2, lo, hi, &mut r);
        assert_eq!(gs.latch.x, 0x0123);
        assert_eq!(gs.latch.y, 0x0456);
        assert_eq!(gs.latch.z, 0xABCDEF);
        assert_eq!(gs.latch.fog, 0x7F);
        // ADC set: vertex skipped, nothing drawn
        assert_eq!(r.draw_calls, 0);
    }
}
