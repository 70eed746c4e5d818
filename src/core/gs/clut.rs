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

//! CLUT cache and the TEX0 write path
//!
//! TEX0 writes are special-cased: besides the normal flush-before-apply
//! check, the CLD field decides whether the on-chip palette buffer reloads
//! from local memory, optionally recording the load address in one of two
//! compare registers (CBP0/CBP1) used by the conditional load modes.
//!
//! TEX0 also gets the documented hardware sanitization: TW/TH clamp to 10
//! (1024 texels is the silicon maximum) and TBW is forced even for the
//! 4/8-bit indexed formats.

use serde::{Deserialize, Serialize};

use super::super::renderer::RendererBackend;
use super::registers::Tex0;
use super::Gs;

/// On-chip CLUT buffer: 256 entries of up to 32 bits
pub const CLUT_SIZE: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClutCache {
    pub data: Vec<u8>,
    /// Compare registers recorded by CLD modes 2/4 and 3/5
    pub cbp0: u32,
    pub cbp1: u32,
    /// Source of the last load, for diagnostics
    pub loaded_cbp: u32,
}

impl ClutCache {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; CLUT_SIZE],
            cbp0: 0,
            cbp1: 0,
            loaded_cbp: 0,
        }
    }

    /// CLD decode: does this TEX0 write reload the CLUT buffer?
    pub fn write_test(&self, tex0: Tex0) -> bool {
        match tex0.cld() {
            0 => false,
            1 | 2 | 3 => true,
            4 => tex0.cbp() != self.cbp0,
            5 => tex0.cbp() != self.cbp1,
            // 6/7 are reserved; hardware does not load
            _ => false,
        }
    }

    /// Record the compare register named by CLD after a load decision
    fn record(&mut self, tex0: Tex0) {
        match tex0.cld() {
            2 | 4 => self.cbp0 = tex0.cbp(),
            3 | 5 => self.cbp1 = tex0.cbp(),
            _ => {}
        }
    }
}

impl Default for ClutCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Gs {
    /// Sanitize and apply a TEX0 (or merged TEX2) write to context `i`.
    pub(crate) fn apply_tex0(&mut self, i: usize, raw: u64, r: &mut dyn RendererBackend) {
        let mut tex0 = Tex0(raw);
        if tex0.tw() > 10 {
            tex0.set_tw(10);
        }
        if tex0.th() > 10 {
            tex0.set_th(10);
        }
        if tex0.is_indexed() && tex0.tbw() & 1 != 0 {
            tex0.set_tbw(tex0.tbw() & !1);
        }

        let reload = tex0.is_indexed() && self.clut.write_test(tex0);
        let changed = tex0 != self.ctx[i].tex0 && i == self.active_ctx();
        if (changed || reload) && self.pending_prims() {
            self.flush_prim(r);
        }
        self.ctx[i].tex0 = tex0;

        if reload {
            self.load_clut(tex0);
        }
        if tex0.is_indexed() {
            self.clut.record(tex0);
        }
    }

    /// Copy palette data from local memory into the CLUT buffer. 16-bit
    /// CLUT formats halve the footprint; CSA offsets into the buffer in
    /// 16-entry slots.
    fn load_clut(&mut self, tex0: Tex0) {
        // PSMCT32/24 palettes take 4 bytes per entry, 16-bit formats 2
        let entry_bytes: usize = if tex0.cpsm() < 2 { 4 } else { 2 };
        let entries: usize = match tex0.psm() {
            0x14 | 0x24 | 0x2C => 16, // 4-bit indexed
            _ => 256,
        };
        let src = tex0.cbp() as usize * 256;
        let dst = tex0.csa() as usize * 16 * entry_bytes;
        for n in 0..entries * entry_bytes {
            let d = (dst + n) % CLUT_SIZE;
            self.clut.data[d] = self.vram[(src + n) % super::LOCAL_MEM_SIZE];
        }
        self.clut.loaded_cbp = tex0.cbp();
    }
}

#[cfg(test)]
mod tests {
    use super::super::registers::{reg, Tex0};
    use super::super::Gs;
    use super::*;
    use crate::core::renderer::NullRenderer;

    fn tex0_raw(psm: u64, cbp: u64, cld: u64) -> u64 {
        (psm << 20) | (cbp << 37) | (cld << 61)
    }

    #[test]
    fn test_write_test_cld_modes() {
        let mut clut = ClutCache::new();
        clut.cbp0 = 0x40;
        clut.cbp1 = 0x80;

        assert!(!clut.write_test(Tex0(tex0_raw(0x13, 0x40, 0))));
        assert!(clut.write_test(Tex0(tex0_raw(0x13, 0x40, 1))));
        // CLD 4: load only when CBP differs from CBP0
        assert!(!clut.write_test(Tex0(tex0_raw(0x13, 0x40, 4))));
        assert!(clut.write_test(Tex0(tex0_raw(0x13, 0x41, 4))));
        // CLD 5 compares CBP1
        assert!(!clut.write_test(Tex0(tex0_raw(0x13, 0x80, 5))));
        assert!(clut.write_test(Tex0(tex0_raw(0x13, 0x40, 5))));
        // Reserved modes never load
        assert!(!clut.write_test(Tex0(tex0_raw(0x13, 0x40, 6))));
    }

    #[test]
    fn test_tw_th_clamped() {
        let mut gs = Gs::new();
        let mut r = NullRenderer::new();
        let raw = (12u64 << 26) | (15u64 << 30);
        gs.write_register(reg::TEX0_1, raw, &mut r);
        assert_eq!(gs.ctx[0].tex0.tw(), 10);
        assert_eq!(gs.ctx[0].tex0.th(), 10);
    }

    #[test]
    fn test_odd_tbw_forced_even_for_indexed() {
        let mut gs = Gs::new();
        let mut r = NullRenderer::new();
        // PSMT8 with TBW=5
        let raw = (5u64 << 14) | (0x13u64 << 20);
        gs.write_register(reg::TEX0_1, raw, &mut r);
        assert_eq!(gs.ctx[0].tex0.tbw(), 4);

        // PSMCT32 keeps its odd width
        let raw = 5u64 << 14;
        gs.write_register(reg::TEX0_1, raw, &mut r);
        assert_eq!(gs.ctx[0].tex0.tbw(), 5);
    }

    #[test]
    fn test_clut_reload_copies_from_vram() {
        let mut gs = Gs::new();
        let mut r = NullRenderer::new();
        let cbp = 0x20usize;
        for n in 0..CLUT_SIZE {
            gs.vram[cbp * 256 + n] = (n & 0xFF) as u8;
        }
        // PSMT8, 32-bit CLUT, CLD=1
        gs.write_register(reg::TEX0_1, tex0_raw(0x13, cbp as u64, 1), &mut r);
        assert_eq!(gs.clut.loaded_cbp, 0x20);
        assert_eq!(&gs.clut.data[..8], &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_cld_records_compare_registers() {
        let mut gs = Gs::new();
        let mut r = NullRenderer::new();
        gs.write_register(reg::TEX0_1, tex0_raw(0x13, 0x44, 2), &mut r);
        assert_eq!(gs.clut.cbp0, 0x44);
        gs.write_register(reg::TEX0_1, tex0_raw(0x13, 0x55, 3), &mut r);
        assert_eq!(gs.clut.cbp1, 0x55);

        // A second CLD=4 write at the recorded address skips the load
        let before = gs.clut.loaded_cbp;
        gs.write_register(reg::TEX0_1, tex0_raw(0x13, 0x44, 4), &mut r);
        assert_eq!(gs.clut.loaded_cbp, before);
    }

    #[test]
    fn test_tex2_touches_only_clut_fields() {
        let mut gs = Gs::new();
        let mut r = NullRenderer::new();
        // Full TEX0 first: tbp0, tbw, tw/th
        let base = 0x300u64 | (4u64 << 14) | (0x13u64 << 20) | (6u64 << 26) | (6u64 << 30);
        gs.write_register(reg::TEX0_1, base, &mut r);
        // TEX2 write changes CBP only
        gs.write_register(reg::TEX2_1, tex0_raw(0x13, 0x70, 1), &mut r);
        let t = gs.ctx[0].tex0;
        assert_eq!(t.tbp0(), 0x300);
        assert_eq!(t.tw(), 6);
        assert_eq!(t.cbp(), 0x70);
        assert_eq!(gs.clut.loaded_cbp, 0x70);
    }
}
