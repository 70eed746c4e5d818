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

//! Local memory transfers
//!
//! BITBLTBUF/TRXPOS/TRXREG describe a rectangle; writing TRXDIR arms the
//! transfer. Host→local data arrives in arbitrary-sized chunks through GIF
//! IMAGE packets (or A+D HWREG writes) and may split a pixel across chunk
//! boundaries, so a small remainder buffer carries the partial pixel between
//! calls. Pixels are committed to local memory as soon as they complete;
//! excess data beyond the rectangle is dropped like the hardware does.
//!
//! Addressing uses a linear row-major layout per buffer width. The GS's
//! block-swizzled layouts are a renderer concern; the core only guarantees
//! that a transfer read observes what a transfer write stored.

use serde::{Deserialize, Serialize};

use super::super::renderer::{DirtyRect, RendererBackend};
use super::registers::psm_bits_per_pixel;
use super::{Gs, LOCAL_MEM_SIZE};

/// Transfer directions as encoded in TRXDIR
pub const DIR_HOST_TO_LOCAL: u32 = 0;
pub const DIR_LOCAL_TO_HOST: u32 = 1;
pub const DIR_LOCAL_TO_LOCAL: u32 = 2;
pub const DIR_NONE: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferState {
    /// Active direction, `DIR_NONE` when idle
    pub dir: u32,
    /// Pixels committed so far (host→local)
    pub px: u32,
    /// Pixels produced so far (local→host)
    pub rp: u32,
    /// Sub-pixel byte remainder between chunks
    pub buf: Vec<u8>,
}

impl Default for TransferState {
    fn default() -> Self {
        Self {
            dir: DIR_NONE,
            px: 0,
            rp: 0,
            buf: Vec::new(),
        }
    }
}

/// Wire bytes per pixel for host transfers. PSMCT24 packs 3 bytes on the
/// wire but occupies a 4-byte slot in memory; 4-bit formats pack two pixels
/// per byte and are handled out-of-band by the caller.
fn wire_bytes(psm: u32) -> usize {
    match psm_bits_per_pixel(psm) {
        32 => 4,
        24 => 3,
        16 => 2,
        8 => 1,
        _ => 1,
    }
}

fn is_4bit(psm: u32) -> bool {
    psm_bits_per_pixel(psm) == 4
}

/// Byte offset of pixel (x, y) in a buffer at `bp` (words/64) with width
/// `bw` (pixels/64), for byte-addressable formats.
fn pixel_offset(bp: u32, bw: u32, x: u32, y: u32, slot_bytes: u32) -> usize {
    let row = bw.max(1) * 64;
    let base = bp as usize * 256;
    (base + ((y as usize * row as usize) + x as usize) * slot_bytes as usize) % LOCAL_MEM_SIZE
}

impl Gs {
    /// TRXDIR write: arm (or run) a transfer. Any primitives batched so far
    /// must go out first since the transfer may overwrite their sources.
    pub(crate) fn begin_transfer(&mut self, dir: u32, r: &mut dyn RendererBackend) {
        self.flush(r);
        self.transfer = TransferState {
            dir,
            ..TransferState::default()
        };
        if dir == DIR_LOCAL_TO_LOCAL {
            self.local_copy(r);
            self.transfer.dir = DIR_NONE;
        }
    }

    fn write_pixel(&mut self, psm: u32, bp: u32, bw: u32, x: u32, y: u32, value: u32) {
        let x = x & 2047;
        let y = y & 2047;
        // Byte-wise stores so a buffer straddling the 4MB wrap stays in
        // bounds
        let store = |vram: &mut [u8], off: usize, bytes: &[u8]| {
            for (i, &b) in bytes.iter().enumerate() {
                vram[(off + i) % LOCAL_MEM_SIZE] = b;
            }
        };
        match psm_bits_per_pixel(psm) {
            32 => {
                let off = pixel_offset(bp, bw, x, y, 4);
                store(&mut self.vram, off, &value.to_le_bytes());
            }
            24 => {
                // 4-byte slot, top byte preserved
                let off = pixel_offset(bp, bw, x, y, 4);
                store(&mut self.vram, off, &value.to_le_bytes()[..3]);
            }
            16 => {
                let off = pixel_offset(bp, bw, x, y, 2);
                store(&mut self.vram, off, &(value as u16).to_le_bytes());
            }
            8 => {
                let off = pixel_offset(bp, bw, x, y, 1);
                self.vram[off] = value as u8;
            }
            _ => {
                // 4-bit: nibble addressed
                let row = bw.max(1) as usize * 64;
                let base = bp as usize * 512; // in nibbles
                let nib = base + y as usize * row + x as usize;
                let off = (nib / 2) % LOCAL_MEM_SIZE;
                if nib & 1 == 0 {
                    self.vram[off] = (self.vram[off] & 0xF0) | (value as u8 & 0x0F);
                } else {
                    self.vram[off] = (self.vram[off] & 0x0F) | ((value as u8 & 0x0F) << 4);
                }
            }
        }
    }

    fn read_pixel(&self, psm: u32, bp: u32, bw: u32, x: u32, y: u32) -> u32 {
        let x = x & 2047;
        let y = y & 2047;
        let load = |vram: &[u8], off: usize, n: usize| -> u32 {
            let mut v = 0u32;
            for i in 0..n {
                v |= u32::from(vram[(off + i) % LOCAL_MEM_SIZE]) << (8 * i);
            }
            v
        };
        match psm_bits_per_pixel(psm) {
            32 => load(&self.vram, pixel_offset(bp, bw, x, y, 4), 4),
            24 => load(&self.vram, pixel_offset(bp, bw, x, y, 4), 4) & 0x00FF_FFFF,
            16 => load(&self.vram, pixel_offset(bp, bw, x, y, 2), 2),
            8 => u32::from(self.vram[pixel_offset(bp, bw, x, y, 1)]),
            _ => {
                let row = bw.max(1) as usize * 64;
                let base = bp as usize * 512;
                let nib = base + y as usize * row + x as usize;
                let off = (nib / 2) % LOCAL_MEM_SIZE;
                if nib & 1 == 0 {
                    u32::from(self.vram[off] & 0x0F)
                } else {
                    u32::from(self.vram[off] >> 4)
                }
            }
        }
    }

    /// Host→local image data. Accepts any chunk size; commits every pixel
    /// that completes and finishes the transfer once the rectangle fills.
    pub(crate) fn write_image(&mut self, data: &[u8], r: &mut dyn RendererBackend) {
        if self.transfer.dir != DIR_HOST_TO_LOCAL {
            return;
        }
        let psm = self.bitbltbuf.dpsm();
        let bp = self.bitbltbuf.dbp();
        let bw = self.bitbltbuf.dbw();
        let (dsax, dsay) = (self.trxpos.dsax(), self.trxpos.dsay());
        let (rrw, rrh) = (self.trxreg.rrw(), self.trxreg.rrh());
        let total = rrw * rrh;
        if total == 0 {
            self.transfer.dir = DIR_NONE;
            return;
        }

        // Stitch the carried remainder onto the new chunk
        let stitched;
        let bytes: &[u8] = if self.transfer.buf.is_empty() {
            data
        } else {
            let mut v = std::mem::take(&mut self.transfer.buf);
            v.extend_from_slice(data);
            stitched = v;
            &stitched
        };

        let mut pos = 0usize;
        if is_4bit(psm) {
            while pos < bytes.len() && self.transfer.px < total {
                let b = bytes[pos];
                pos += 1;
                for val in [b & 0x0F, b >> 4] {
                    if self.transfer.px >= total {
                        break;
                    }
                    let x = dsax + self.transfer.px % rrw;
                    let y = dsay + self.transfer.px / rrw;
                    self.write_pixel(psm, bp, bw, x, y, u32::from(val));
                    self.transfer.px += 1;
                }
            }
        } else {
            let wb = wire_bytes(psm);
            while bytes.len() - pos >= wb && self.transfer.px < total {
                let mut value = 0u32;
                for (i, &b) in bytes[pos..pos + wb].iter().enumerate() {
                    value |= u32::from(b) << (8 * i);
                }
                pos += wb;
                let x = dsax + self.transfer.px % rrw;
                let y = dsay + self.transfer.px / rrw;
                self.write_pixel(psm, bp, bw, x, y, value);
                self.transfer.px += 1;
            }
        }

        if self.transfer.px >= total {
            self.finish_host_transfer(r);
        } else if pos < bytes.len() {
            self.transfer.buf = bytes[pos..].to_vec();
        }
    }

    fn finish_host_transfer(&mut self, r: &mut dyn RendererBackend) {
        self.transfer.dir = DIR_NONE;
        self.transfer.buf.clear();
        r.invalidate(DirtyRect {
            base: self.bitbltbuf.dbp(),
            width: self.bitbltbuf.dbw(),
            psm: self.bitbltbuf.dpsm(),
            x: self.trxpos.dsax(),
            y: self.trxpos.dsay(),
            w: self.trxreg.rrw(),
            h: self.trxreg.rrh(),
        });
    }

    /// Local→host readback, used by the VIF1 reverse FIFO. Returns exactly
    /// `count` bytes, zero-padded once the rectangle is exhausted.
    pub(crate) fn read_fifo(&mut self, count: usize) -> Vec<u8> {
        let mut out = vec![0u8; count];
        if self.transfer.dir != DIR_LOCAL_TO_HOST {
            return out;
        }
        let psm = self.bitbltbuf.spsm();
        let bp = self.bitbltbuf.sbp();
        let bw = self.bitbltbuf.sbw();
        let (ssax, ssay) = (self.trxpos.ssax(), self.trxpos.ssay());
        let (rrw, rrh) = (self.trxreg.rrw(), self.trxreg.rrh());
        let total = rrw * rrh;

        let mut pos = 0usize;
        if is_4bit(psm) {
            while pos < count && self.transfer.rp < total {
                let mut b = 0u8;
                for half in 0..2 {
                    if self.transfer.rp >= total {
                        break;
                    }
                    let x = ssax + self.transfer.rp % rrw.max(1);
                    let y = ssay + self.transfer.rp / rrw.max(1);
                    b |= (self.read_pixel(psm, bp, bw, x, y) as u8) << (4 * half);
                    self.transfer.rp += 1;
                }
                out[pos] = b;
                pos += 1;
            }
        } else {
            let wb = wire_bytes(psm);
            while count - pos >= wb && self.transfer.rp < total {
                let x = ssax + self.transfer.rp % rrw.max(1);
                let y = ssay + self.transfer.rp / rrw.max(1);
                let value = self.read_pixel(psm, bp, bw, x, y);
                out[pos..pos + wb].copy_from_slice(&value.to_le_bytes()[..wb]);
                pos += wb;
                self.transfer.rp += 1;
            }
        }
        if self.transfer.rp >= total {
            self.transfer.dir = DIR_NONE;
        }
        out
    }

    /// Local→local rectangle copy, performed synchronously at TRXDIR write.
    /// TRXPOS.DIR picks the traversal order so overlapping copies behave.
    fn local_copy(&mut self, r: &mut dyn RendererBackend) {
        let (rrw, rrh) = (self.trxreg.rrw(), self.trxreg.rrh());
        let dirv = self.trxpos.dir();
        let (rev_x, rev_y) = (dirv & 1 != 0, dirv & 2 != 0);
        for jj in 0..rrh {
            let j = if rev_y { rrh - 1 - jj } else { jj };
            for ii in 0..rrw {
                let i = if rev_x { rrw - 1 - ii } else { ii };
                let v = self.read_pixel(
                    self.bitbltbuf.spsm(),
                    self.bitbltbuf.sbp(),
                    self.bitbltbuf.sbw(),
                    self.trxpos.ssax() + i,
                    self.trxpos.ssay() + j,
                );
                self.write_pixel(
                    self.bitbltbuf.dpsm(),
                    self.bitbltbuf.dbp(),
                    self.bitbltbuf.dbw(),
                    self.trxpos.dsax() + i,
                    self.trxpos.dsay() + j,
                    v,
                );
            }
        }
        r.invalidate(DirtyRect {
            base: self.bitbltbuf.dbp(),
            width: self.bitbltbuf.dbw(),
            psm: self.bitbltbuf.dpsm(),
            x: self.trxpos.dsax(),
            y: self.trxpos.dsay(),
            w: rrw,
            h: rrh,
        });
    }

    /// Flush hook: a draw issued mid-upload must observe what has already
    /// been committed, so tell the renderer about the partial rectangle.
    pub(crate) fn commit_transfer(&mut self, r: &mut dyn RendererBackend) {
        if self.transfer.dir == DIR_HOST_TO_LOCAL && self.transfer.px > 0 {
            let rrw = self.trxreg.rrw().max(1);
            let rows = self.transfer.px.div_ceil(rrw);
            r.invalidate(DirtyRect {
                base: self.bitbltbuf.dbp(),
                width: self.bitbltbuf.dbw(),
                psm: self.bitbltbuf.dpsm(),
                x: self.trxpos.dsax(),
                y: self.trxpos.dsay(),
                w: rrw,
                h: rows,
            });
        }
    }
}
