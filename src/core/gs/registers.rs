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

//! GS register type definitions
//!
//! Every GS environment register is a 64-bit word with tightly packed
//! bitfields. Each register gets a newtype over the raw `u64` with shift/mask
//! accessors — relying on compiler bitfield layout would be a portability
//! hazard, so the packing is always explicit.
//!
//! ## References
//!
//! - GS User's Manual, chapter "Register Descriptions"
//! - ps2tek: GS registers

use serde::{Deserialize, Serialize};

/// General (A+D addressable) register numbers
pub mod reg {
    pub const PRIM: u8 = 0x00;
    pub const RGBAQ: u8 = 0x01;
    pub const ST: u8 = 0x02;
    pub const UV: u8 = 0x03;
    pub const XYZF2: u8 = 0x04;
    pub const XYZ2: u8 = 0x05;
    pub const TEX0_1: u8 = 0x06;
    pub const TEX0_2: u8 = 0x07;
    pub const CLAMP_1: u8 = 0x08;
    pub const CLAMP_2: u8 = 0x09;
    pub const FOG: u8 = 0x0A;
    pub const XYZF3: u8 = 0x0C;
    pub const XYZ3: u8 = 0x0D;
    pub const TEX1_1: u8 = 0x14;
    pub const TEX1_2: u8 = 0x15;
    pub const TEX2_1: u8 = 0x16;
    pub const TEX2_2: u8 = 0x17;
    pub const XYOFFSET_1: u8 = 0x18;
    pub const XYOFFSET_2: u8 = 0x19;
    pub const PRMODECONT: u8 = 0x1A;
    pub const PRMODE: u8 = 0x1B;
    pub const TEXCLUT: u8 = 0x1C;
    pub const SCANMSK: u8 = 0x22;
    pub const MIPTBP1_1: u8 = 0x34;
    pub const MIPTBP1_2: u8 = 0x35;
    pub const MIPTBP2_1: u8 = 0x36;
    pub const MIPTBP2_2: u8 = 0x37;
    pub const TEXA: u8 = 0x3B;
    pub const FOGCOL: u8 = 0x3D;
    pub const TEXFLUSH: u8 = 0x3F;
    pub const SCISSOR_1: u8 = 0x40;
    pub const SCISSOR_2: u8 = 0x41;
    pub const ALPHA_1: u8 = 0x42;
    pub const ALPHA_2: u8 = 0x43;
    pub const DIMX: u8 = 0x44;
    pub const DTHE: u8 = 0x45;
    pub const COLCLAMP: u8 = 0x46;
    pub const TEST_1: u8 = 0x47;
    pub const TEST_2: u8 = 0x48;
    pub const PABE: u8 = 0x49;
    pub const FBA_1: u8 = 0x4A;
    pub const FBA_2: u8 = 0x4B;
    pub const FRAME_1: u8 = 0x4C;
    pub const FRAME_2: u8 = 0x4D;
    pub const ZBUF_1: u8 = 0x4E;
    pub const ZBUF_2: u8 = 0x4F;
    pub const BITBLTBUF: u8 = 0x50;
    pub const TRXPOS: u8 = 0x51;
    pub const TRXREG: u8 = 0x52;
    pub const TRXDIR: u8 = 0x53;
    pub const HWREG: u8 = 0x54;
    pub const SIGNAL: u8 = 0x60;
    pub const FINISH: u8 = 0x61;
    pub const LABEL: u8 = 0x62;
    /// Packed-mode A+D pseudo register
    pub const AD: u8 = 0x0E;
    /// Packed-mode NOP pseudo register
    pub const NOP: u8 = 0x0F;
}

/// Extract `len` bits of `raw` starting at `pos`
#[inline(always)]
fn bits(raw: u64, pos: u32, len: u32) -> u64 {
    (raw >> pos) & ((1 << len) - 1)
}

/// Primitive type encoded in PRIM bits 0-2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimType {
    Point = 0,
    Line = 1,
    LineStrip = 2,
    Triangle = 3,
    TriangleStrip = 4,
    TriangleFan = 5,
    Sprite = 6,
    Invalid = 7,
}

impl PrimType {
    pub fn from_bits(v: u64) -> Self {
        match v & 7 {
            0 => PrimType::Point,
            1 => PrimType::Line,
            2 => PrimType::LineStrip,
            3 => PrimType::Triangle,
            4 => PrimType::TriangleStrip,
            5 => PrimType::TriangleFan,
            6 => PrimType::Sprite,
            _ => PrimType::Invalid,
        }
    }

    /// Vertices required before a primitive of this type can be kicked
    pub fn vertex_count(self) -> usize {
        match self {
            PrimType::Point => 1,
            PrimType::Line | PrimType::LineStrip | PrimType::Sprite => 2,
            PrimType::Triangle | PrimType::TriangleStrip | PrimType::TriangleFan => 3,
            PrimType::Invalid => 0,
        }
    }
}

/// PRIM / PRMODE register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prim(pub u64);

impl Prim {
    pub fn prim_type(self) -> PrimType {
        PrimType::from_bits(self.0)
    }
    /// Gouraud shading
    pub fn iip(self) -> bool {
        self.0 & 0x8 != 0
    }
    /// Texture mapping enable
    pub fn tme(self) -> bool {
        self.0 & 0x10 != 0
    }
    /// Fog enable
    pub fn fge(self) -> bool {
        self.0 & 0x20 != 0
    }
    /// Alpha blending enable
    pub fn abe(self) -> bool {
        self.0 & 0x40 != 0
    }
    /// Antialiasing enable
    pub fn aa1(self) -> bool {
        self.0 & 0x80 != 0
    }
    /// UV (true) vs STQ (false) texture coordinates
    pub fn fst(self) -> bool {
        self.0 & 0x100 != 0
    }
    /// Context selector
    pub fn ctxt(self) -> usize {
        ((self.0 >> 9) & 1) as usize
    }
    /// Fragment value control (FIX)
    pub fn fix(self) -> bool {
        self.0 & 0x400 != 0
    }
}

/// TEX0: texture buffer/format/CLUT descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tex0(pub u64);

impl Tex0 {
    /// Texture base pointer in words/64
    pub fn tbp0(self) -> u32 {
        bits(self.0, 0, 14) as u32
    }
    /// Texture buffer width in pixels/64
    pub fn tbw(self) -> u32 {
        bits(self.0, 14, 6) as u32
    }
    /// Pixel storage mode
    pub fn psm(self) -> u32 {
        bits(self.0, 20, 6) as u32
    }
    /// log2 texture width, hardware max 10
    pub fn tw(self) -> u32 {
        bits(self.0, 26, 4) as u32
    }
    /// log2 texture height, hardware max 10
    pub fn th(self) -> u32 {
        bits(self.0, 30, 4) as u32
    }
    /// Texture color component (RGB/RGBA)
    pub fn tcc(self) -> bool {
        self.0 & (1 << 34) != 0
    }
    /// Texture function (modulate/decal/highlight/highlight2)
    pub fn tfx(self) -> u32 {
        bits(self.0, 35, 2) as u32
    }
    /// CLUT base pointer in words/64
    pub fn cbp(self) -> u32 {
        bits(self.0, 37, 14) as u32
    }
    /// CLUT pixel storage mode
    pub fn cpsm(self) -> u32 {
        bits(self.0, 51, 4) as u32
    }
    /// CLUT storage mode (CSM1/CSM2)
    pub fn csm(self) -> bool {
        self.0 & (1 << 55) != 0
    }
    /// CLUT entry offset
    pub fn csa(self) -> u32 {
        bits(self.0, 56, 5) as u32
    }
    /// CLUT buffer load control
    pub fn cld(self) -> u32 {
        bits(self.0, 61, 3) as u32
    }

    pub fn set_tw(&mut self, tw: u32) {
        self.0 = (self.0 & !(0xF << 26)) | (u64::from(tw & 0xF) << 26);
    }
    pub fn set_th(&mut self, th: u32) {
        self.0 = (self.0 & !(0xF << 30)) | (u64::from(th & 0xF) << 30);
    }
    pub fn set_tbw(&mut self, tbw: u32) {
        self.0 = (self.0 & !(0x3F << 14)) | (u64::from(tbw & 0x3F) << 14);
    }
    pub fn set_cbp(&mut self, cbp: u32) {
        self.0 = (self.0 & !(0x3FFF << 37)) | (u64::from(cbp & 0x3FFF) << 37);
    }

    /// True for the 4/8-bit indexed formats that sample the CLUT
    pub fn is_indexed(self) -> bool {
        matches!(self.psm(), 0x13 | 0x14 | 0x1B | 0x24 | 0x2C | 0x31)
    }
}

/// TEX1: sampling/mipmap control
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tex1(pub u64);

impl Tex1 {
    /// LOD calculation method
    pub fn lcm(self) -> bool {
        self.0 & 1 != 0
    }
    /// Max mip level
    pub fn mxl(self) -> u32 {
        bits(self.0, 2, 3) as u32
    }
    /// Magnification filter
    pub fn mmag(self) -> bool {
        self.0 & (1 << 5) != 0
    }
    /// Minification filter
    pub fn mmin(self) -> u32 {
        bits(self.0, 6, 3) as u32
    }
    /// Mip base address auto mode
    pub fn mtba(self) -> bool {
        self.0 & (1 << 9) != 0
    }
    /// LOD parameter L
    pub fn l(self) -> u32 {
        bits(self.0, 19, 2) as u32
    }
    /// LOD parameter K (signed 7.4 fixed point)
    pub fn k(self) -> u32 {
        bits(self.0, 32, 12) as u32
    }
}

/// CLAMP: texture wrap modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clamp(pub u64);

impl Clamp {
    pub fn wms(self) -> u32 {
        bits(self.0, 0, 2) as u32
    }
    pub fn wmt(self) -> u32 {
        bits(self.0, 2, 2) as u32
    }
    pub fn minu(self) -> u32 {
        bits(self.0, 4, 10) as u32
    }
    pub fn maxu(self) -> u32 {
        bits(self.0, 14, 10) as u32
    }
    pub fn minv(self) -> u32 {
        bits(self.0, 24, 10) as u32
    }
    pub fn maxv(self) -> u32 {
        bits(self.0, 34, 10) as u32
    }
}

/// XYOFFSET: primitive coordinate offset (12.4 fixed point)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XyOffset(pub u64);

impl XyOffset {
    pub fn ofx(self) -> u16 {
        bits(self.0, 0, 16) as u16
    }
    pub fn ofy(self) -> u16 {
        bits(self.0, 32, 16) as u16
    }
}

/// SCISSOR: scissoring window in pixels (inclusive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scissor(pub u64);

impl Scissor {
    pub fn scax0(self) -> u32 {
        bits(self.0, 0, 11) as u32
    }
    pub fn scax1(self) -> u32 {
        bits(self.0, 16, 11) as u32
    }
    pub fn scay0(self) -> u32 {
        bits(self.0, 32, 11) as u32
    }
    pub fn scay1(self) -> u32 {
        bits(self.0, 48, 11) as u32
    }
}

/// ALPHA: blending equation `((A - B) * C >> 7) + D`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alpha(pub u64);

impl Alpha {
    pub fn a(self) -> u32 {
        bits(self.0, 0, 2) as u32
    }
    pub fn b(self) -> u32 {
        bits(self.0, 2, 2) as u32
    }
    pub fn c(self) -> u32 {
        bits(self.0, 4, 2) as u32
    }
    pub fn d(self) -> u32 {
        bits(self.0, 6, 2) as u32
    }
    pub fn fix(self) -> u32 {
        bits(self.0, 32, 8) as u32
    }
}

/// TEST: alpha/destination-alpha/depth test configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test(pub u64);

impl Test {
    pub fn ate(self) -> bool {
        self.0 & 1 != 0
    }
    pub fn atst(self) -> u32 {
        bits(self.0, 1, 3) as u32
    }
    pub fn aref(self) -> u32 {
        bits(self.0, 4, 8) as u32
    }
    pub fn afail(self) -> u32 {
        bits(self.0, 12, 2) as u32
    }
    pub fn date(self) -> bool {
        self.0 & (1 << 14) != 0
    }
    pub fn datm(self) -> bool {
        self.0 & (1 << 15) != 0
    }
    pub fn zte(self) -> bool {
        self.0 & (1 << 16) != 0
    }
    pub fn ztst(self) -> u32 {
        bits(self.0, 17, 2) as u32
    }
}

/// FRAME: color buffer descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame(pub u64);

impl Frame {
    /// Frame base pointer in words/2048 (pages)
    pub fn fbp(self) -> u32 {
        bits(self.0, 0, 9) as u32
    }
    /// Buffer width in pixels/64
    pub fn fbw(self) -> u32 {
        bits(self.0, 16, 6) as u32
    }
    pub fn psm(self) -> u32 {
        bits(self.0, 24, 6) as u32
    }
    /// Per-channel write mask
    pub fn fbmsk(self) -> u32 {
        (self.0 >> 32) as u32
    }
    /// Base pointer in words/64 for aliasing comparisons against TBP0
    pub fn block_pointer(self) -> u32 {
        self.fbp() * 32
    }
}

/// ZBUF: depth buffer descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zbuf(pub u64);

impl Zbuf {
    pub fn zbp(self) -> u32 {
        bits(self.0, 0, 9) as u32
    }
    pub fn psm(self) -> u32 {
        bits(self.0, 24, 4) as u32
    }
    /// Z write disable
    pub fn zmsk(self) -> bool {
        self.0 & (1 << 32) != 0
    }
}

/// TEXA: expansion values for 16/24-bit texture alpha
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Texa(pub u64);

impl Texa {
    pub fn ta0(self) -> u32 {
        bits(self.0, 0, 8) as u32
    }
    pub fn aem(self) -> bool {
        self.0 & (1 << 15) != 0
    }
    pub fn ta1(self) -> u32 {
        bits(self.0, 32, 8) as u32
    }
}

/// TEXCLUT: CLUT position for CSM2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TexClut(pub u64);

impl TexClut {
    pub fn cbw(self) -> u32 {
        bits(self.0, 0, 6) as u32
    }
    pub fn cou(self) -> u32 {
        bits(self.0, 6, 6) as u32
    }
    pub fn cov(self) -> u32 {
        bits(self.0, 12, 10) as u32
    }
}

/// BITBLTBUF: transfer source/destination descriptors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitBltBuf(pub u64);

impl BitBltBuf {
    pub fn sbp(self) -> u32 {
        bits(self.0, 0, 14) as u32
    }
    pub fn sbw(self) -> u32 {
        bits(self.0, 16, 6) as u32
    }
    pub fn spsm(self) -> u32 {
        bits(self.0, 24, 6) as u32
    }
    pub fn dbp(self) -> u32 {
        bits(self.0, 32, 14) as u32
    }
    pub fn dbw(self) -> u32 {
        bits(self.0, 48, 6) as u32
    }
    pub fn dpsm(self) -> u32 {
        bits(self.0, 56, 6) as u32
    }
}

/// TRXPOS: transfer rectangle positions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrxPos(pub u64);

impl TrxPos {
    pub fn ssax(self) -> u32 {
        bits(self.0, 0, 11) as u32
    }
    pub fn ssay(self) -> u32 {
        bits(self.0, 16, 11) as u32
    }
    pub fn dsax(self) -> u32 {
        bits(self.0, 32, 11) as u32
    }
    pub fn dsay(self) -> u32 {
        bits(self.0, 48, 11) as u32
    }
    /// Pixel transmission order for local→local copies
    pub fn dir(self) -> u32 {
        bits(self.0, 59, 2) as u32
    }
}

/// TRXREG: transfer rectangle size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrxReg(pub u64);

impl TrxReg {
    pub fn rrw(self) -> u32 {
        bits(self.0, 0, 12) as u32
    }
    pub fn rrh(self) -> u32 {
        bits(self.0, 32, 12) as u32
    }
}

/// Bytes per pixel for a storage format, used by the transfer engine
pub fn psm_bits_per_pixel(psm: u32) -> u32 {
    match psm {
        0x00 | 0x30 => 32,         // PSMCT32 / PSMZ32
        0x01 | 0x31 => 24,         // PSMCT24 / PSMZ24
        0x02 | 0x0A | 0x32 | 0x3A => 16, // PSMCT16(S) / PSMZ16(S)
        0x13 | 0x1B => 8,          // PSMT8 / PSMT8H
        0x14 | 0x24 | 0x2C => 4,   // PSMT4 / PSMT4HL / PSMT4HH
        _ => 32,
    }
}

/// One assembled vertex in the accumulation buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// X in 12.4 fixed point, pre-offset
    pub x: u16,
    /// Y in 12.4 fixed point, pre-offset
    pub y: u16,
    /// Depth
    pub z: u32,
    /// Packed RGBA
    pub rgba: u32,
    /// Perspective Q from the RGBAQ latch
    pub q: f32,
    /// STQ-space texture coordinates
    pub s: f32,
    pub t: f32,
    /// UV-space texture coordinates (10.4 fixed point)
    pub u: u16,
    pub v: u16,
    /// Fog coefficient
    pub fog: u8,
}
