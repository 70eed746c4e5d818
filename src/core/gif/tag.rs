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

//! GIFtag decoding
//!
//! A GIFtag is a 128-bit header: NLOOP (repeat count), EOP, PRE/PRIM (an
//! optional inline PRIM write), FLG (data format) and NREG/REGS (the
//! register descriptor list for PACKED and REGLIST data).

use serde::{Deserialize, Serialize};

/// Data format following a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GifFlag {
    Packed,
    Reglist,
    Image,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GifTag {
    pub nloop: u32,
    pub eop: bool,
    pub pre: bool,
    pub prim: u64,
    pub flg: u8,
    pub nreg: u32,
    pub regs: u64,
}

impl GifTag {
    pub fn parse(lo: u64, hi: u64) -> Self {
        let nreg = ((lo >> 60) & 0xF) as u32;
        Self {
            nloop: (lo & 0x7FFF) as u32,
            eop: lo & (1 << 15) != 0,
            pre: lo & (1 << 46) != 0,
            prim: (lo >> 47) & 0x7FF,
            flg: ((lo >> 58) & 3) as u8,
            // NREG=0 encodes 16 descriptors
            nreg: if nreg == 0 { 16 } else { nreg },
            regs: hi,
        }
    }

    pub fn flag(&self) -> GifFlag {
        match self.flg {
            0 => GifFlag::Packed,
            1 => GifFlag::Reglist,
            // FLG=3 is "disabled" but transfers as IMAGE on hardware
            _ => GifFlag::Image,
        }
    }

    /// Register descriptor `i` (0-based, i < nreg)
    pub fn reg(&self, i: u32) -> u8 {
        ((self.regs >> (4 * i)) & 0xF) as u8
    }

    /// Data qwords this tag's payload occupies
    pub fn payload_qwords(&self) -> u32 {
        match self.flag() {
            GifFlag::Packed => self.nloop * self.nreg,
            GifFlag::Reglist => (self.nloop * self.nreg).div_ceil(2),
            GifFlag::Image => self.nloop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packed_tag() {
        // nloop=3, eop, pre with prim=4, packed, nreg=2, regs = {AD, XYZ2}
        let lo = 3u64 | (1 << 15) | (1 << 46) | (4u64 << 47) | (2u64 << 60);
        let hi = 0x5Eu64; // reg0 = 0xE (A+D), reg1 = 0x5 (XYZ2)
        let tag = GifTag::parse(lo, hi);
        assert_eq!(tag.nloop, 3);
        assert!(tag.eop);
        assert!(tag.pre);
        assert_eq!(tag.prim, 4);
        assert_eq!(tag.flag(), GifFlag::Packed);
        assert_eq!(tag.nreg, 2);
        assert_eq!(tag.reg(0), 0xE);
        assert_eq!(tag.reg(1), 0x5);
        assert_eq!(tag.payload_qwords(), 6);
    }

    #[test]
    fn test_nreg_zero_means_sixteen() {
        let tag = GifTag::parse(1, 0);
        assert_eq!(tag.nreg, 16);
        assert_eq!(tag.payload_qwords(), 16);
    }

    #[test]
    fn test_reglist_rounds_up_odd_register_count() {
        // nloop=3, nreg=1 reglist: 3 registers in 2 qwords
        let lo = 3u64 | (1 << 58) | (1u64 << 60);
        let tag = GifTag::parse(lo, 0);
        assert_eq!(tag.flag(), GifFlag::Reglist);
        assert_eq!(tag.payload_qwords(), 2);
    }

    #[test]
    fn test_image_flag_3_transfers_as_image() {
        let lo = 5u64 | (3 << 58);
        let tag = GifTag::parse(lo, 0);
        assert_eq!(tag.flag(), GifFlag::Image);
        assert_eq!(tag.payload_qwords(), 5);
    }
}
