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

//! GS drawing contexts
//!
//! The GS carries two full register environments; PRIM.CTXT (or PRMODE.CTXT
//! when PRMODECONT=0) selects which one a primitive draws with. Derived
//! scissor bounds in 12.4 window space are cached here so the vertex-kick
//! cull test is a straight compare.

use serde::{Deserialize, Serialize};

use super::registers::{
    Alpha, Clamp, Frame, Scissor, Test, Tex0, Tex1, XyOffset, Zbuf,
};

/// Scissor window translated into the 12.4 fixed-point space vertices use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScissorFix4 {
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawingContext {
    pub tex0: Tex0,
    pub tex1: Tex1,
    pub clamp: Clamp,
    pub xyoffset: XyOffset,
    pub scissor: Scissor,
    pub alpha: Alpha,
    pub test: Test,
    pub frame: Frame,
    pub zbuf: Zbuf,
    pub miptbp1: u64,
    pub miptbp2: u64,
    /// FBA bit, ORed into destination alpha MSB
    pub fba: bool,
    /// Cached scissor in vertex space, kept in sync by the register writes
    pub scissor_fix4: ScissorFix4,
}

impl DrawingContext {
    /// Recompute the cached vertex-space scissor. SCAX/SCAY are inclusive
    /// pixel bounds, XYOFFSET shifts the window, and vertices carry 4
    /// fractional bits.
    pub fn update_scissor(&mut self) {
        let ofx = u32::from(self.xyoffset.ofx());
        let ofy = u32::from(self.xyoffset.ofy());
        self.scissor_fix4 = ScissorFix4 {
            x0: (self.scissor.scax0() << 4).wrapping_add(ofx),
            x1: ((self.scissor.scax1() + 1) << 4).wrapping_add(ofx),
            y0: (self.scissor.scay0() << 4).wrapping_add(ofy),
            y1: ((self.scissor.scay1() + 1) << 4).wrapping_add(ofy),
        };
    }

    /// Does the texture buffer alias the color buffer? Drives the auto-flush
    /// heuristic for feedback rendering.
    pub fn tex_aliases_frame(&self) -> bool {
        self.tex0.tbp0() == self.frame.block_pointer()
    }
}
