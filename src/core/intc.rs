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

//! EE INTC (interrupt controller) implementation
//!
//! The INTC collects interrupt requests from the GS, VBlank timing, the VIF
//! units, the VUs and the four hardware counters, and exposes the usual
//! status/mask register pair to the EE.
//!
//! ## Registers
//!
//! - **INTC_STAT**: pending interrupt bits. Writing 1 to a bit acknowledges
//!   (clears) it; writing 0 leaves it unchanged.
//! - **INTC_MASK**: enable bits. Writing 1 to a bit *toggles* it — this is
//!   the documented EE behavior, unlike most mask registers.
//!
//! ## Interrupt Sources (Bit Positions)
//!
//! ```text
//! Bit | Source    | Description
//! ----|-----------|------------------------------------
//! 0   | GS        | GS interrupt (via CSR/IMR)
//! 1   | SBUS      | Sub-bus (IOP) interrupt
//! 2   | VBLANK_S  | Vertical blank start
//! 3   | VBLANK_E  | Vertical blank end
//! 4   | VIF0      | VIF0 interrupt/error stall
//! 5   | VIF1      | VIF1 interrupt/error stall
//! 6   | VU0       | VU0 program interrupt
//! 7   | VU1       | VU1 program interrupt
//! 8   | IPU       | Image processing unit
//! 9   | TIM0      | Hardware counter 0
//! 10  | TIM1      | Hardware counter 1
//! 11  | TIM2      | Hardware counter 2
//! 12  | TIM3      | Hardware counter 3
//! ```
//!
//! ## References
//!
//! - ps2tek: EE interrupt controller

use serde::{Deserialize, Serialize};

/// Interrupt source line numbers
///
/// These are bit positions in INTC_STAT and INTC_MASK.
pub mod lines {
    /// GS interrupt (bit 0)
    pub const GS: u32 = 0;

    /// Sub-bus interrupt (bit 1)
    pub const SBUS: u32 = 1;

    /// Vertical blank start (bit 2)
    pub const VBLANK_START: u32 = 2;

    /// Vertical blank end (bit 3)
    pub const VBLANK_END: u32 = 3;

    /// VIF0 interrupt (bit 4)
    pub const VIF0: u32 = 4;

    /// VIF1 interrupt (bit 5)
    pub const VIF1: u32 = 5;

    /// VU0 interrupt (bit 6)
    pub const VU0: u32 = 6;

    /// VU1 interrupt (bit 7)
    pub const VU1: u32 = 7;

    /// IPU interrupt (bit 8)
    pub const IPU: u32 = 8;

    /// Hardware counter 0 (bit 9)
    pub const TIM0: u32 = 9;

    /// Hardware counter 1 (bit 10)
    pub const TIM1: u32 = 10;

    /// Hardware counter 2 (bit 11)
    pub const TIM2: u32 = 11;

    /// Hardware counter 3 (bit 12)
    pub const TIM3: u32 = 12;
}

/// EE interrupt controller
///
/// # Example
///
/// ```
/// use gsrx::core::intc::{Intc, lines};
///
/// let mut intc = Intc::new();
/// intc.write_mask(1 << lines::TIM0); // toggle TIM0 enable on
/// intc.raise(lines::TIM0);
/// assert!(intc.is_pending());
///
/// intc.write_stat(1 << lines::TIM0); // acknowledge
/// assert!(!intc.is_pending());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intc {
    /// INTC_STAT — pending interrupt bits
    stat: u32,

    /// INTC_MASK — enable bits
    mask: u32,
}

impl Intc {
    /// Create a new interrupt controller with everything cleared and masked
    pub fn new() -> Self {
        Self { stat: 0, mask: 0 }
    }

    /// Raise an interrupt line
    ///
    /// Sets the corresponding STAT bit regardless of the mask; the mask only
    /// gates delivery to the CPU.
    pub fn raise(&mut self, line: u32) {
        debug_assert!(line < 16);
        if self.stat & (1 << line) == 0 {
            log::trace!("INTC: raise line {}", line);
        }
        self.stat |= 1 << line;
    }

    /// Read INTC_STAT
    #[inline(always)]
    pub fn read_stat(&self) -> u32 {
        self.stat
    }

    /// Write INTC_STAT — writing 1 acknowledges (clears) a pending bit
    pub fn write_stat(&mut self, value: u32) {
        self.stat &= !value;
    }

    /// Read INTC_MASK
    #[inline(always)]
    pub fn read_mask(&self) -> u32 {
        self.mask
    }

    /// Write INTC_MASK — writing 1 *toggles* an enable bit (EE quirk)
    pub fn write_mask(&mut self, value: u32) {
        self.mask ^= value;
        log::trace!("INTC: mask now 0x{:04X}", self.mask);
    }

    /// True when any unmasked interrupt is pending
    #[inline(always)]
    pub fn is_pending(&self) -> bool {
        self.stat & self.mask != 0
    }

    /// True when the given line is pending (masked or not)
    #[inline(always)]
    pub fn line_pending(&self, line: u32) -> bool {
        self.stat & (1 << line) != 0
    }

    /// Reset to power-on state
    pub fn reset(&mut self) {
        self.stat = 0;
        self.mask = 0;
    }
}

impl Default for Intc {
    fn default() -> Self {
        Self::new()
    }
}
