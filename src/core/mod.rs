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

//! Core emulation components
//!
//! - [`counters`]: EE hardware counters and the hsync/vsync virtual counters
//! - [`gs`]: Graphics Synthesizer register state, vertex batching, transfers
//! - [`gif`]: GIF path arbiter (PATH1/2/3)
//! - [`vif`]: VIF0/VIF1 command stream engines
//! - [`vu`]: vector unit memories and the execution backend seam
//! - [`mtvu`]: VU1 worker-thread bridge
//! - [`session`]: integration and the host-facing surface

pub mod config;
pub mod counters;
pub mod error;
pub mod gif;
pub mod gs;
pub mod intc;
pub mod mtvu;
pub mod renderer;
pub mod savestate;
pub mod session;
pub mod vif;
pub mod vu;
