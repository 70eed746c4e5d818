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

//! gsrx: a cycle-accurate PlayStation 2 graphics subsystem emulator
//!
//! This crate models the EE-side graphics plumbing of the PS2: the
//! hardware counters and video timing, the Graphics Synthesizer register
//! file and local memory, the GIF path arbiter, the VIF0/VIF1 command
//! engines and the optional worker-thread bridge for VU1. Rasterization
//! itself lives behind the [`core::renderer::RendererBackend`] trait; the
//! core guarantees bit-exact register semantics, transfer addressing and
//! event ordering, and hands the backend fully-resolved draw calls.
//!
//! # Example
//!
//! ```
//! use gsrx::core::config::EmuConfig;
//! use gsrx::core::renderer::NullRenderer;
//! use gsrx::core::session::EmulationSession;
//!
//! let mut session = EmulationSession::new(
//!     EmuConfig::default(),
//!     Box::new(NullRenderer::default()),
//! );
//! session.step(1000);
//! assert_eq!(session.cycles(), 1000);
//! ```
//!
//! # Error Handling
//!
//! Emulated-hardware faults (stalls, reserved opcodes, malformed GIFtags)
//! are reproduced as guest-visible behavior, never as errors. Fallible
//! host operations return [`core::error::Result<T>`].

pub mod core;

// Re-export commonly used types
pub use core::error::{EmulatorError, Result};
