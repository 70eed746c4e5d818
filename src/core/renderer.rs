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

//! Renderer backend seam
//!
//! The register/packet machinery batches primitives and commits them as draw
//! calls at flush boundaries. Everything past that boundary (rasterization,
//! host textures, presentation) lives behind [`RendererBackend`] so the core
//! can run headless in tests.

use crate::core::config::EmuConfig;
use crate::core::gs::context::DrawingContext;
use crate::core::gs::registers::{Prim, Vertex};

/// One flushed batch of primitives sharing a register environment.
///
/// Vertex positions are still in window 12.4 fixed point, pre-XYOFFSET;
/// indices address `vertices`.
pub struct DrawCall<'a> {
    pub prim: Prim,
    pub context: &'a DrawingContext,
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
}

/// Memory regions a flush or transfer invalidated, in GS words/64
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub base: u32,
    pub width: u32,
    pub psm: u32,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

pub trait RendererBackend: Send {
    /// Adopt the renderer-facing configuration (upscale, anisotropy, mipmap
    /// and dither modes, hack toggles). Called at session construction and
    /// after a state load rebuilds the device.
    fn configure(&mut self, _config: &EmuConfig) {}

    /// Rasterize one batch. Called at every flush boundary with at least one
    /// complete primitive.
    fn draw(&mut self, call: &DrawCall<'_>);

    /// Local memory changed under the renderer's feet (host transfer or
    /// local→local copy); cached textures overlapping the rect are stale.
    fn invalidate(&mut self, rect: DirtyRect);

    /// Vertical blanking started; `field` is the CSR FIELD bit after toggle.
    fn vsync_start(&mut self, field: bool);

    /// Hand the finished field to the host display.
    fn present_frame(&mut self);

    /// CSR RESET was written; drop all batched and cached state.
    fn reset_device(&mut self);
}

/// Backend that swallows everything, for headless operation
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub draw_calls: u64,
    pub prims_drawn: u64,
    pub frames: u64,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RendererBackend for NullRenderer {
    fn draw(&mut self, call: &DrawCall<'_>) {
        self.draw_calls += 1;
        let per_prim = call.prim.prim_type().vertex_count().max(1);
        self.prims_drawn += (call.indices.len() / per_prim) as u64;
    }

    fn invalidate(&mut self, _rect: DirtyRect) {}

    fn vsync_start(&mut self, _field: bool) {
        self.frames += 1;
    }

    fn present_frame(&mut self) {}

    fn reset_device(&mut self) {}
}
