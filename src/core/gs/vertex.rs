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

//! Primitive assembly and the vertex kick
//!
//! XYZ2/XYZF2 writes "kick" the latched vertex attributes into the
//! accumulation buffer. Once enough vertices exist for the current PRIM
//! type, the candidate primitive is culled against the scissor bounding
//! box (and a degenerate-geometry equality test) before its indices are
//! appended; strips and fans retain their continuation vertices across
//! both kicks and flush boundaries.

use serde::{Deserialize, Serialize};

use super::super::renderer::{DrawCall, RendererBackend};
use super::registers::{PrimType, Vertex};
use super::Gs;

/// Vertex/index accumulation for one batch between flushes.
///
/// `head` marks the first vertex of the primitive currently being
/// assembled; `tail` is one past the last kicked vertex. Indices are
/// absolute positions into `vtx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexBatch {
    pub vtx: Vec<Vertex>,
    pub head: usize,
    pub tail: usize,
    pub idx: Vec<u32>,
}

impl VertexBatch {
    pub fn new() -> Self {
        Self {
            vtx: Vec::with_capacity(64),
            head: 0,
            tail: 0,
            idx: Vec::with_capacity(64),
        }
    }

    /// A PRIM write abandons any partially assembled primitive.
    pub fn restart(&mut self) {
        self.head = self.tail;
    }

    pub fn push(&mut self, v: Vertex) {
        // Geometric growth with headroom; big batches should not
        // reallocate per vertex
        if self.vtx.len() == self.vtx.capacity() {
            self.vtx.reserve(self.vtx.capacity() / 2 + 64);
        }
        self.vtx.push(v);
        self.tail += 1;
    }
}

impl Default for VertexBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidate primitive's vertex positions, used for culling
fn bbox<'a, I: Iterator<Item = &'a Vertex>>(verts: I) -> (u16, u16, u16, u16) {
    let mut min_x = u16::MAX;
    let mut max_x = 0;
    let mut min_y = u16::MAX;
    let mut max_y = 0;
    for v in verts {
        min_x = min_x.min(v.x);
        max_x = max_x.max(v.x);
        min_y = min_y.min(v.y);
        max_y = max_y.max(v.y);
    }
    (min_x, max_x, min_y, max_y)
}

impl Gs {
    /// Append the latched vertex and, when a primitive completes, emit its
    /// indices. `skip` reproduces XYZ3/ADC: the vertex participates in
    /// strip/fan continuation but produces no drawing kick.
    pub(crate) fn vertex_kick(&mut self, skip: bool, r: &mut dyn RendererBackend) {
        let l = self.latch;
        self.batch.push(Vertex {
            x: l.x,
            y: l.y,
            z: l.z,
            rgba: l.rgba,
            q: l.q,
            s: l.s,
            t: l.t,
            u: l.u,
            v: l.v,
            fog: l.fog,
        });

        let prim = self.prim.prim_type();
        let n = prim.vertex_count();
        if n == 0 {
            // PRIM type 7 consumes vertices without ever drawing
            self.batch.head = self.batch.tail;
            return;
        }
        if self.batch.tail - self.batch.head < n {
            return;
        }

        // Feedback rendering: the new primitive samples pixels the queued
        // ones write, so commit them first. This must happen before the
        // candidate indices are computed since a flush compacts the buffer.
        let ctx = self.active_ctx();
        if !skip
            && self.auto_flush
            && self.effective_prim().tme()
            && self.ctx[ctx].tex_aliases_frame()
            && self.pending_prims()
        {
            self.flush_prim(r);
        }

        let tail = self.batch.tail;
        // Candidate vertex window; the fan's first vertex is pinned at head,
        // not part of a sliding window.
        let candidate: [usize; 3] = match prim {
            PrimType::TriangleFan => [self.batch.head, tail - 2, tail - 1],
            _ => [tail.saturating_sub(3), tail.saturating_sub(2), tail - 1],
        };
        let window = &candidate[3 - n..];

        if !skip && self.candidate_visible(prim, window) {
            for &i in window {
                self.batch.idx.push(i as u32);
            }
        }

        // Advance assembly state whether or not the kick drew anything
        self.batch.head = match prim {
            PrimType::Point
            | PrimType::Line
            | PrimType::Triangle
            | PrimType::Sprite
            | PrimType::Invalid => self.batch.tail,
            PrimType::LineStrip => self.batch.tail - 1,
            PrimType::TriangleStrip => self.batch.tail - 2,
            PrimType::TriangleFan => self.batch.head,
        };
    }

    /// Bounding-box scissor test plus the degenerate-geometry equality
    /// test. The equality form (not a cross product) matches how the
    /// hardware's fixed-point rounding makes such primitives invisible.
    fn candidate_visible(&self, prim: PrimType, window: &[usize]) -> bool {
        let verts = &self.batch.vtx;
        let (min_x, max_x, min_y, max_y) = bbox(window.iter().map(|&i| &verts[i]));
        let sc = self.ctx[self.active_ctx()].scissor_fix4;
        if u32::from(max_x) < sc.x0
            || u32::from(min_x) >= sc.x1
            || u32::from(max_y) < sc.y0
            || u32::from(min_y) >= sc.y1
        {
            return false;
        }

        match prim {
            PrimType::Triangle | PrimType::TriangleStrip | PrimType::TriangleFan => {
                let [a, b, c] = [&verts[window[0]], &verts[window[1]], &verts[window[2]]];
                let dup = (a.x == b.x && a.y == b.y)
                    || (b.x == c.x && b.y == c.y)
                    || (a.x == c.x && a.y == c.y);
                !dup
            }
            PrimType::Sprite => {
                let [a, b] = [&verts[window[0]], &verts[window[1]]];
                a.x != b.x && a.y != b.y
            }
            _ => true,
        }
    }

    /// Dispatch the accumulated batch to the renderer and reset it,
    /// retaining the vertices a strip or fan still needs.
    pub(crate) fn flush_prim(&mut self, r: &mut dyn RendererBackend) {
        if self.batch.idx.is_empty() {
            // Nothing drawn; still drop fully-consumed vertices
            if self.batch.head == self.batch.tail {
                self.batch.vtx.clear();
                self.batch.head = 0;
                self.batch.tail = 0;
            }
            return;
        }

        self.flush_count += 1;
        let ctx = self.active_ctx();
        r.draw(&DrawCall {
            prim: self.effective_prim(),
            context: &self.ctx[ctx],
            vertices: &self.batch.vtx[..self.batch.tail],
            indices: &self.batch.idx,
        });

        // Keep head..tail alive for strip/fan continuation
        let keep = self.batch.tail - self.batch.head;
        let head = self.batch.head;
        for i in 0..keep {
            self.batch.vtx[i] = self.batch.vtx[head + i];
        }
        self.batch.vtx.truncate(keep);
        self.batch.head = 0;
        self.batch.tail = keep;
        self.batch.idx.clear();
    }
}
