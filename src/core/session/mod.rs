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

//! Session integration module
//!
//! Ties together the timing engine, GS, GIF arbiter, VIF units, the vector
//! units and the optional VU1 worker bridge, and owns the renderer backend.
//! The host frontend drives it: DMA bursts enter through the `*_transfer`
//! methods, time advances through [`EmulationSession::step`], and the
//! privileged GS registers are accessed through the `gs_*` wrappers so
//! their cross-component side effects (SIGNAL acknowledge, soft reset)
//! reach the GIF and the bridge.

use super::config::EmuConfig;
use super::counters::Counters;
use super::error::Result;
use super::gif::{GifPathKind, GifUnit};
use super::gs::Gs;
use super::intc::Intc;
use super::mtvu::MtvuBridge;
use super::renderer::RendererBackend;
use super::savestate::SaveState;
use super::vif::{Vif, VifBus};
use super::vu::Vu;

pub struct EmulationSession {
    pub config: EmuConfig,
    pub counters: Counters,
    pub intc: Intc,
    pub gs: Gs,
    pub gif: GifUnit,
    pub vif0: Vif,
    pub vif1: Vif,
    pub vu0: Vu,
    pub vu1: Vu,
    /// Present when the configuration runs VU1 on a worker thread
    pub mtvu: Option<MtvuBridge>,
    renderer: Box<dyn RendererBackend>,
    /// Absolute EE cycle count
    cycle: u64,
}

impl EmulationSession {
    pub fn new(config: EmuConfig, mut renderer: Box<dyn RendererBackend>) -> Self {
        renderer.configure(&config);
        let mut gs = Gs::new();
        gs.auto_flush = config.auto_flush;
        let mtvu = config.mtvu.then(|| {
            // The bridge debits avg_cycles * skip / 100 per launch
            let skip = (config.ee_cycle_skip * 100.0) as u32;
            MtvuBridge::new(true, skip)
        });
        Self {
            config,
            counters: Counters::new(),
            intc: Intc::new(),
            gs,
            gif: GifUnit::new(),
            vif0: Vif::new(0),
            vif1: Vif::new(1),
            vu0: Vu::vu0(),
            vu1: Vu::vu1(),
            mtvu,
            renderer,
            cycle: 0,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn renderer_mut(&mut self) -> &mut dyn RendererBackend {
        self.renderer.as_mut()
    }

    /// Advance emulated time. Dispatches counter/vsync events, retries
    /// stalled producers and drains worker-side completions.
    pub fn step(&mut self, cycles: u32) {
        self.cycle += u64::from(cycles);
        if let Some(bridge) = self.mtvu.as_mut() {
            self.cycle += bridge.take_stolen_cycles();
            bridge.drain_gs_packets(&mut self.gif, &mut self.gs, &mut self.intc, self.renderer.as_mut());
        }

        self.counters
            .rcnt_update_hblank(self.cycle, &mut self.gs, &mut self.intc);
        let events = self
            .counters
            .rcnt_update(self.cycle, &mut self.gs, &mut self.intc);
        if events.vblank_started {
            self.renderer.vsync_start(self.gs.csr_field());
            self.renderer.present_frame();
        }

        self.gif.tick(cycles);
        self.vif0.tick(cycles);
        if self.vif1.tick(cycles) {
            // A timing break expired with no new data: retry whatever the
            // unit still holds (a parked VU op or an open DIRECT)
            self.vif1_transfer(&[]);
        }
    }

    // --------------------------------------------------------------
    // Privileged GS registers
    // --------------------------------------------------------------

    pub fn gs_read_csr(&self) -> u64 {
        self.gs.read_csr()
    }

    /// CSR writes carry cross-component effects: acknowledging SIGNAL
    /// releases a queued one in the GIF, and RESET cancels all in-flight
    /// path state plus the worker bridge.
    pub fn gs_write_csr(&mut self, value: u64) {
        let fx = self.gs.write_csr(value, self.renderer.as_mut());
        if fx.reset {
            self.gif.reset();
            if let Some(bridge) = self.mtvu.as_mut() {
                bridge.reset();
            }
            return;
        }
        if fx.signal_cleared {
            self.gif
                .signal_resume(&mut self.gs, &mut self.intc, self.renderer.as_mut());
        }
    }

    pub fn gs_read_imr(&self) -> u64 {
        self.gs.read_imr()
    }

    pub fn gs_write_imr(&mut self, value: u64) {
        self.gs.write_imr(value, &mut self.intc);
    }

    // --------------------------------------------------------------
    // DMA entry points
    // --------------------------------------------------------------

    /// GIF channel burst (PATH3). Returns false when the path buffer is
    /// saturated; the channel must suspend and retry.
    pub fn gif_transfer(&mut self, data: &[u8]) -> bool {
        self.drain_worker();
        self.gif.transfer_gs_packet_data(
            GifPathKind::Path3,
            data,
            &mut self.gs,
            &mut self.intc,
            self.renderer.as_mut(),
        )
    }

    /// VIF0 channel burst. Returns the words consumed.
    pub fn vif0_transfer(&mut self, words: &[u32]) -> usize {
        self.vif0.transfer(
            words,
            &mut VifBus {
                gif: &mut self.gif,
                gs: &mut self.gs,
                intc: &mut self.intc,
                vu: &mut self.vu0,
                mtvu: None,
                renderer: self.renderer.as_mut(),
            },
        )
    }

    /// VIF1 channel burst. Returns the words consumed.
    pub fn vif1_transfer(&mut self, words: &[u32]) -> usize {
        self.drain_worker();
        self.vif1.transfer(
            words,
            &mut VifBus {
                gif: &mut self.gif,
                gs: &mut self.gs,
                intc: &mut self.intc,
                vu: &mut self.vu1,
                mtvu: self.mtvu.as_mut(),
                renderer: self.renderer.as_mut(),
            },
        )
    }

    fn drain_worker(&mut self) {
        if let Some(bridge) = self.mtvu.as_mut() {
            bridge.drain_gs_packets(&mut self.gif, &mut self.gs, &mut self.intc, self.renderer.as_mut());
        }
    }

    // --------------------------------------------------------------
    // Save states
    // --------------------------------------------------------------

    pub fn save_state(&mut self) -> Result<Vec<u8>> {
        let state = SaveState {
            cycle: self.cycle,
            counters: self.counters.clone(),
            intc: self.intc.clone(),
            gs: self.gs.clone(),
            gif: self.gif.clone(),
            vif0: self.vif0.clone(),
            vif1: self.vif1.clone(),
            vu0_mem: self.vu0.mem.clone(),
            vu1_mem: self.vu1.mem.clone(),
            mtvu: self.mtvu.as_mut().map(|b| b.freeze()),
        };
        state.to_bytes()
    }

    pub fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        let state = SaveState::from_bytes(bytes)?;
        self.cycle = state.cycle;
        self.counters = state.counters;
        self.intc = state.intc;
        self.gs = state.gs;
        self.gs.auto_flush = self.config.auto_flush;
        self.gif = state.gif;
        self.vif0 = state.vif0;
        self.vif1 = state.vif1;
        self.vu0.mem = state.vu0_mem;
        self.vu1.mem = state.vu1_mem;
        self.vu0.backend.clear_range(0, u32::MAX);
        self.vu1.backend.clear_range(0, u32::MAX);
        if let (Some(bridge), Some(frozen)) = (self.mtvu.as_mut(), state.mtvu.as_ref()) {
            bridge.thaw(frozen);
        }
        // The renderer's caches are stale against the restored local memory
        self.renderer.reset_device();
        self.renderer.configure(&self.config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gif::tests::ad_packet;
    use crate::core::gs::registers::reg;
    use crate::core::gs::Csr;
    use crate::core::intc::lines;
    use crate::core::renderer::{DirtyRect, DrawCall, NullRenderer};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn session() -> EmulationSession {
        EmulationSession::new(EmuConfig::default(), Box::new(NullRenderer::default()))
    }

    #[test]
    fn test_vblank_events_reach_renderer_and_intc() {
        let mut s = session();
        // One NTSC frame is well under 5M EE cycles; step past the render
        // phase in chunks so every edge is observed
        for _ in 0..100 {
            s.step(60_000);
        }
        assert!(s.intc.line_pending(lines::VBLANK_START));
        assert!(s.intc.line_pending(lines::VBLANK_END));
    }

    #[test]
    fn test_csr_reset_cancels_gif_state() {
        let mut s = session();
        // Leave a half-delivered packet on PATH3
        let pkt = ad_packet(reg::FOGCOL, 5);
        assert!(s.gif_transfer(&pkt[..16]));
        assert!(!s.gif.path[2].is_done());

        s.gs_write_csr(u64::from(Csr::RESET.bits()));
        assert!(s.gif.path[2].is_done());
        assert_eq!(s.gs.fogcol, 0);
    }

    #[test]
    fn test_signal_ack_releases_queued_signal() {
        let mut s = session();
        let mut burst = ad_packet(reg::SIGNAL, 1);
        burst.extend_from_slice(&ad_packet(reg::SIGNAL, 2));
        assert!(s.gif_transfer(&burst));
        assert!(s.gs.signal_pending());
        assert!(s.gif.signal_blocked());

        s.gs_write_csr(u64::from(Csr::SIGNAL.bits()));
        // The queued SIGNAL was promoted by the acknowledge
        assert!(s.gs.signal_pending());
        assert!(!s.gif.signal_blocked());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let mut s = session();
        s.step(1234);
        s.vif0_transfer(&[0x0700_BEEF]); // MARK
        let bytes = s.save_state().unwrap();

        let mut t = session();
        t.load_state(&bytes).unwrap();
        assert_eq!(t.cycles(), s.cycles());
        assert_eq!(t.vif0.mark, 0xBEEF);
    }

    #[test]
    fn test_vif1_drives_gs_through_path2() {
        let mut s = session();
        let pkt = ad_packet(reg::FOGCOL, 0x42);
        let mut words = vec![0x5000_0002u32]; // DIRECT, 2 qwords
        for ch in pkt.chunks(4) {
            words.push(u32::from_le_bytes(ch.try_into().unwrap()));
        }
        assert_eq!(s.vif1_transfer(&words), words.len());
        assert_eq!(s.gs.fogcol, 0x42);
    }

    /// Backend that records the configuration handed to it
    struct ConfiguredRenderer {
        seen_upscale: Arc<AtomicU32>,
    }

    impl RendererBackend for ConfiguredRenderer {
        fn configure(&mut self, config: &EmuConfig) {
            self.seen_upscale
                .store(config.upscale_multiplier, Ordering::Relaxed);
        }

        fn draw(&mut self, _call: &DrawCall<'_>) {}
        fn invalidate(&mut self, _rect: DirtyRect) {}
        fn vsync_start(&mut self, _field: bool) {}
        fn present_frame(&mut self) {}
        fn reset_device(&mut self) {}
    }

    #[test]
    fn test_renderer_receives_config_at_construction() {
        let seen = Arc::new(AtomicU32::new(0));
        let mut cfg = EmuConfig::default();
        cfg.upscale_multiplier = 3;
        let renderer = ConfiguredRenderer {
            seen_upscale: seen.clone(),
        };
        let _s = EmulationSession::new(cfg, Box::new(renderer));
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_mtvu_session_executes_and_syncs() {
        let mut cfg = EmuConfig::default();
        cfg.mtvu = true;
        let mut s = EmulationSession::new(cfg, Box::new(NullRenderer::default()));
        // MSCAL through VIF1 lands on the worker bridge
        assert_eq!(s.vif1_transfer(&[0x1400_0000]), 1);
        s.mtvu.as_mut().unwrap().sync();
        assert!(s.mtvu.as_ref().unwrap().vu_idle());
        let bytes = s.save_state().unwrap();
        s.load_state(&bytes).unwrap();
    }
}
