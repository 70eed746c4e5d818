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

//! Multi-threaded VU1 bridge
//!
//! Offloads VU1 execution to a worker thread while the main loop keeps
//! running. A single SPSC word ring carries tagged records (microcode and
//! data writes, unpack payloads, program launches); the producer publishes
//! its write cursor with release ordering and the consumer publishes its
//! read cursor back the same way, so backpressure needs no lock. A record
//! never splits across the ring end: when it would, a NULL_PACKET marker
//! rewinds both sides to the start.
//!
//! Side effects flow back on two channels. PATH1 packets from XGKICK go
//! through a FIFO queue that the main loop drains into the GIF arbiter,
//! preserving completion order. SIGNAL/FINISH/LABEL writes found inside
//! those packets are stripped out and posted through per-event atomic
//! cells guarded by a flag bitmask; the producer claims them with an
//! acquire/release pair before every program launch so interrupt order
//! matches a synchronous run.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use super::gif::{GifPathKind, GifUnit};
use super::gif::tag::{GifFlag, GifTag};
use super::gs::registers::reg;
use super::gs::Gs;
use super::intc::Intc;
use super::renderer::RendererBackend;
use super::vif::unpack::{UnpackJob, UnpackRegs};
use super::vu::{NullVuBackend, VuBackend, VuMem};

/// Ring capacity in 32-bit words
const RING_WORDS: usize = 1 << 14;

/// Record kinds, stored in the high byte of the tag word
mod kind {
    pub const EXECUTE: u32 = 1;
    pub const WRITE_MICRO: u32 = 2;
    pub const WRITE_DATA: u32 = 3;
    pub const WRITE_COL: u32 = 4;
    pub const WRITE_ROW: u32 = 5;
    pub const UNPACK: u32 = 6;
    pub const NULL_PACKET: u32 = 7;
    pub const RESET: u32 = 8;
}

/// Pending-event bits posted by the consumer
mod event {
    pub const SIGNAL: u32 = 1 << 0;
    pub const FINISH: u32 = 1 << 1;
    pub const LABEL: u32 = 1 << 2;
}

/// Runs the rolling average blends
const CYCLE_AVG_RUNS: u32 = 4;

fn tag_word(kind: u32, payload_words: u32) -> u32 {
    (kind << 24) | (payload_words & 0x00FF_FFFF)
}

/// Counting semaphore built from a mutex and condvar; the consumer blocks
/// here when the ring drains.
struct Semaphore {
    count: Mutex<u32>,
    cv: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    fn post(&self) {
        let mut c = self.count.lock().unwrap();
        *c += 1;
        self.cv.notify_one();
    }

    fn wait(&self) {
        let mut c = self.count.lock().unwrap();
        while *c == 0 {
            c = self.cv.wait(c).unwrap();
        }
        *c -= 1;
    }
}

struct Shared {
    ring: Box<[AtomicU32]>,
    /// Producer-published, acquire-read by the consumer
    write_pos: AtomicUsize,
    /// Consumer-published, acquire-read by the producer's space check
    read_pos: AtomicUsize,
    /// True while the worker is between wakeup and drain completion
    busy: AtomicBool,
    shutdown: AtomicBool,
    sem: Semaphore,
    /// Pending-event bitmask; each bit guards one data cell below
    gs_flags: AtomicU32,
    gs_signal: AtomicU64,
    gs_label: AtomicU64,
    /// Rolling average of recent program costs, for cycle stealing
    avg_cycles: AtomicU32,
}

impl Shared {
    fn new() -> Self {
        let ring = (0..RING_WORDS).map(|_| AtomicU32::new(0)).collect();
        Self {
            ring,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            busy: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            sem: Semaphore::new(),
            gs_flags: AtomicU32::new(0),
            gs_signal: AtomicU64::new(0),
            gs_label: AtomicU64::new(0),
            avg_cycles: AtomicU32::new(0),
        }
    }
}

/// Worker-side state: the VU1 memory image, its execution backend, and the
/// unpack registers mirrored from VIF1 through ring records.
struct Consumer {
    mem: VuMem,
    backend: Box<dyn VuBackend>,
    regs: UnpackRegs,
    pack_tx: Sender<Vec<u8>>,
}

/// Quiesced bridge state for save states
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MtvuFreeze {
    pub write_pos: usize,
    pub read_pos: usize,
    pub gs_flags: u32,
    pub gs_signal: u64,
    pub gs_label: u64,
}

pub struct MtvuBridge {
    shared: Arc<Shared>,
    /// Producer's local mirror of the write cursor
    cursor: usize,
    /// Present in synchronous mode; moved into the worker otherwise
    consumer: Option<Consumer>,
    worker: Option<JoinHandle<()>>,
    pack_rx: Receiver<Vec<u8>>,
    /// EE cycles to charge per steal, scaled by the rolling average
    ee_cycle_skip: u32,
    stolen_cycles: u64,
}

impl MtvuBridge {
    /// `threaded` spawns the worker; otherwise records run inline at each
    /// enqueue, which keeps ordering deterministic for tests.
    pub fn new(threaded: bool, ee_cycle_skip: u32) -> Self {
        Self::with_backend(threaded, ee_cycle_skip, Box::new(NullVuBackend::default()))
    }

    pub fn with_backend(threaded: bool, ee_cycle_skip: u32, backend: Box<dyn VuBackend>) -> Self {
        let shared = Arc::new(Shared::new());
        let (pack_tx, pack_rx) = channel();
        let consumer = Consumer {
            mem: VuMem::vu1(),
            backend,
            regs: UnpackRegs::default(),
            pack_tx,
        };
        let mut bridge = Self {
            shared,
            cursor: 0,
            consumer: None,
            worker: None,
            pack_rx,
            ee_cycle_skip,
            stolen_cycles: 0,
        };
        if threaded {
            let shared = Arc::clone(&bridge.shared);
            let mut consumer = consumer;
            bridge.worker = Some(
                std::thread::Builder::new()
                    .name("vu1-worker".into())
                    .spawn(move || worker_loop(&shared, &mut consumer))
                    .unwrap_or_else(|e| panic!("spawning vu1 worker: {e}")),
            );
        } else {
            bridge.consumer = Some(consumer);
        }
        bridge
    }

    // --------------------------------------------------------------
    // Producer side
    // --------------------------------------------------------------

    /// Backpressure: make room for `words` ring words, emitting a wrap
    /// marker when the record would cross the end. Spins until the
    /// consumer frees enough space; the ring never fails.
    fn reserve(&mut self, words: usize) {
        debug_assert!(words < RING_WORDS / 2);
        if self.cursor + words >= RING_WORDS {
            // Mark the tail unusable and rewind
            self.wait_free_from(self.cursor, 1);
            self.shared.ring[self.cursor].store(tag_word(kind::NULL_PACKET, 0), Ordering::Relaxed);
            self.publish(0);
        }
        self.wait_free_from(self.cursor, words);
    }

    fn wait_free_from(&mut self, pos: usize, words: usize) {
        loop {
            let read = self.shared.read_pos.load(Ordering::Acquire);
            let free = (read + RING_WORDS - pos - 1) % RING_WORDS;
            if free >= words {
                return;
            }
            // Full ring: kick the consumer and yield
            self.shared.sem.post();
            self.drain_inline();
            std::thread::yield_now();
        }
    }

    fn push(&mut self, word: u32) {
        self.shared.ring[self.cursor].store(word, Ordering::Relaxed);
        self.cursor += 1;
    }

    /// Publish the new write cursor and wake the consumer.
    fn publish(&mut self, cursor: usize) {
        self.cursor = cursor;
        self.shared.busy.store(true, Ordering::Relaxed);
        self.shared.write_pos.store(cursor, Ordering::Release);
        self.shared.sem.post();
        self.drain_inline();
    }

    /// Synchronous mode only: run the consumer loop body right here.
    fn drain_inline(&mut self) {
        if let Some(consumer) = self.consumer.as_mut() {
            drain(&self.shared, consumer);
        }
    }

    fn enqueue(&mut self, kind: u32, header: &[u32], payload: &[u8]) {
        let pw = payload.len().div_ceil(4);
        let total = 1 + header.len() + pw;
        self.reserve(total);
        self.push(tag_word(kind, (header.len() + pw) as u32));
        for &w in header {
            self.push(w);
        }
        for ch in payload.chunks(4) {
            let mut b = [0u8; 4];
            b[..ch.len()].copy_from_slice(ch);
            self.push(u32::from_le_bytes(b));
        }
        let cursor = self.cursor;
        self.publish(cursor);
    }

    pub fn write_micro(&mut self, addr: u32, bytes: &[u8]) {
        self.enqueue(kind::WRITE_MICRO, &[addr, bytes.len() as u32], bytes);
    }

    /// Direct VU1 data-memory store at quadword address `addr`
    pub fn write_data(&mut self, addr: u32, qw: [u32; 4]) {
        self.enqueue(kind::WRITE_DATA, &[addr, qw[0], qw[1], qw[2], qw[3]], &[]);
    }

    pub fn write_row(&mut self, row: [u32; 4]) {
        self.enqueue(kind::WRITE_ROW, &row, &[]);
    }

    pub fn write_col(&mut self, col: [u32; 4]) {
        self.enqueue(kind::WRITE_COL, &col, &[]);
    }

    /// Ship a complete UNPACK. Row/col live consumer-side (kept current by
    /// WRITE_ROW/WRITE_COL records); the rest of the sampler travels with
    /// the payload.
    pub fn unpack(&mut self, job: &UnpackJob, regs: &UnpackRegs, payload: &[u8]) {
        let h0 = (job.addr & 0xFFFF)
            | (job.vl << 16)
            | (job.vn << 18)
            | (u32::from(job.usn) << 20)
            | (u32::from(job.masked) << 21);
        let h1 = job.num | (regs.cl << 9) | (regs.wl << 17) | (regs.mode << 25);
        self.enqueue(
            kind::UNPACK,
            &[h0, h1, regs.mask, payload.len() as u32],
            payload,
        );
    }

    /// Launch a VU1 program. Pending consumer-side GS events are claimed
    /// first so interrupt order matches a synchronous run; the rolling
    /// average of recent program costs is charged to the caller as stolen
    /// EE cycles.
    pub fn execute(&mut self, pc: Option<u32>, gs: &mut Gs, intc: &mut Intc) {
        // The event mailboxes hold one entry per kind; claim them before
        // this run can overwrite an unconsumed SIGNAL or LABEL
        self.get_gs_changes(gs, intc);
        // Steal against the cost of *previous* runs; this launch's own
        // cost is not known yet
        let avg = self.shared.avg_cycles.load(Ordering::Relaxed);
        self.stolen_cycles += u64::from(avg) * u64::from(self.ee_cycle_skip) / 100;
        let pc_word = pc.map_or(u32::MAX, |p| p);
        self.enqueue(kind::EXECUTE, &[pc_word], &[]);
    }

    /// EE cycles accumulated by the steal heuristic since the last call
    pub fn take_stolen_cycles(&mut self) -> u64 {
        std::mem::take(&mut self.stolen_cycles)
    }

    /// Mirror of a GS reset: flush the ring and reset the worker's state.
    pub fn reset(&mut self) {
        self.enqueue(kind::RESET, &[], &[]);
        self.sync();
        self.shared.gs_flags.store(0, Ordering::Release);
    }

    /// True when every record has been consumed and no program runs
    pub fn vu_idle(&self) -> bool {
        self.shared.read_pos.load(Ordering::Acquire) == self.cursor
            && !self.shared.busy.load(Ordering::Acquire)
    }

    /// Block until the worker has drained everything. Save states capture
    /// the bridge only at this quiescent point.
    pub fn sync(&mut self) {
        while !self.vu_idle() {
            self.shared.sem.post();
            self.drain_inline();
            std::thread::yield_now();
        }
    }

    /// Claim and apply GS events the worker posted. The flag bit is
    /// cleared with acquire-release so the claim can never be reordered
    /// ahead of the matching data publish.
    pub fn get_gs_changes(&mut self, gs: &mut Gs, intc: &mut Intc) {
        let flags = self.shared.gs_flags.swap(0, Ordering::AcqRel);
        if flags == 0 {
            return;
        }
        if flags & event::SIGNAL != 0 {
            let data = self.shared.gs_signal.load(Ordering::Acquire);
            let mask = (data >> 32) as u32;
            gs.sigid = (gs.sigid & !mask) | (data as u32 & mask);
            gs.set_signal(intc);
        }
        if flags & event::LABEL != 0 {
            let data = self.shared.gs_label.load(Ordering::Acquire);
            let mask = (data >> 32) as u32;
            gs.lblid = (gs.lblid & !mask) | (data as u32 & mask);
        }
        if flags & event::FINISH != 0 {
            gs.set_finish(intc);
        }
    }

    /// Forward queued PATH1 packets to the GIF arbiter in FIFO order.
    pub fn drain_gs_packets(
        &mut self,
        gif: &mut GifUnit,
        gs: &mut Gs,
        intc: &mut Intc,
        r: &mut dyn RendererBackend,
    ) {
        self.get_gs_changes(gs, intc);
        while let Ok(pkt) = self.pack_rx.try_recv() {
            gif.transfer_gs_packet_data(GifPathKind::Path1, &pkt, gs, intc, r);
        }
    }

    pub fn freeze(&mut self) -> MtvuFreeze {
        self.sync();
        MtvuFreeze {
            write_pos: self.cursor,
            read_pos: self.shared.read_pos.load(Ordering::Acquire),
            gs_flags: self.shared.gs_flags.load(Ordering::Acquire),
            gs_signal: self.shared.gs_signal.load(Ordering::Acquire),
            gs_label: self.shared.gs_label.load(Ordering::Acquire),
        }
    }

    pub fn thaw(&mut self, f: &MtvuFreeze) {
        self.sync();
        self.cursor = f.write_pos;
        self.shared.write_pos.store(f.write_pos, Ordering::Release);
        self.shared.read_pos.store(f.read_pos, Ordering::Release);
        self.shared.gs_signal.store(f.gs_signal, Ordering::Release);
        self.shared.gs_label.store(f.gs_label, Ordering::Release);
        self.shared.gs_flags.store(f.gs_flags, Ordering::Release);
    }
}

impl Drop for MtvuBridge {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.shared.shutdown.store(true, Ordering::Release);
            self.shared.sem.post();
            let _ = handle.join();
        }
    }
}

// ------------------------------------------------------------------
// Consumer side
// ------------------------------------------------------------------

fn worker_loop(shared: &Shared, consumer: &mut Consumer) {
    loop {
        shared.sem.wait();
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        drain(shared, consumer);
    }
}

/// Drain every published record, republishing the read cursor after each
/// one so producer backpressure sees progress immediately.
fn drain(shared: &Shared, consumer: &mut Consumer) {
    let mut pos = shared.read_pos.load(Ordering::Relaxed);
    loop {
        let write = shared.write_pos.load(Ordering::Acquire);
        if pos == write {
            break;
        }
        let tag = shared.ring[pos].load(Ordering::Relaxed);
        let kind = tag >> 24;
        let len = (tag & 0x00FF_FFFF) as usize;
        if kind == kind::NULL_PACKET {
            pos = 0;
            shared.read_pos.store(0, Ordering::Release);
            continue;
        }
        let words: Vec<u32> = (0..len)
            .map(|i| shared.ring[pos + 1 + i].load(Ordering::Relaxed))
            .collect();
        pos += 1 + len;
        run_record(shared, consumer, kind, &words);
        shared.read_pos.store(pos, Ordering::Release);
    }
    shared.busy.store(false, Ordering::Release);
}

fn payload_bytes(words: &[u32], byte_len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for w in words {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    bytes.truncate(byte_len);
    bytes
}

fn run_record(shared: &Shared, consumer: &mut Consumer, kind: u32, words: &[u32]) {
    match kind {
        kind::EXECUTE => {
            let pc = words[0];
            if pc != u32::MAX {
                consumer.backend.set_start_pc(pc);
            }
            let run = consumer.backend.execute(&mut consumer.mem, u32::MAX);
            // Blend into the rolling cost average
            let avg = shared.avg_cycles.load(Ordering::Relaxed);
            let blended = (avg * (CYCLE_AVG_RUNS - 1) + run.cycles_used) / CYCLE_AVG_RUNS;
            shared.avg_cycles.store(blended, Ordering::Relaxed);
            if let Some(mut pkt) = run.gif_packet {
                strip_gs_events(shared, &mut pkt);
                let _ = consumer.pack_tx.send(pkt);
            }
        }
        kind::WRITE_MICRO => {
            let byte_len = words[1] as usize;
            let bytes = payload_bytes(&words[2..], byte_len);
            consumer.mem.write_micro(words[0], &bytes);
            consumer.backend.clear_range(words[0], byte_len as u32);
        }
        kind::WRITE_DATA => {
            consumer
                .mem
                .write_data_qword(words[0], [words[1], words[2], words[3], words[4]]);
        }
        kind::WRITE_ROW => consumer.regs.row = [words[0], words[1], words[2], words[3]],
        kind::WRITE_COL => consumer.regs.col = [words[0], words[1], words[2], words[3]],
        kind::UNPACK => {
            let h0 = words[0];
            let h1 = words[1];
            let mut job = UnpackJob {
                active: true,
                vl: (h0 >> 16) & 3,
                vn: (h0 >> 18) & 3,
                usn: h0 & (1 << 20) != 0,
                masked: h0 & (1 << 21) != 0,
                addr: h0 & 0xFFFF,
                num: h1 & 0x1FF,
                cycle: 0,
                buf: Vec::new(),
                last: [0; 4],
            };
            consumer.regs.cl = (h1 >> 9) & 0xFF;
            consumer.regs.wl = (h1 >> 17) & 0xFF;
            consumer.regs.mode = (h1 >> 25) & 3;
            consumer.regs.mask = words[2];
            let bytes = payload_bytes(&words[4..], words[3] as usize);
            let mut regs = consumer.regs;
            job.feed(&mut regs, &mut consumer.mem, &bytes);
            // Mode 2 row accumulation stays visible to later unpacks
            consumer.regs.row = regs.row;
        }
        kind::RESET => {
            consumer.mem = VuMem::vu1();
            consumer.regs = UnpackRegs::default();
            consumer.backend.clear_range(0, u32::MAX);
        }
        _ => log::error!("vu1 worker: corrupt ring record kind {kind}"),
    }
}

/// Pull SIGNAL/FINISH/LABEL out of a PATH1 packet and post them as
/// pending events. The stripped slots become writes to an unmapped
/// address so the arbiter does not apply them a second time.
fn strip_gs_events(shared: &Shared, pkt: &mut [u8]) {
    let mut off = 0;
    while off + 16 <= pkt.len() {
        let lo = u64::from_le_bytes(pkt[off..off + 8].try_into().unwrap());
        let hi = u64::from_le_bytes(pkt[off + 8..off + 16].try_into().unwrap());
        let tag = GifTag::parse(lo, hi);
        off += 16;
        let payload = tag.payload_qwords() as usize * 16;
        if tag.flag() == GifFlag::Packed {
            let mut qw = off;
            'outer: for _ in 0..tag.nloop {
                for i in 0..tag.nreg {
                    if qw + 16 > pkt.len() {
                        break 'outer;
                    }
                    if tag.reg(i) == reg::AD {
                        let addr = pkt[qw + 8];
                        let data =
                            u64::from_le_bytes(pkt[qw..qw + 8].try_into().unwrap());
                        if post_event(shared, addr, data) {
                            // Retarget at a reserved address; the GS
                            // ignores it on replay
                            pkt[qw + 8] = 0x7F;
                        }
                    }
                    qw += 16;
                }
            }
        }
        off += payload;
        if tag.eop {
            break;
        }
    }
}

fn post_event(shared: &Shared, addr: u8, data: u64) -> bool {
    match addr {
        reg::SIGNAL => {
            shared.gs_signal.store(data, Ordering::Release);
            shared.gs_flags.fetch_or(event::SIGNAL, Ordering::Release);
            true
        }
        reg::LABEL => {
            shared.gs_label.store(data, Ordering::Release);
            shared.gs_flags.fetch_or(event::LABEL, Ordering::Release);
            true
        }
        reg::FINISH => {
            shared.gs_flags.fetch_or(event::FINISH, Ordering::Release);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gif::tests::ad_packet;
    use crate::core::renderer::NullRenderer;
    use crate::core::vu::VuRun;
    use std::sync::mpsc::Sender as MpscSender;

    /// Backend that logs the order of operations it sees. Each run emits
    /// the next queued GS packet, if any.
    struct OrderBackend {
        log: MpscSender<String>,
        packets: Vec<Vec<u8>>,
        cycles: u32,
    }

    impl VuBackend for OrderBackend {
        fn set_start_pc(&mut self, pc: u32) {
            let _ = self.log.send(format!("pc:{pc}"));
        }

        fn execute(&mut self, mem: &mut VuMem, _cycle_budget: u32) -> VuRun {
            let _ = self.log.send(format!("exec:{:x}", mem.micro[0]));
            let packet = if self.packets.is_empty() {
                None
            } else {
                Some(self.packets.remove(0))
            };
            VuRun {
                cycles_used: self.cycles,
                gif_packet: packet,
            }
        }

        fn clear_range(&mut self, _addr: u32, _len: u32) {}

        fn is_idle(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_records_apply_in_order() {
        let (tx, rx) = channel();
        let backend = OrderBackend {
            log: tx,
            packets: vec![],
            cycles: 100,
        };
        let mut bridge = MtvuBridge::with_backend(false, 50, Box::new(backend));
        let mut gs = Gs::new();
        let mut intc = Intc::new();
        bridge.write_micro(0, &[0xAB, 0, 0, 0]);
        bridge.execute(Some(0x20), &mut gs, &mut intc);
        bridge.write_micro(0, &[0xCD, 0, 0, 0]);
        bridge.execute(None, &mut gs, &mut intc);
        bridge.sync();
        let seen: Vec<String> = rx.try_iter().collect();
        // The microcode write before each launch is visible to it
        assert_eq!(seen, ["pc:32", "exec:ab", "exec:cd"]);
        assert!(bridge.vu_idle());
    }

    #[test]
    fn test_write_data_and_unpack_reach_vu_memory() {
        let (tx, _rx) = channel();
        let backend = OrderBackend {
            log: tx,
            packets: vec![],
            cycles: 0,
        };
        let mut bridge = MtvuBridge::with_backend(false, 0, Box::new(backend));
        bridge.write_data(5, [1, 2, 3, 4]);
        bridge.write_row([10, 20, 30, 40]);

        // Masked unpack pulling y/z/w from the mirrored row
        let job = UnpackJob {
            active: true,
            vl: 0,
            vn: 3,
            usn: false,
            masked: true,
            addr: 8,
            num: 1,
            cycle: 0,
            buf: Vec::new(),
            last: [0; 4],
        };
        let regs = UnpackRegs {
            mask: 0b01_01_01_00,
            ..UnpackRegs::default()
        };
        let mut payload = Vec::new();
        for v in [7u32, 0, 0, 0] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        bridge.unpack(&job, &regs, &payload);
        bridge.sync();

        let consumer = bridge.consumer.as_ref().unwrap();
        assert_eq!(consumer.mem.read_data_qword(5), [1, 2, 3, 4]);
        assert_eq!(consumer.mem.read_data_qword(8), [7, 20, 30, 40]);
    }

    #[test]
    fn test_gs_packet_flows_to_gif_in_fifo_order() {
        use crate::core::gs::registers::reg;

        let (tx, _rx) = channel();
        let backend = OrderBackend {
            log: tx,
            packets: vec![ad_packet(reg::FOGCOL, 0x77)],
            cycles: 0,
        };
        let mut bridge = MtvuBridge::with_backend(false, 0, Box::new(backend));
        let mut gif = GifUnit::new();
        let mut gs = Gs::new();
        let mut intc = Intc::new();
        let mut r = NullRenderer::default();
        bridge.execute(Some(0), &mut gs, &mut intc);
        bridge.sync();
        bridge.drain_gs_packets(&mut gif, &mut gs, &mut intc, &mut r);
        assert_eq!(gs.fogcol, 0x77);
    }

    #[test]
    fn test_signal_is_stripped_and_posted_as_event() {
        use crate::core::gs::registers::reg;
        use crate::core::gs::{Csr, Imr};
        use crate::core::intc::lines;

        let (tx, _rx) = channel();
        let backend = OrderBackend {
            log: tx,
            packets: vec![ad_packet(reg::SIGNAL, (0xFFFF_FFFFu64 << 32) | 0x1234)],
            cycles: 0,
        };
        let mut bridge = MtvuBridge::with_backend(false, 0, Box::new(backend));
        let mut gs = Gs::new();
        gs.imr = Imr::empty();
        let mut intc = Intc::new();
        bridge.execute(Some(0), &mut gs, &mut intc);
        bridge.sync();

        bridge.get_gs_changes(&mut gs, &mut intc);
        assert_eq!(gs.sigid, 0x1234);
        assert!(gs.csr.contains(Csr::SIGNAL));
        assert!(intc.line_pending(lines::GS));

        // The packet replay must not re-apply the stripped SIGNAL
        let _ = gs.write_csr(u64::from(Csr::SIGNAL.bits()), &mut NullRenderer::default());
        let mut gif = GifUnit::new();
        let mut r = NullRenderer::default();
        bridge.drain_gs_packets(&mut gif, &mut gs, &mut intc, &mut r);
        assert!(!gs.csr.contains(Csr::SIGNAL));
    }

    #[test]
    fn test_back_to_back_launches_keep_signal_merge() {
        use crate::core::gs::registers::reg;

        let (tx, _rx) = channel();
        let backend = OrderBackend {
            log: tx,
            packets: vec![
                ad_packet(reg::SIGNAL, (0xFFu64 << 32) | 0xAA),
                ad_packet(reg::SIGNAL, (0xFF00u64 << 32) | 0xBB00),
            ],
            cycles: 0,
        };
        let mut bridge = MtvuBridge::with_backend(false, 0, Box::new(backend));
        let mut gs = Gs::new();
        let mut intc = Intc::new();
        // The second launch must claim the first run's SIGNAL before its
        // own run can overwrite the mailbox
        bridge.execute(Some(0), &mut gs, &mut intc);
        bridge.execute(Some(0), &mut gs, &mut intc);
        bridge.sync();
        bridge.get_gs_changes(&mut gs, &mut intc);
        assert_eq!(gs.sigid, 0xBBAA);
    }

    #[test]
    fn test_cycle_steal_uses_rolling_average() {
        let (tx, _rx) = channel();
        let backend = OrderBackend {
            log: tx,
            packets: vec![],
            cycles: 400,
        };
        let mut bridge = MtvuBridge::with_backend(false, 50, Box::new(backend));
        let mut gs = Gs::new();
        let mut intc = Intc::new();
        // First launch: no history yet, nothing stolen
        bridge.execute(Some(0), &mut gs, &mut intc);
        assert_eq!(bridge.take_stolen_cycles(), 0);
        // Second launch sees the blended cost of the first
        bridge.execute(Some(0), &mut gs, &mut intc);
        assert_eq!(bridge.take_stolen_cycles(), 100 * 50 / 100);
    }

    #[test]
    fn test_ring_wraps_through_null_packet() {
        let (tx, rx) = channel();
        let backend = OrderBackend {
            log: tx,
            packets: vec![],
            cycles: 0,
        };
        let mut bridge = MtvuBridge::with_backend(false, 0, Box::new(backend));
        let mut gs = Gs::new();
        let mut intc = Intc::new();
        // Large microcode uploads force several wraps
        let blob = vec![0u8; RING_WORDS];
        for _ in 0..20 {
            bridge.write_micro(0, &blob);
        }
        bridge.execute(Some(0), &mut gs, &mut intc);
        bridge.sync();
        assert!(bridge.vu_idle());
        let seen: Vec<String> = rx.try_iter().collect();
        assert_eq!(seen.last().map(String::as_str), Some("exec:0"));
    }

    #[test]
    fn test_threaded_worker_round_trip() {
        let mut bridge = MtvuBridge::new(true, 0);
        let mut gs = Gs::new();
        let mut intc = Intc::new();
        bridge.write_data(3, [9, 8, 7, 6]);
        bridge.execute(Some(0), &mut gs, &mut intc);
        bridge.sync();
        assert!(bridge.vu_idle());
        let frozen = bridge.freeze();
        assert_eq!(frozen.read_pos, frozen.write_pos);
    }

    #[test]
    fn test_reset_clears_worker_state() {
        let (tx, _rx) = channel();
        let backend = OrderBackend {
            log: tx,
            packets: vec![],
            cycles: 0,
        };
        let mut bridge = MtvuBridge::with_backend(false, 0, Box::new(backend));
        bridge.write_data(0, [1, 1, 1, 1]);
        bridge.reset();
        let consumer = bridge.consumer.as_ref().unwrap();
        assert_eq!(consumer.mem.read_data_qword(0), [0, 0, 0, 0]);
    }
}
