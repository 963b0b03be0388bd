//! MJPEG frame reassembly from the lossy video port
//!
//! Each UDP datagram carries a 4-byte header (`frame_id`, `is_last`,
//! `packet_num`, reserved) followed by a JPEG slice. There is no
//! retransmission: any gap or reorder aborts the whole frame and the
//! assembler waits for the next `packet_num == 1` to resync.
//!
//! # Robustness
//!
//! 1. **Strict in-order append**: a fragment is appended only when its
//!    packet number is exactly the successor (mod 256) of the previous one
//!    and it belongs to the current frame. Anything else drops the frame —
//!    never a partial emission.
//! 2. **Aborted sub-state**: after a gap, every further fragment of the
//!    broken frame is ignored until a fresh frame start arrives.
//! 3. **Bounded buffer**: a frame growing past the cap aborts (a lost
//!    final fragment must not accumulate the next frames into one blob).
//! 4. **JPEG validation**: a frame is emitted only when it begins with the
//!    SOI marker and ends with the EOI marker.

use super::constants::*;

/// Result of ingesting one video datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentResult {
    /// Fragment consumed, frame still in progress
    Buffered,
    /// A complete JPEG frame was assembled
    Frame(Vec<u8>),
    /// Fragment discarded (malformed, gap, stale, or oversized frame)
    Dropped,
}

/// Stateful fragment-to-frame assembler for one video endpoint.
///
/// Single-threaded: owned by the video receive task.
pub struct FrameAssembler {
    buffer: Vec<u8>,
    current_frame_id: u8,
    last_packet_num: u8,
    /// Set after a gap; cleared by the next `packet_num == 1`
    aborted: bool,
    frames_emitted: u64,
    fragments_dropped: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FRAGMENT_FULL_LEN * 24),
            current_frame_id: 0,
            last_packet_num: 0,
            aborted: true,
            frames_emitted: 0,
            fragments_dropped: 0,
        }
    }

    /// Diagnostic counters: (frames emitted, fragments dropped)
    pub fn diagnostics(&self) -> (u64, u64) {
        (self.frames_emitted, self.fragments_dropped)
    }

    /// Discard any partial frame (called on reconnect)
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.aborted = true;
    }

    /// Ingest one datagram from the video port
    pub fn ingest(&mut self, packet: &[u8]) -> FragmentResult {
        if packet.len() < FRAGMENT_HEADER_LEN + 1 {
            return self.drop_fragment("runt packet");
        }

        let frame_id = packet[0];
        let is_last = packet[1] == 0x01;
        let packet_num = packet[2];

        // Every non-final fragment is exactly one full datagram
        if packet.len() != FRAGMENT_FULL_LEN && !is_last {
            return self.drop_fragment("undersized non-final fragment");
        }

        let payload = &packet[FRAGMENT_HEADER_LEN..];

        if packet_num == 1 {
            // Frame start always resyncs, discarding any partial frame
            self.buffer.clear();
            self.current_frame_id = frame_id;
            self.last_packet_num = 1;
            self.aborted = false;
            self.buffer.extend_from_slice(payload);
        } else {
            if self.aborted {
                self.fragments_dropped += 1;
                return FragmentResult::Dropped;
            }
            if self.last_packet_num.wrapping_add(1) != packet_num
                || frame_id != self.current_frame_id
            {
                // Gap, reorder, or a stale fragment of another frame:
                // abandon the frame entirely
                self.aborted = true;
                self.buffer.clear();
                return self.drop_fragment("fragment sequence broken");
            }
            self.buffer.extend_from_slice(payload);
            self.last_packet_num = packet_num;
        }

        if self.buffer.len() > FRAME_MAX_LEN {
            self.aborted = true;
            self.buffer.clear();
            return self.drop_fragment("frame exceeds size cap");
        }

        if is_last {
            return self.finish_frame();
        }

        FragmentResult::Buffered
    }

    fn finish_frame(&mut self) -> FragmentResult {
        let n = self.buffer.len();
        let valid = n >= 2
            && self.buffer[..2] == JPEG_SOI
            && self.buffer[n - 2..] == JPEG_EOI;

        if !valid {
            self.aborted = true;
            self.buffer.clear();
            return self.drop_fragment("assembled frame is not a JPEG");
        }

        let frame = std::mem::take(&mut self.buffer);
        self.aborted = true; // next frame must start at packet_num 1
        self.frames_emitted += 1;
        log::trace!(
            "video frame {} complete: {} bytes",
            self.current_frame_id,
            frame.len()
        );
        FragmentResult::Frame(frame)
    }

    fn drop_fragment(&mut self, reason: &str) -> FragmentResult {
        self.fragments_dropped += 1;
        log::trace!("video fragment dropped: {}", reason);
        FragmentResult::Dropped
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build one fragment datagram; non-final fragments are padded to the
    /// full datagram size.
    fn fragment(frame_id: u8, packet_num: u8, is_last: bool, payload: &[u8]) -> Vec<u8> {
        let mut pkt = vec![frame_id, if is_last { 1 } else { 0 }, packet_num, 0];
        pkt.extend_from_slice(payload);
        if !is_last {
            pkt.resize(FRAGMENT_FULL_LEN, 0xAB);
        }
        pkt
    }

    /// Feed a whole JPEG split across `count` fragments
    fn feed_frame(asm: &mut FrameAssembler, frame_id: u8, count: u8) -> Option<Vec<u8>> {
        let chunk = FRAGMENT_FULL_LEN - FRAGMENT_HEADER_LEN;
        let mut jpeg = vec![0u8; chunk * (count as usize - 1) + 16];
        jpeg[..2].copy_from_slice(&JPEG_SOI);
        let n = jpeg.len();
        jpeg[n - 2..].copy_from_slice(&JPEG_EOI);

        let mut emitted = None;
        for (i, part) in jpeg.chunks(chunk).enumerate() {
            let last = i as u8 + 1 == count;
            match asm.ingest(&fragment(frame_id, i as u8 + 1, last, part)) {
                FragmentResult::Frame(f) => emitted = Some(f),
                FragmentResult::Buffered => {}
                FragmentResult::Dropped => panic!("unexpected drop at fragment {}", i + 1),
            }
        }
        emitted
    }

    #[test]
    fn test_reassembles_multi_fragment_frame() {
        let mut asm = FrameAssembler::new();
        let frame = feed_frame(&mut asm, 5, 22).expect("frame not emitted");

        let chunk = FRAGMENT_FULL_LEN - FRAGMENT_HEADER_LEN;
        assert_eq!(frame.len(), chunk * 21 + 16);
        assert_eq!(&frame[..2], &JPEG_SOI);
        assert_eq!(&frame[frame.len() - 2..], &JPEG_EOI);
        assert_eq!(asm.diagnostics(), (1, 0));
    }

    #[test]
    fn test_gap_drops_whole_frame_then_resyncs() {
        let mut asm = FrameAssembler::new();
        let chunk = FRAGMENT_FULL_LEN - FRAGMENT_HEADER_LEN;
        let payload = vec![0u8; chunk];

        assert_eq!(
            asm.ingest(&fragment(5, 1, false, &payload)),
            FragmentResult::Buffered
        );
        // Packet 2 lost; packet 3 arrives
        assert_eq!(
            asm.ingest(&fragment(5, 3, false, &payload)),
            FragmentResult::Dropped
        );
        // Remaining fragments of the broken frame are ignored
        assert_eq!(
            asm.ingest(&fragment(5, 4, false, &payload)),
            FragmentResult::Dropped
        );
        assert_eq!(
            asm.ingest(&fragment(5, 5, true, &[0xFF, 0xD9])),
            FragmentResult::Dropped
        );

        // Next frame starting at packet 1 reassembles normally
        assert!(feed_frame(&mut asm, 6, 3).is_some());
    }

    #[test]
    fn test_runt_and_undersized_fragments_dropped() {
        let mut asm = FrameAssembler::new();

        assert_eq!(asm.ingest(&[5, 0, 1]), FragmentResult::Dropped);

        // Non-final fragment shorter than the full datagram size
        let mut short = fragment(5, 1, false, &[1, 2, 3]);
        short.truncate(100);
        assert_eq!(asm.ingest(&short), FragmentResult::Dropped);
    }

    #[test]
    fn test_final_fragment_may_be_short() {
        let mut asm = FrameAssembler::new();
        let mut jpeg = JPEG_SOI.to_vec();
        jpeg.extend_from_slice(&[1, 2, 3]);
        jpeg.extend_from_slice(&JPEG_EOI);

        match asm.ingest(&fragment(9, 1, true, &jpeg)) {
            FragmentResult::Frame(f) => assert_eq!(f, jpeg),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_without_jpeg_markers_rejected() {
        let mut asm = FrameAssembler::new();
        let result = asm.ingest(&fragment(9, 1, true, &[0x00, 0x01, 0x02, 0x03]));
        assert_eq!(result, FragmentResult::Dropped);
    }

    #[test]
    fn test_frame_id_change_mid_frame_drops() {
        let mut asm = FrameAssembler::new();
        let chunk = FRAGMENT_FULL_LEN - FRAGMENT_HEADER_LEN;
        let payload = vec![0u8; chunk];

        asm.ingest(&fragment(5, 1, false, &payload));
        assert_eq!(
            asm.ingest(&fragment(6, 2, false, &payload)),
            FragmentResult::Dropped
        );
    }

    #[test]
    fn test_size_cap_aborts_frame() {
        let mut asm = FrameAssembler::new();
        let chunk = FRAGMENT_FULL_LEN - FRAGMENT_HEADER_LEN;
        let payload = vec![0u8; chunk];

        // 300 kB cap trips just past 204 full fragments
        asm.ingest(&fragment(1, 1, false, &payload));
        let mut dropped = false;
        for num in 2..=250u8 {
            if asm.ingest(&fragment(1, num, false, &payload)) == FragmentResult::Dropped {
                dropped = true;
                break;
            }
        }
        assert!(dropped);
        assert!(asm.diagnostics().1 > 0);
    }

    #[test]
    fn test_packet_num_wraps_at_256() {
        let mut asm = FrameAssembler::new();
        let chunk = FRAGMENT_FULL_LEN - FRAGMENT_HEADER_LEN;
        let payload = vec![0u8; chunk];

        // Start a frame and walk packet numbers up to the wrap point, but
        // stay under the size cap by restarting: wrapping_add(1) of 255 is
        // 0, and the assembler must accept 255 → 0 as consecutive.
        asm.ingest(&fragment(1, 1, false, &payload));
        asm.last_packet_num = 255;
        assert_eq!(
            asm.ingest(&fragment(1, 0, false, &payload)),
            FragmentResult::Buffered
        );
    }
}
