//! # Legacy Link Session
//!
//! Session for the older 5-byte framing: `[header][encoder BE][stepper BE]`
//! with no checksum. The header's top two bits give the message kind and the
//! low bits the index, which wraps at 16.
//!
//! Any header the session does not expect is NACKed and the session drops
//! into [`LegacyState::Resync`], where it consumes single bytes until it sees
//! [`SYNC_PAD_RUN`] consecutive pads or has spent [`SYNC_MAX_ATTEMPTS`] bytes.

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::decoder::decode_legacy_frame;
use super::protocol::*;
use super::{LinkEvent, LinkSession, LinkState, LinkStats, LinkStep};
use crate::error::{AnalyserError, Result};

/// Legacy session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyState {
    Running,
    /// Hunting for the pad run that re-aligns framing
    Resync { pad_run: usize, attempts: usize },
    Terminated,
}

/// Link session for the legacy 5-byte protocol
#[derive(Debug)]
pub struct LegacySession {
    /// Index of the last accepted frame
    index: u8,
    state: LegacyState,
    stats: LinkStats,
}

impl Default for LegacySession {
    fn default() -> Self {
        Self::new()
    }
}

impl LegacySession {
    pub fn new() -> Self {
        Self {
            index: 0,
            state: LegacyState::Running,
            stats: LinkStats::default(),
        }
    }

    /// Detailed state, including resync progress
    pub fn legacy_state(&self) -> LegacyState {
        self.state
    }

    fn next_index(&self) -> u8 {
        (self.index + 1) % LEGACY_INDEX_MODULUS
    }

    fn enter_resync(&mut self) {
        info!("Beginning sync attempt at index {}", self.index);
        self.state = LegacyState::Resync { pad_run: 0, attempts: 0 };
    }

    fn step_frame(&mut self, bytes: &[u8]) -> Result<LinkStep> {
        let frame = match decode_legacy_frame(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.bad_messages += 1;
                self.enter_resync();
                return Err(e);
            }
        };
        self.stats.frames += 1;

        let next = self.next_index();
        if frame.header == next {
            self.index = next;
            debug!(
                "Frame {} ok: encoder {}, stepper {}",
                next, frame.encoder_delta, frame.stepper_delta
            );
            let sample = RawSample::valid(
                next,
                frame.encoder_delta,
                frame.stepper_delta,
                Bytes::copy_from_slice(bytes),
            );
            return Ok(LinkStep::new(LinkEvent::Sample(sample), Some(GOOD_ACK | next)));
        }

        match frame.kind() {
            HeaderKind::Message => {
                info!("Peer sent message header, terminating link session");
                self.state = LegacyState::Terminated;
                Ok(LinkStep::silent(LinkEvent::Terminated))
            }
            HeaderKind::Sync => {
                self.index = frame.index();
                debug!("Peer sync, index now {}", self.index);
                Ok(LinkStep::silent(LinkEvent::Resynced { index: self.index }))
            }
            HeaderKind::Normal | HeaderKind::Error => {
                self.stats.bad_messages += 1;
                let fault = FrameFault::UnexpectedHeader {
                    header: frame.header,
                    expected: next,
                };
                warn!("Bad frame: {} ({} bad so far)", fault, self.stats.bad_messages);
                let reply = BAD_ACK | self.index;
                self.enter_resync();
                Ok(LinkStep::new(LinkEvent::Dropped(fault), Some(reply)))
            }
        }
    }

    fn step_resync(&mut self, byte: u8, mut pad_run: usize, mut attempts: usize) -> LinkStep {
        attempts += 1;
        if byte == SYNC_PAD {
            pad_run += 1;
        } else {
            pad_run = 0;
        }
        debug!("Sync padding: 0x{:02X} (run {}, attempt {})", byte, pad_run, attempts);

        if pad_run >= SYNC_PAD_RUN {
            self.stats.resyncs += 1;
            self.state = LegacyState::Running;
            info!("Resynchronized after {} bytes", attempts);
            return LinkStep::silent(LinkEvent::Resynced { index: self.index });
        }

        if attempts >= SYNC_MAX_ATTEMPTS {
            self.stats.failed_resyncs += 1;
            self.state = LegacyState::Running;
            warn!("No pad run within {} bytes, resuming framing", attempts);
            return LinkStep::silent(LinkEvent::ResyncAbandoned { index: self.index });
        }

        self.state = LegacyState::Resync { pad_run, attempts };
        LinkStep::silent(LinkEvent::Syncing)
    }
}

impl LinkSession for LegacySession {
    fn bytes_needed(&self) -> usize {
        match self.state {
            LegacyState::Resync { .. } => 1,
            _ => LEGACY_FRAME_LEN,
        }
    }

    fn step(&mut self, bytes: &[u8]) -> Result<LinkStep> {
        match self.state {
            LegacyState::Terminated => Ok(LinkStep::silent(LinkEvent::Terminated)),
            LegacyState::Running => self.step_frame(bytes),
            LegacyState::Resync { pad_run, attempts } => match bytes {
                [byte] => Ok(self.step_resync(*byte, pad_run, attempts)),
                _ => Err(AnalyserError::MalformedFrame {
                    expected: 1,
                    actual: bytes.len(),
                }),
            },
        }
    }

    fn idle_poll(&self) -> Option<u8> {
        match self.state {
            LegacyState::Running => Some(BUFFER_EMPTY | self.index),
            _ => None,
        }
    }

    fn state(&self) -> LinkState {
        match self.state {
            LegacyState::Running => LinkState::Running,
            LegacyState::Resync { .. } => LinkState::Resync,
            LegacyState::Terminated => LinkState::Terminated,
        }
    }

    fn stats(&self) -> LinkStats {
        self.stats
    }

    fn expected_index(&self) -> u8 {
        self.next_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::encoder::{encode_legacy_frame, encode_legacy_with_header};

    fn resync_with(session: &mut LegacySession, bytes: &[u8]) -> Vec<LinkEvent> {
        bytes
            .iter()
            .map(|b| session.step(&[*b]).unwrap().event)
            .collect()
    }

    #[test]
    fn test_in_sequence_frames_accepted() {
        let mut session = LegacySession::new();

        for i in 1..=3u8 {
            let step = session.step(&encode_legacy_frame(i, 10 * i as i16, -5)).unwrap();
            assert_eq!(step.reply, Some(GOOD_ACK | i));
            match step.event {
                LinkEvent::Sample(sample) => {
                    assert_eq!(sample.index, i);
                    assert_eq!(sample.encoder_delta, 10 * i as i16);
                    assert_eq!(sample.stepper_delta, -5);
                    assert!(sample.valid);
                }
                other => panic!("Expected sample, got: {:?}", other),
            }
        }
        assert_eq!(session.stats().bad_messages, 0);
    }

    #[test]
    fn test_index_wraps_at_sixteen() {
        let mut session = LegacySession::new();
        for i in 1..16u8 {
            session.step(&encode_legacy_frame(i, 0, 0)).unwrap();
        }
        assert_eq!(session.expected_index(), 0);

        let step = session.step(&encode_legacy_frame(0, 0, 0)).unwrap();
        assert!(matches!(step.event, LinkEvent::Sample(_)));
        assert_eq!(session.expected_index(), 1);
    }

    #[test]
    fn test_idle_poll_carries_index() {
        let mut session = LegacySession::new();
        assert_eq!(session.idle_poll(), Some(BUFFER_EMPTY));

        session.step(&encode_legacy_frame(1, 0, 0)).unwrap();
        assert_eq!(session.idle_poll(), Some(BUFFER_EMPTY | 1));
    }

    #[test]
    fn test_message_header_terminates() {
        let mut session = LegacySession::new();
        let step = session.step(&encode_legacy_with_header(0xC0, 0, 0)).unwrap();

        assert_eq!(step.event, LinkEvent::Terminated);
        assert!(session.is_terminated());
        assert_eq!(session.idle_poll(), None);
    }

    #[test]
    fn test_sync_header_adopts_index() {
        let mut session = LegacySession::new();
        let step = session.step(&encode_legacy_with_header(0x80 | 9, 0, 0)).unwrap();

        assert_eq!(step.event, LinkEvent::Resynced { index: 9 });
        assert_eq!(step.reply, None);
        assert_eq!(session.expected_index(), 10);
    }

    #[test]
    fn test_out_of_sequence_nacks_and_enters_resync() {
        let mut session = LegacySession::new();
        session.step(&encode_legacy_frame(1, 0, 0)).unwrap();

        let step = session.step(&encode_legacy_frame(4, 0, 0)).unwrap();
        assert_eq!(step.reply, Some(BAD_ACK | 1));
        assert_eq!(
            step.event,
            LinkEvent::Dropped(FrameFault::UnexpectedHeader { header: 4, expected: 2 })
        );
        assert_eq!(session.state(), LinkState::Resync);
        assert_eq!(session.bytes_needed(), 1);
        assert_eq!(session.idle_poll(), None);
        assert_eq!(session.stats().bad_messages, 1);
    }

    #[test]
    fn test_resync_completes_on_pad_run() {
        let mut session = LegacySession::new();
        session.step(&encode_legacy_frame(7, 0, 0)).unwrap();
        assert_eq!(session.state(), LinkState::Resync);

        let events = resync_with(&mut session, &[0x12, SYNC_PAD, SYNC_PAD, 0x00, SYNC_PAD, SYNC_PAD, SYNC_PAD]);
        assert!(events.iter().all(|e| *e == LinkEvent::Syncing));
        assert_eq!(session.legacy_state(), LegacyState::Resync { pad_run: 3, attempts: 7 });

        let step = session.step(&[SYNC_PAD]).unwrap();
        assert_eq!(step.event, LinkEvent::Resynced { index: 0 });
        assert_eq!(session.state(), LinkState::Running);
        assert_eq!(session.bytes_needed(), LEGACY_FRAME_LEN);
        assert_eq!(session.stats().resyncs, 1);
    }

    #[test]
    fn test_resync_gives_up_after_attempt_budget() {
        let mut session = LegacySession::new();
        session.step(&encode_legacy_frame(7, 0, 0)).unwrap();

        let noise = [0x11u8; SYNC_MAX_ATTEMPTS];
        let events = resync_with(&mut session, &noise);

        assert_eq!(events.last(), Some(&LinkEvent::ResyncAbandoned { index: 0 }));
        assert_eq!(session.state(), LinkState::Running);
        assert_eq!(session.stats().failed_resyncs, 1);
        assert_eq!(session.stats().resyncs, 0);
    }

    #[test]
    fn test_wrong_length_enters_resync() {
        let mut session = LegacySession::new();
        let result = session.step(&[0x01, 0x00]);

        assert!(matches!(result, Err(AnalyserError::MalformedFrame { expected: 5, actual: 2 })));
        assert_eq!(session.state(), LinkState::Resync);
        assert_eq!(session.stats().bad_messages, 1);
    }

    #[test]
    fn test_pads_behind_rejected_frame_are_kept() {
        assert!(!LegacySession::new().discard_after_reject());
    }
}
