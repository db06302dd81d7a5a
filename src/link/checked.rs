//! # Checked Link Session
//!
//! Session for 6-byte CRC-checked frames.
//!
//! Every frame is compared against the break sentinel first, then checked for
//! CRC and sequence index. What happens to a bad frame depends on the
//! [`AckPolicy`]:
//!
//! | Policy | Good frame | Bad frame |
//! |--------|------------|-----------|
//! | `ResendOnError` | GOOD_ACK, sample | BAD_ACK, dropped, index held |
//! | `TolerateErrors` | sample | annotated sample, no reply |
//!
//! On a good CRC the expected index follows the frame's own index, so an
//! index mismatch under `TolerateErrors` resynchronizes to the peer. A bad CRC
//! never moves the expected index since the index byte itself is suspect.

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::crc::CRC8_TABLE;
use super::decoder::{decode_frame, expected_checksum, find_break, is_break};
use super::protocol::*;
use super::{AckPolicy, LinkEvent, LinkSession, LinkState, LinkStats, LinkStep};
use crate::error::Result;

/// Link session for the checked 6-byte protocol
#[derive(Debug)]
pub struct CheckedSession {
    policy: AckPolicy,
    table: &'static [u8; 256],
    expected_index: u8,
    state: LinkState,
    stats: LinkStats,
}

impl CheckedSession {
    /// Create a session expecting index 0
    pub fn new(policy: AckPolicy) -> Self {
        Self::with_expected_index(policy, 0)
    }

    /// Create a session expecting `index` next
    pub fn with_expected_index(policy: AckPolicy, index: u8) -> Self {
        Self {
            policy,
            table: &CRC8_TABLE,
            expected_index: index % INDEX_MODULUS,
            state: LinkState::Running,
            stats: LinkStats::default(),
        }
    }

    pub fn policy(&self) -> AckPolicy {
        self.policy
    }

    fn advance_from(&mut self, index: u8) {
        self.expected_index = (index % INDEX_MODULUS + 1) % INDEX_MODULUS;
    }
}

impl LinkSession for CheckedSession {
    fn bytes_needed(&self) -> usize {
        FRAME_LEN
    }

    fn step(&mut self, bytes: &[u8]) -> Result<LinkStep> {
        if self.state == LinkState::Terminated {
            return Ok(LinkStep::silent(LinkEvent::Terminated));
        }

        if is_break(bytes) {
            info!("Peer sent break sentinel, terminating link session");
            self.state = LinkState::Terminated;
            return Ok(LinkStep::silent(LinkEvent::Terminated));
        }

        let frame = decode_frame(bytes)?;
        self.stats.frames += 1;

        let expected_crc = expected_checksum(&frame, self.table);
        let good_crc = expected_crc == frame.checksum;
        let good_index = frame.index == self.expected_index;

        let fault = if !good_crc {
            Some(FrameFault::ChecksumMismatch {
                expected: expected_crc,
                received: frame.checksum,
            })
        } else if !good_index {
            Some(FrameFault::IndexMismatch {
                expected: self.expected_index,
                received: frame.index,
            })
        } else {
            None
        };

        let raw = Bytes::copy_from_slice(bytes);

        let Some(fault) = fault else {
            debug!(
                "Frame {} ok: encoder {}, stepper {}",
                frame.index, frame.encoder_delta, frame.stepper_delta
            );
            self.advance_from(frame.index);
            let reply = match self.policy {
                AckPolicy::ResendOnError => Some(GOOD_ACK),
                AckPolicy::TolerateErrors => None,
            };
            let sample = RawSample::valid(frame.index, frame.encoder_delta, frame.stepper_delta, raw);
            return Ok(LinkStep::new(LinkEvent::Sample(sample), reply));
        };

        self.stats.bad_messages += 1;
        warn!(
            "Bad frame [{}]: {} ({} bad so far)",
            super::decoder::to_hex(bytes),
            fault,
            self.stats.bad_messages
        );

        match self.policy {
            AckPolicy::ResendOnError => Ok(LinkStep::new(LinkEvent::Dropped(fault), Some(BAD_ACK))),
            AckPolicy::TolerateErrors => {
                if good_crc {
                    self.advance_from(frame.index);
                }
                let sample = RawSample {
                    index: frame.index,
                    encoder_delta: frame.encoder_delta,
                    stepper_delta: frame.stepper_delta,
                    valid: false,
                    bad_count_increment: 1,
                    raw,
                    expected_crc: Some(expected_crc),
                };
                Ok(LinkStep::silent(LinkEvent::Sample(sample)))
            }
        }
    }

    fn discard_after_reject(&self) -> bool {
        self.policy == AckPolicy::ResendOnError
    }

    fn find_break(&self, pending: &[u8]) -> Option<usize> {
        find_break(pending)
    }

    fn state(&self) -> LinkState {
        self.state
    }

    fn stats(&self) -> LinkStats {
        self.stats
    }

    fn expected_index(&self) -> u8 {
        self.expected_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyserError;
    use crate::link::encoder::encode_frame;

    fn corrupt_crc(mut frame: [u8; FRAME_LEN]) -> [u8; FRAME_LEN] {
        frame[5] ^= 0xFF;
        frame
    }

    #[test]
    fn test_good_frame_acked_and_index_advanced() {
        let mut session = CheckedSession::new(AckPolicy::ResendOnError);
        let step = session.step(&encode_frame(0, 10, 12)).unwrap();

        assert_eq!(step.reply, Some(GOOD_ACK));
        match step.event {
            LinkEvent::Sample(sample) => {
                assert!(sample.valid);
                assert_eq!(sample.encoder_delta, 10);
                assert_eq!(sample.stepper_delta, 12);
                assert_eq!(sample.bad_count_increment, 0);
                assert_eq!(sample.expected_crc, None);
            }
            other => panic!("Expected sample, got: {:?}", other),
        }
        assert_eq!(session.expected_index(), 1);
        assert_eq!(session.stats().bad_messages, 0);
    }

    #[test]
    fn test_tolerant_policy_sends_no_ack() {
        let mut session = CheckedSession::new(AckPolicy::TolerateErrors);
        let step = session.step(&encode_frame(0, 1, 1)).unwrap();
        assert_eq!(step.reply, None);
        assert!(matches!(step.event, LinkEvent::Sample(_)));
    }

    #[test]
    fn test_corrupted_crc_holds_index_under_both_policies() {
        for policy in [AckPolicy::ResendOnError, AckPolicy::TolerateErrors] {
            let mut session = CheckedSession::with_expected_index(policy, 5);
            session.step(&corrupt_crc(encode_frame(5, 10, 10))).unwrap();

            assert_eq!(session.stats().bad_messages, 1, "policy {:?}", policy);
            assert_eq!(session.expected_index(), 5, "policy {:?}", policy);
        }
    }

    #[test]
    fn test_strict_policy_nacks_and_drops_bad_crc() {
        let mut session = CheckedSession::with_expected_index(AckPolicy::ResendOnError, 5);
        let step = session.step(&corrupt_crc(encode_frame(5, 10, 10))).unwrap();

        assert_eq!(step.reply, Some(BAD_ACK));
        assert!(matches!(
            step.event,
            LinkEvent::Dropped(FrameFault::ChecksumMismatch { .. })
        ));

        // Retransmission of the same index is accepted
        let step = session.step(&encode_frame(5, 10, 10)).unwrap();
        assert_eq!(step.reply, Some(GOOD_ACK));
        assert!(matches!(step.event, LinkEvent::Sample(_)));
        assert_eq!(session.expected_index(), 6);
    }

    #[test]
    fn test_strict_policy_rejects_index_ahead() {
        let mut session = CheckedSession::with_expected_index(AckPolicy::ResendOnError, 5);
        let step = session.step(&encode_frame(8, 10, 10)).unwrap();

        assert_eq!(step.reply, Some(BAD_ACK));
        assert_eq!(
            step.event,
            LinkEvent::Dropped(FrameFault::IndexMismatch { expected: 5, received: 8 })
        );
        assert_eq!(session.expected_index(), 5);
        assert_eq!(session.stats().bad_messages, 1);
    }

    #[test]
    fn test_tolerant_policy_resyncs_to_received_index() {
        let mut session = CheckedSession::with_expected_index(AckPolicy::TolerateErrors, 5);
        let step = session.step(&encode_frame(8, 10, 10)).unwrap();

        match step.event {
            LinkEvent::Sample(sample) => {
                assert!(!sample.valid);
                assert_eq!(sample.bad_count_increment, 1);
                assert_eq!(sample.index, 8);
            }
            other => panic!("Expected annotated sample, got: {:?}", other),
        }
        assert_eq!(session.expected_index(), 9);
    }

    #[test]
    fn test_tolerant_bad_crc_carries_expected_checksum() {
        let good = encode_frame(0, 3, 4);
        let mut session = CheckedSession::new(AckPolicy::TolerateErrors);
        let step = session.step(&corrupt_crc(good)).unwrap();

        match step.event {
            LinkEvent::Sample(sample) => {
                assert_eq!(sample.expected_crc, Some(good[5]));
                assert_eq!(sample.raw.as_ref(), &corrupt_crc(good)[..]);
            }
            other => panic!("Expected annotated sample, got: {:?}", other),
        }
    }

    #[test]
    fn test_index_wraps_at_128() {
        let mut session = CheckedSession::with_expected_index(AckPolicy::ResendOnError, 127);
        session.step(&encode_frame(127, 0, 0)).unwrap();
        assert_eq!(session.expected_index(), 0);
    }

    #[test]
    fn test_break_sentinel_terminates() {
        let mut session = CheckedSession::new(AckPolicy::ResendOnError);
        let step = session.step(&BREAK_SENTINEL).unwrap();

        assert_eq!(step, LinkStep::silent(LinkEvent::Terminated));
        assert!(session.is_terminated());
        assert_eq!(session.stats().frames, 0);

        // No further output once terminated
        let step = session.step(&encode_frame(0, 1, 1)).unwrap();
        assert_eq!(step, LinkStep::silent(LinkEvent::Terminated));
    }

    #[test]
    fn test_wrong_length_is_malformed() {
        let mut session = CheckedSession::new(AckPolicy::ResendOnError);
        let result = session.step(&[0x00, 0x01, 0x02]);
        assert!(matches!(result, Err(AnalyserError::MalformedFrame { .. })));
        assert_eq!(session.state(), LinkState::Running);
    }

    #[test]
    fn test_only_strict_policy_discards_after_reject() {
        assert!(CheckedSession::new(AckPolicy::ResendOnError).discard_after_reject());
        assert!(!CheckedSession::new(AckPolicy::TolerateErrors).discard_after_reject());
    }
}
