//! Request context packing.
//!
//! Every request carries a 32-bit context that VPP copies into its replies:
//! ```text
//! ┌──────────────────┬───────────┬────────────────────┐
//! │ channel ID (15)  │ multi (1) │ sequence num (16)  │
//! └──────────────────┴───────────┴────────────────────┘
//! ```

use std::cmp::Ordering;

const CHANNEL_SHIFT: u32 = 17;
const MULTIPART_BIT: u32 = 1 << 16;

/// Largest channel ID that fits the context.
pub const MAX_CHANNEL_ID: u16 = 0x7fff;

/// Pack a channel ID, multipart flag and sequence number into a context.
///
/// Only the low 15 bits of `channel_id` are used.
pub fn pack_request_context(channel_id: u16, multipart: bool, seq_num: u16) -> u32 {
    let mut context = u32::from(channel_id & MAX_CHANNEL_ID) << CHANNEL_SHIFT;
    if multipart {
        context |= MULTIPART_BIT;
    }
    context | u32::from(seq_num)
}

/// Split a context into channel ID, multipart flag and sequence number.
pub fn unpack_request_context(context: u32) -> (u16, bool, u16) {
    let channel_id = (context >> CHANNEL_SHIFT) as u16;
    let multipart = context & MULTIPART_BIT != 0;
    let seq_num = (context & 0xffff) as u16;
    (channel_id, multipart, seq_num)
}

/// Compare two sequence numbers on the 16-bit circle.
///
/// `a` is `Less` than `b` when `b` lies at most 2^15 steps ahead of it, so
/// ordering survives wrap-around: `65535` is less than `0`.
pub fn compare_seq_numbers(a: u16, b: u16) -> Ordering {
    let distance = b.wrapping_sub(a);
    if distance == 0 {
        Ordering::Equal
    } else if distance <= 0x8000 {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_round_trips() {
        let cases = [
            (0u16, false, 0u16),
            (1, false, 1),
            (1, true, 0xffff),
            (MAX_CHANNEL_ID, true, 0),
            (MAX_CHANNEL_ID, false, 0xffff),
            (0x1234, true, 0xabcd),
        ];
        for (channel_id, multipart, seq_num) in cases {
            let context = pack_request_context(channel_id, multipart, seq_num);
            assert_eq!(
                unpack_request_context(context),
                (channel_id, multipart, seq_num),
                "context {context:#010x}"
            );
        }
    }

    #[test]
    fn context_round_trips_exhaustively_per_channel_bit() {
        for shift in 0..15 {
            let channel_id = 1u16 << shift;
            for seq_num in [0u16, 1, 0x7fff, 0x8000, 0xfffe, 0xffff] {
                for multipart in [false, true] {
                    let context = pack_request_context(channel_id, multipart, seq_num);
                    assert_eq!(
                        unpack_request_context(context),
                        (channel_id, multipart, seq_num)
                    );
                }
            }
        }
    }

    #[test]
    fn context_layout() {
        assert_eq!(pack_request_context(1, false, 0), 0x0002_0000);
        assert_eq!(pack_request_context(0, true, 0), 0x0001_0000);
        assert_eq!(pack_request_context(0, false, 7), 7);
        assert_eq!(pack_request_context(MAX_CHANNEL_ID, true, 0xffff), u32::MAX);
    }

    #[test]
    fn channel_id_is_truncated_to_fifteen_bits() {
        let context = pack_request_context(0x8001, false, 5);
        assert_eq!(unpack_request_context(context), (1, false, 5));
    }

    #[test]
    fn seq_comparison() {
        assert_eq!(compare_seq_numbers(5, 5), Ordering::Equal);
        assert_eq!(compare_seq_numbers(1, 2), Ordering::Less);
        assert_eq!(compare_seq_numbers(2, 1), Ordering::Greater);
        assert_eq!(compare_seq_numbers(65535, 0), Ordering::Less);
        assert_eq!(compare_seq_numbers(0, 65535), Ordering::Greater);
        assert_eq!(compare_seq_numbers(0, 0x8000), Ordering::Less);
        assert_eq!(compare_seq_numbers(0, 0x8001), Ordering::Greater);
    }

    #[test]
    fn seq_comparison_is_antisymmetric_off_the_midpoint() {
        for a in (0u16..=u16::MAX).step_by(251) {
            for offset in [1u16, 2, 100, 0x7fff] {
                let b = a.wrapping_add(offset);
                assert_eq!(compare_seq_numbers(a, b), Ordering::Less);
                assert_eq!(compare_seq_numbers(b, a), Ordering::Greater);
            }
        }
    }
}
