//! Property-based tests for the wire codec, schedule arithmetic and
//! endpoint parsing

use proptest::prelude::*;
use telepoint::probe::SampleSchedule;
use telepoint::transport::Endpoint;
use telepoint::transport::frame::{read_message, write_message};
use telepoint::transport::pubsub::{SUBSCRIBE, subscribe_frame};

// Property: any multipart message survives a codec round trip with its part
// boundaries intact
proptest! {
    #[test]
    fn prop_frame_codec_round_trips(
        parts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 1..6),
    ) {
        let restored = tokio_test::block_on(async {
            let mut buf = Vec::new();
            write_message(&mut buf, &parts).await.unwrap();

            let mut cursor = std::io::Cursor::new(buf);
            read_message(&mut cursor).await.unwrap()
        });

        prop_assert_eq!(restored, parts);
    }
}

// Property: concatenated messages decode back as separate messages
proptest! {
    #[test]
    fn prop_back_to_back_messages_do_not_bleed(
        first in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..4),
        second in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..4),
    ) {
        let (restored_first, restored_second) = tokio_test::block_on(async {
            let mut buf = Vec::new();
            write_message(&mut buf, &first).await.unwrap();
            write_message(&mut buf, &second).await.unwrap();

            let mut cursor = std::io::Cursor::new(buf);
            let a = read_message(&mut cursor).await.unwrap();
            let b = read_message(&mut cursor).await.unwrap();
            (a, b)
        });

        prop_assert_eq!(restored_first, first);
        prop_assert_eq!(restored_second, second);
    }
}

// Property: the next sample boundary is strictly ahead, at most one period
// away, and always a whole multiple of the period
proptest! {
    #[test]
    fn prop_sample_boundary_is_aligned_and_ahead(
        now in 0i64..4_000_000_000i64,
        period in 1u32..86_400u32,
    ) {
        let schedule = SampleSchedule::new(period);
        let boundary = schedule.next_boundary(now);

        prop_assert!(boundary > now);
        prop_assert!(boundary - now <= i64::from(period));
        prop_assert_eq!(boundary % i64::from(period), 0);
    }
}

// Property: boundaries chain with exact period spacing
proptest! {
    #[test]
    fn prop_chained_boundaries_step_by_period(
        now in 0i64..4_000_000_000i64,
        period in 1u32..3_600u32,
    ) {
        let schedule = SampleSchedule::new(period);
        let first = schedule.next_boundary(now);
        let second = schedule.next_boundary(first);

        prop_assert_eq!(second - first, i64::from(period));
    }
}

// Property: subscription frames carry the prefix verbatim after the opcode
proptest! {
    #[test]
    fn prop_subscription_frame_preserves_prefix(
        prefix in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let frame = subscribe_frame(&prefix);

        prop_assert_eq!(frame.len(), 1);
        prop_assert_eq!(frame[0][0], SUBSCRIBE);
        prop_assert_eq!(&frame[0][1..], &prefix[..]);
    }
}

// Property: the display form of a hostname endpoint parses back unchanged
proptest! {
    #[test]
    fn prop_endpoint_display_parse_round_trips(
        host in "[a-z][a-z0-9-]{0,15}",
        port in 1u16..,
    ) {
        let endpoint = Endpoint::new(host, port);
        let parsed: Endpoint = endpoint.to_string().parse().unwrap();

        prop_assert_eq!(parsed, endpoint);
    }
}
