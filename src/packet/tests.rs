use super::*;
use proptest::prelude::*;

fn frames(parts: &[&[u8]]) -> Frames {
    parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
}

#[test]
fn test_data_packet_is_valid() {
    let msg = frames(&[DATA, b"/tmp"]);
    assert!(is_valid_packet(&msg));
    assert!(is_data_packet(&msg));
}

#[test]
fn test_rejects_empty_message() {
    assert!(!is_valid_packet(&[]));
    assert!(!is_data_packet(&[]));
}

#[test]
fn test_rejects_single_frame() {
    assert!(!is_valid_packet(&frames(&[DATA])));
    assert!(!is_valid_packet(&frames(&[b"hello"])));
}

#[test]
fn test_rejects_unknown_marker() {
    assert!(!is_valid_packet(&frames(&[b"packet", b"payload"])));
    assert!(!is_valid_packet(&frames(&[b"", b"payload"])));
}

#[test]
fn test_rejects_empty_data_payload() {
    assert!(!is_valid_packet(&frames(&[DATA, b""])));
}

#[test]
fn test_rejects_odd_frame_count() {
    assert!(!is_valid_packet(&frames(&[DATA, b"a", DATA])));
}

#[test]
fn test_streamed_brackets_are_valid_but_not_data() {
    let open = frames(&[OPEN_BRACKET, b"batch"]);
    let close = frames(&[CLOSE_BRACKET, b"batch"]);
    assert!(is_valid_packet(&open));
    assert!(is_valid_packet(&close));
    assert!(!is_data_packet(&open));
    assert!(!is_data_packet(&close));
}

#[test]
fn test_bracket_label_may_be_empty() {
    assert!(is_valid_packet(&frames(&[OPEN_BRACKET, b""])));
}

#[test]
fn test_grouped_message_nesting() {
    let ok = frames(&[OPEN_BRACKET, b"g", DATA, b"a", DATA, b"b", CLOSE_BRACKET, b"g"]);
    assert!(is_valid_packet(&ok));
    assert!(!is_data_packet(&ok));

    let unclosed = frames(&[OPEN_BRACKET, b"g", DATA, b"a"]);
    assert!(!is_valid_packet(&unclosed));

    let unopened = frames(&[DATA, b"a", CLOSE_BRACKET, b"g"]);
    assert!(!is_valid_packet(&unopened));

    let mismatched = frames(&[OPEN_BRACKET, b"g", CLOSE_BRACKET, b"h"]);
    assert!(!is_valid_packet(&mismatched));
}

#[test]
fn test_multi_data_message_is_data() {
    let msg = frames(&[DATA, b"a", DATA, b"b"]);
    assert!(is_data_packet(&msg));
}

#[test]
fn test_packet_frames_roundtrip() {
    let packet = Packet::data("1s");
    let restored = Packet::from_frames(&packet.to_frames()).unwrap();
    assert_eq!(restored, packet);
    assert!(restored.is_data());
    assert_eq!(restored.payload_str(), "1s");
}

#[test]
fn test_packet_from_invalid_frames() {
    assert!(Packet::from_frames(&frames(&[b"x", b"y"])).is_none());
    assert!(Packet::from_frames(&frames(&[DATA, b"a", DATA, b"b"])).is_none());
}

#[test]
fn test_tracker_follows_streamed_groups() {
    let mut tracker = BracketTracker::new();
    assert_eq!(tracker.observe(&Packet::open("outer").into_frames()), Ok(1));
    assert_eq!(tracker.observe(&Packet::open("inner").into_frames()), Ok(2));
    assert_eq!(tracker.observe(&Packet::data("x").into_frames()), Ok(2));
    assert_eq!(tracker.observe(&Packet::close("inner").into_frames()), Ok(1));
    assert_eq!(tracker.observe(&Packet::close("outer").into_frames()), Ok(0));
}

#[test]
fn test_tracker_rejects_unopened_close() {
    let mut tracker = BracketTracker::new();
    assert_eq!(
        tracker.observe(&Packet::close("g").into_frames()),
        Err(BracketError::Unopened("g".to_string()))
    );
    assert_eq!(tracker.depth(), 0);
}

#[test]
fn test_tracker_mismatch_leaves_state() {
    let mut tracker = BracketTracker::new();
    tracker.observe(&Packet::open("a").into_frames()).unwrap();
    let err = tracker.observe(&Packet::close("b").into_frames()).unwrap_err();
    assert_eq!(
        err,
        BracketError::Mismatched {
            expected: "a".to_string(),
            found: "b".to_string()
        }
    );
    assert_eq!(tracker.depth(), 1);

    tracker.reset();
    assert_eq!(tracker.depth(), 0);
}

#[test]
fn test_tracker_rejects_malformed() {
    let mut tracker = BracketTracker::new();
    assert_eq!(
        tracker.observe(&frames(&[DATA])),
        Err(BracketError::Malformed)
    );
}

fn unknown_marker() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..8)
        .prop_filter("must not be a known marker", |m| {
            PacketKind::from_marker(m).is_none()
        })
}

proptest! {
    #[test]
    fn prop_short_messages_are_invalid(frame in proptest::collection::vec(any::<u8>(), 0..32)) {
        prop_assert!(!is_valid_packet(&[]));
        prop_assert!(!is_valid_packet(&[Bytes::from(frame)]));
    }

    #[test]
    fn prop_unknown_marker_is_invalid(
        marker in unknown_marker(),
        payload in proptest::collection::vec(any::<u8>(), 1..64),
    ) {
        prop_assert!(!is_valid_packet(&[Bytes::from(marker), Bytes::from(payload)]));
    }

    #[test]
    fn prop_two_frame_data_is_valid(payload in proptest::collection::vec(any::<u8>(), 1..256)) {
        let msg = vec![Bytes::from_static(DATA), Bytes::from(payload)];
        prop_assert!(is_valid_packet(&msg));
        prop_assert!(is_data_packet(&msg));
    }
}
