//! Property-based tests for the Socket.IO frame codec.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text never makes `decode_frame` panic.
//! 2. Event frames survive encode → decode with any name, args and ack id.
//! 3. A `/namespace,` prefix does not change how an event decodes.
//! 4. Board events rebuilt from their frames keep the task id.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use serde_json::Value;
use taskboard_proto::codec::{Frame, decode_frame, encode_frame};
use taskboard_proto::event::BoardEvent;
use taskboard_proto::task::TaskId;

fn arb_arg() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<String>().prop_map(Value::String),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

proptest! {
    #[test]
    fn decode_never_panics(text in ".*") {
        let _ = decode_frame(&text);
    }

    #[test]
    fn decode_never_panics_on_packet_like_text(prefix in "[0-6]{1,2}", rest in ".{0,64}") {
        let _ = decode_frame(&format!("{prefix}{rest}"));
    }

    #[test]
    fn event_frames_round_trip(
        name in ".{1,32}",
        args in prop::collection::vec(arb_arg(), 0..5),
        ack_id in prop::option::of(any::<u32>()),
    ) {
        let frame = Frame::Event {
            name,
            args,
            ack_id: ack_id.map(u64::from),
        };
        let text = encode_frame(&frame).unwrap();
        prop_assert_eq!(decode_frame(&text).unwrap(), frame);
    }

    #[test]
    fn namespace_prefix_is_ignored(name in "[a-zA-Z]{1,16}", ns in "/[a-z]{1,8}") {
        let plain = format!(r#"42["{name}",1]"#);
        let namespaced = format!(r#"42{ns},["{name}",1]"#);
        prop_assert_eq!(decode_frame(&plain).unwrap(), decode_frame(&namespaced).unwrap());
    }

    #[test]
    fn deleted_event_keeps_task_id(id in ".{1,40}") {
        let event = BoardEvent::Deleted(TaskId::new(id));
        let Frame::Event { name, args, .. } = event.to_frame().unwrap() else {
            return Err(TestCaseError::fail("not an event frame"));
        };
        let decoded = BoardEvent::from_socket_event(&name, &args).unwrap();
        prop_assert_eq!(decoded, Some(event));
    }
}
