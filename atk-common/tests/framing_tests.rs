//! Wire-framing integration tests: one JSON object per line, duck-typed by
//! key presence, ids echoed verbatim.

use atk_common::error::Error;
use atk_common::protocol::{parse_message, Event, EventType, Message, Request, Response};
use serde_json::{json, Map};

#[test]
fn test_mixed_line_stream() {
    let request = Request::new("a1", "status", Map::new());
    let response = Response::success("a1", json!({"state": "playing"}));
    let event = Event::new(EventType::PositionUpdate, json!({"position": 12.5}));

    let stream = format!(
        "{}\n{}\n{}\n",
        request.serialize(),
        response.serialize(),
        event.serialize()
    );

    let messages: Vec<Message> = stream.lines().map(|l| parse_message(l).unwrap()).collect();
    assert!(matches!(&messages[0], Message::Request(r) if r.id == "a1"));
    assert!(matches!(&messages[1], Message::Response(r) if r.ok));
    assert!(matches!(&messages[2], Message::Event(e) if e.event == EventType::PositionUpdate));
}

#[test]
fn test_failure_response_carries_taxonomy() {
    let error = Error::UnsupportedFormat("/m/a.xyz".to_string());
    let response = Response::failure("b2", error.to_info());
    let line = response.serialize();

    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "INVALID_FORMAT");
    assert_eq!(value["error"]["category"], "playback");
    assert!(value["error"]["message"]
        .as_str()
        .unwrap()
        .contains("/m/a.xyz"));
}

#[test]
fn test_single_line_per_message() {
    let event = Event::new(
        EventType::Error,
        json!({"message": "multi\nline\ntext", "track": "/m/a.mp3"}),
    );
    let line = event.serialize();
    // JSON escapes embedded newlines; framing stays line-oriented
    assert!(!line.contains('\n'));
}

#[test]
fn test_client_chosen_ids_echo_verbatim() {
    for id in ["1", "xyzzy", "0000-1111", "日本語"] {
        let response = Response::success(id, json!({}));
        match parse_message(&response.serialize()).unwrap() {
            Message::Response(parsed) => assert_eq!(parsed.id, id),
            other => panic!("expected response, got {:?}", other),
        }
    }
}
