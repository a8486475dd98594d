//! Property-Based Tests for the host protocol
//!
//! # Test Strategies
//!
//! - **Framing**: chunk boundaries are invisible; the lines produced for any
//!   split of the input equal a plain split of the concatenated bytes
//! - **Identifiers**: every request id is echoed back unchanged
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib mcp::proptests
//! ```

use proptest::prelude::*;
use serde_json::{json, Value};

use crate::mcp::frame::{FrameLimits, FrameReader};
use crate::mcp::protocol::{IncomingMessage, McpResponse, RequestId};

// Helper: bytes biased towards newlines, whitespace and multi-byte UTF-8
fn arb_stream() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![
            4 => Just(b'\n'),
            2 => Just(b' '),
            2 => Just(b'\r'),
            2 => Just(0xC3u8),
            2 => Just(0xA9u8),
            20 => any::<u8>(),
        ],
        0..512,
    )
}

// Helper: split points for a stream of length `len`
fn chunked(input: &[u8], mut cuts: Vec<usize>) -> Vec<&[u8]> {
    cuts.iter_mut().for_each(|cut| *cut %= input.len() + 1);
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(&input[start..cut]);
        start = cut;
    }
    chunks.push(&input[start..]);
    chunks
}

// Reference: split on '\n', decode, trim, drop blanks
fn reference_lines(input: &[u8]) -> Vec<String> {
    input
        .split(|&b| b == b'\n')
        .map(|segment| String::from_utf8_lossy(segment).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn read_all(chunks: &[&[u8]]) -> Vec<String> {
    let mut frames = FrameReader::new(FrameLimits {
        max_buffer_bytes: 1 << 20,
        max_message_bytes: 1 << 20,
    });
    let mut lines = Vec::new();
    for chunk in chunks {
        lines.extend(frames.push(chunk).unwrap());
    }
    lines.extend(frames.finish());
    lines
}

fn arb_request_id() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<i64>().prop_map(|n| json!(n)),
        any::<u64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9_-]{0,24}".prop_map(Value::String),
    ]
}

proptest! {
    #[test]
    fn prop_chunking_is_transparent(
        input in arb_stream(),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let chunks = chunked(&input, cuts);
        prop_assert_eq!(read_all(&chunks), reference_lines(&input));
    }

    #[test]
    fn prop_one_byte_at_a_time_matches_single_chunk(input in arb_stream()) {
        let single = read_all(&[input.as_slice()]);
        let bytes: Vec<&[u8]> = input.chunks(1).collect();
        prop_assert_eq!(read_all(&bytes), single);
    }

    #[test]
    fn prop_no_line_before_newline(body in "[a-z{}\":,0-9 ]{1,64}") {
        let mut frames = FrameReader::new(FrameLimits::default());
        prop_assert!(frames.push(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn prop_request_id_is_echoed(id in arb_request_id()) {
        let line = json!({"jsonrpc": "2.0", "id": id.clone(), "method": "tools/list"}).to_string();
        let message = IncomingMessage::parse(&line).unwrap();
        let parsed_id = message.id.unwrap();

        let frame = McpResponse::ok(parsed_id, json!({})).to_frame().unwrap();
        let echoed: Value = serde_json::from_str(&frame).unwrap();
        prop_assert_eq!(&echoed["id"], &id);
    }

    #[test]
    fn prop_parse_never_panics(line in ".{0,256}") {
        let _ = IncomingMessage::parse(&line);
    }
}

#[test]
fn test_null_id_distinct_from_absent() {
    let with_null = IncomingMessage::parse(r#"{"jsonrpc":"2.0","id":null,"method":"x"}"#).unwrap();
    let without = IncomingMessage::parse(r#"{"jsonrpc":"2.0","method":"x"}"#).unwrap();

    assert_eq!(with_null.id, Some(RequestId::Null));
    assert_eq!(without.id, None);
}
