// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use rpc_runtime::codec::{self, Codec, CodecKind, Header};
use rpc_runtime::stream::pipe;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Args {
    num1: i64,
    num2: i64,
}

fn round_trip(kind: CodecKind) {
    let (a, b) = pipe::pipe().unwrap();
    let writer = Codec::new(kind, a.clone(), a);
    let reader = Codec::new(kind, b.clone(), b);

    let header = Header {
        service_method: "Foo.Sum".to_string(),
        seq: 42,
        err: String::new(),
    };
    let args = Args { num1: 1, num2: 2 };
    let body_bytes = codec::encode_body(&args).unwrap();

    writer.write(&header, &body_bytes).unwrap();

    let got_header = reader.read_header().unwrap();
    assert_eq!(got_header, header);

    let got_body_bytes = reader.read_body_bytes().unwrap();
    let got_args: Args = codec::decode_body(&got_body_bytes).unwrap();
    assert_eq!(got_args, args);
}

#[test]
fn gob_header_and_body_round_trip() {
    round_trip(CodecKind::Gob);
}

#[test]
fn json_header_and_body_round_trip() {
    round_trip(CodecKind::Json);
}

#[test]
fn unknown_frame_over_max_length_is_rejected() {
    let (a, b) = pipe::pipe().unwrap();
    let mut a = a;
    // hand-craft an oversized length prefix ahead of a short, bogus payload.
    use std::io::Write;
    a.write_all(&(100u32 * 1024 * 1024).to_be_bytes()).unwrap();
    a.write_all(b"x").unwrap();

    let reader = Codec::new(CodecKind::Gob, b.clone(), b);
    let err = reader.read_header().unwrap_err();
    assert!(err.to_string().contains("exceeds maximum"), "unexpected error: {err}");
}

#[test]
fn unknown_codec_tag_is_rejected_by_the_registry() {
    assert!(CodecKind::from_tag("application/xyz").is_none());
    assert_eq!(CodecKind::from_tag("application/gob"), Some(CodecKind::Gob));
    assert_eq!(CodecKind::from_tag("application/json"), Some(CodecKind::Json));
}
