// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol unit tests

use super::*;
use ms_core::PeerFilter;

#[test]
fn requests_are_tagged_json() {
    let request = Request::Lock {
        address: Address::new("10.0.0.1"),
        holder: "runner-a".to_string(),
    };

    let encoded = encode(&request).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&encoded).unwrap();

    assert_eq!(json["type"], "Lock");
    assert_eq!(json["address"], "10.0.0.1");
    assert_eq!(decode::<Request>(&encoded).unwrap(), request);
}

#[test]
fn list_filter_survives_the_wire() {
    let request = Request::List {
        filter: ResourceFilter::active()
            .with_peer(PeerFilter::Grouped)
            .with_addresses(vec![Address::new("a")]),
    };

    let decoded: Request = decode(&encode(&request).unwrap()).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn error_kind_is_snake_case() {
    let response = Response::from_store_error(&StoreError::NotLocked(Address::new("a")));

    let json: serde_json::Value = serde_json::from_slice(&encode(&response).unwrap()).unwrap();

    assert_eq!(json["kind"], "not_locked");
}

#[test]
fn store_errors_are_rebuilt_from_responses() {
    let a = Address::new("a");
    let cases = [
        StoreError::NotLocked(a.clone()),
        StoreError::UnknownResource(a.clone()),
    ];
    for original in cases {
        let Response::Error { kind, message } = Response::from_store_error(&original) else {
            panic!("expected error response");
        };
        assert_eq!(store_error(kind, message, Some(&a)), original);
    }

    let unreachable = StoreError::Unreachable {
        operation: "unlock".to_string(),
        attempts: 10,
        message: "database is locked".to_string(),
    };
    let Response::Error { kind, message } = Response::from_store_error(&unreachable) else {
        panic!("expected error response");
    };
    assert!(matches!(
        store_error(kind, message, Some(&a)),
        StoreError::Unreachable { .. }
    ));

    let backend = StoreError::Backend("disk full".to_string());
    let Response::Error { kind, message } = Response::from_store_error(&backend) else {
        panic!("expected error response");
    };
    assert!(matches!(store_error(kind, message, None), StoreError::Backend(_)));
}

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";

    let mut buffer = Vec::new();
    write_message(&mut buffer, original).await.unwrap();

    // write_message adds 4-byte length prefix
    assert_eq!(buffer.len(), 4 + original.len());
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor).await.unwrap();

    assert_eq!(read_back, original);
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let mut frame = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(b"{}");
    let mut cursor = std::io::Cursor::new(frame);

    let err = read_message(&mut cursor).await.unwrap_err();

    assert!(matches!(err, ProtocolError::TooLarge(_)));
}

#[tokio::test]
async fn empty_stream_reads_as_closed() {
    let mut cursor = std::io::Cursor::new(Vec::new());

    let err = read_message(&mut cursor).await.unwrap_err();

    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn request_read_times_out() {
    let (_client, mut server) = tokio::io::duplex(64);

    let err = read_request(&mut server, Duration::from_millis(20))
        .await
        .unwrap_err();

    assert!(matches!(err, ProtocolError::Timeout));
}
