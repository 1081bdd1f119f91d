//! OP_MSG tests against captured wire traffic

use bytes::Bytes;
use mongo_wire::{
    doc, Binary, MsgBody, MsgHeader, MsgSection, ObjectId, OpCode, OpMsg, Value, WireError,
    HEADER_LEN,
};

/// Splits a full frame into its decoded header and body bytes
fn split(frame: &[u8]) -> (MsgHeader, Bytes) {
    let header = MsgHeader::decode(frame).unwrap();
    assert_eq!(header.message_length as usize, frame.len());
    (header, Bytes::copy_from_slice(&frame[HEADER_LEN..]))
}

/// Re-assembles a frame from a header and a decoded message
fn join(header: &MsgHeader, msg: &OpMsg) -> Vec<u8> {
    let mut frame = header.encode().to_vec();
    frame.extend_from_slice(&msg.encode().unwrap());
    frame
}

// An insert of {"v": NaN} with a non-default NaN payload; the payload must
// survive decoding and re-encoding untouched.
const NAN_INSERT: &[u8] = &[
    0x79, 0x00, 0x00, 0x00, // MessageLength
    0x11, 0x00, 0x00, 0x00, // RequestID
    0x00, 0x00, 0x00, 0x00, // ResponseTo
    0xdd, 0x07, 0x00, 0x00, // OpCode
    0x00, 0x00, 0x00, 0x00, // FlagBits
    0x00, // section kind
    0x64, 0x00, 0x00, 0x00, // document size
    0x02, 0x69, 0x6e, 0x73, 0x65, 0x72, 0x74, 0x00, // string "insert"
    0x07, 0x00, 0x00, 0x00, // "values" length
    0x76, 0x61, 0x6c, 0x75, 0x65, 0x73, 0x00, // "values"
    0x04, 0x64, 0x6f, 0x63, 0x75, 0x6d, 0x65, 0x6e, 0x74, 0x73, 0x00, // array "documents"
    0x29, 0x00, 0x00, 0x00, // array size
    0x03, 0x30, 0x00, // element 0 (document)
    0x21, 0x00, 0x00, 0x00, // element 0 size
    0x01, 0x76, 0x00, // double "v"
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf8, 0x7f, // NaN
    0x07, 0x5f, 0x69, 0x64, 0x00, // ObjectID "_id"
    0x63, 0x77, 0xf2, 0x13, 0x75, 0x7c, 0x0b, 0xab, 0xde, 0xbc, 0x2f, 0x6a, // ObjectID value
    0x00, // end of element 0
    0x00, // end of array
    0x08, 0x6f, 0x72, 0x64, 0x65, 0x72, 0x65, 0x64, 0x00, 0x01, // "ordered" true
    0x02, 0x24, 0x64, 0x62, 0x00, // "$db"
    0x05, 0x00, 0x00, 0x00, // "test" length
    0x74, 0x65, 0x73, 0x74, 0x00, // "test"
    0x00, // end of document
];

// An insert of {"v": -0.0} split over a body section and a "documents"
// sequence section.
const NEGATIVE_ZERO_INSERT: &[u8] = &[
    0x8b, 0x00, 0x00, 0x00, // MessageLength
    0x0c, 0x00, 0x00, 0x00, // RequestID
    0x00, 0x00, 0x00, 0x00, // ResponseTo
    0xdd, 0x07, 0x00, 0x00, // OpCode
    0x00, 0x00, 0x00, 0x00, // FlagBits
    0x00, // section kind
    0x46, 0x00, 0x00, 0x00, // document size
    0x02, 0x69, 0x6e, 0x73, 0x65, 0x72, 0x74, 0x00, // string "insert"
    0x11, 0x00, 0x00, 0x00, // "TestInsertSimple" length
    0x54, 0x65, 0x73, 0x74, 0x49, 0x6e, 0x73, 0x65, 0x72, 0x74, 0x53, 0x69, 0x6d, 0x70, 0x6c,
    0x65, 0x00, // "TestInsertSimple"
    0x08, 0x6f, 0x72, 0x64, 0x65, 0x72, 0x65, 0x64, 0x00, 0x01, // "ordered" true
    0x02, 0x24, 0x64, 0x62, 0x00, // "$db"
    0x11, 0x00, 0x00, 0x00, // "testinsertsimple" length
    0x74, 0x65, 0x73, 0x74, 0x69, 0x6e, 0x73, 0x65, 0x72, 0x74, 0x73, 0x69, 0x6d, 0x70, 0x6c,
    0x65, 0x00, // "testinsertsimple"
    0x00, // end of document
    0x01, // section kind
    0x2f, 0x00, 0x00, 0x00, // section size
    0x64, 0x6f, 0x63, 0x75, 0x6d, 0x65, 0x6e, 0x74, 0x73, 0x00, // identifier "documents"
    0x21, 0x00, 0x00, 0x00, // document size
    0x07, 0x5f, 0x69, 0x64, 0x00, // ObjectID "_id"
    0x63, 0x7c, 0xfa, 0xd8, 0x8d, 0xc3, 0xce, 0xcd, 0xe3, 0x8e, 0x1e, 0x6b, // ObjectID value
    0x01, 0x76, 0x00, // double "v"
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, // -0.0
    0x00, // end of document
];

// A checksummed insert whose "documents" sequence section precedes the body
// section; section order must survive re-encoding.
const MULTI_SECTION_INSERT: &[u8] = &[
    0x76, 0x00, 0x00, 0x00, // MessageLength
    0x0f, 0x00, 0x00, 0x00, // RequestID
    0x00, 0x00, 0x00, 0x00, // ResponseTo
    0xdd, 0x07, 0x00, 0x00, // OpCode
    0x01, 0x00, 0x00, 0x00, // FlagBits
    0x01, // section kind
    0x2f, 0x00, 0x00, 0x00, // section size
    0x64, 0x6f, 0x63, 0x75, 0x6d, 0x65, 0x6e, 0x74, 0x73, 0x00, // identifier "documents"
    0x21, 0x00, 0x00, 0x00, // document size
    0x07, 0x5f, 0x69, 0x64, 0x00, // ObjectID "_id"
    0x63, 0x8c, 0xec, 0x46, 0xaa, 0x77, 0x8b, 0xf3, 0x70, 0x10, 0x54, 0x29, // ObjectID value
    0x01, 0x61, 0x00, // double "a"
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x40, // 3.0
    0x00, // end of document
    0x00, // section kind
    0x2d, 0x00, 0x00, 0x00, // document size
    0x02, 0x69, 0x6e, 0x73, 0x65, 0x72, 0x74, 0x00, // string "insert"
    0x04, 0x00, 0x00, 0x00, // "foo" length
    0x66, 0x6f, 0x6f, 0x00, // "foo"
    0x08, 0x6f, 0x72, 0x64, 0x65, 0x72, 0x65, 0x64, 0x00, 0x01, // "ordered" true
    0x02, 0x24, 0x64, 0x62, 0x00, // "$db"
    0x05, 0x00, 0x00, 0x00, // "test" length
    0x74, 0x65, 0x73, 0x74, 0x00, // "test"
    0x00, // end of document
    0xe2, 0xb7, 0x90, 0x67, // checksum
];

// The same message with "foo" corrupted to "fooo" (and lengths adjusted) but
// the stale checksum kept: framing decodes, checksum verification fails.
const STALE_CHECKSUM_INSERT: &[u8] = &[
    0x77, 0x00, 0x00, 0x00, // MessageLength
    0x0f, 0x00, 0x00, 0x00, // RequestID
    0x00, 0x00, 0x00, 0x00, // ResponseTo
    0xdd, 0x07, 0x00, 0x00, // OpCode
    0x01, 0x00, 0x00, 0x00, // FlagBits
    0x01, // section kind
    0x2f, 0x00, 0x00, 0x00, // section size
    0x64, 0x6f, 0x63, 0x75, 0x6d, 0x65, 0x6e, 0x74, 0x73, 0x00, // identifier "documents"
    0x21, 0x00, 0x00, 0x00, // document size
    0x07, 0x5f, 0x69, 0x64, 0x00, // ObjectID "_id"
    0x63, 0x8c, 0xec, 0x46, 0xaa, 0x77, 0x8b, 0xf3, 0x70, 0x10, 0x54, 0x29, // ObjectID value
    0x01, 0x61, 0x00, // double "a"
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x40, // 3.0
    0x00, // end of document
    0x00, // section kind
    0x2d, 0x00, 0x00, 0x00, // document size
    0x02, 0x69, 0x6e, 0x73, 0x65, 0x72, 0x74, 0x00, // string "insert"
    0x04, 0x00, 0x00, 0x00, // "foo" length
    0x66, 0x6f, 0x6f, 0x6f, 0x00, // "fooo"
    0x08, 0x6f, 0x72, 0x64, 0x65, 0x72, 0x65, 0x64, 0x00, 0x01, // "ordered" true
    0x02, 0x24, 0x64, 0x62, 0x00, // "$db"
    0x05, 0x00, 0x00, 0x00, // "test" length
    0x74, 0x65, 0x73, 0x74, 0x00, // "test"
    0x00, // end of document
    0xe2, 0xb7, 0x90, 0x67, // stale checksum
];

#[test]
fn test_build_info_handshake_encoding() {
    let body = doc! {
        "buildInfo" => 1_i32,
        "lsid" => doc! {
            "id" => Binary::uuid(vec![
                0xa3, 0x19, 0xf2, 0xb4, 0xa1, 0x75, 0x40, 0xc7,
                0xb8, 0xe7, 0xa3, 0xa3, 0x2e, 0xc2, 0x56, 0xbe,
            ]),
        },
        "$db" => "admin",
    };

    let msg = OpMsg::new(&body).unwrap();
    let encoded = msg.encode().unwrap();

    let header = MsgHeader {
        message_length: (encoded.len() + HEADER_LEN) as i32,
        request_id: 3,
        response_to: 0,
        op_code: OpCode::Msg,
    };

    let mut frame = header.encode().to_vec();
    frame.extend_from_slice(&encoded);

    assert_eq!(frame.len(), 92);
    assert_eq!(
        &frame[..HEADER_LEN],
        &[
            0x5c, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xdd, 0x07,
            0x00, 0x00,
        ]
    );

    // the frame parses back into the same message
    let (decoded_header, body_bytes) = split(&frame);
    assert_eq!(decoded_header, header);
    assert_eq!(OpMsg::decode(body_bytes).unwrap(), msg);
}

#[test]
fn test_nan_insert_decoding() {
    let (header, body) = split(NAN_INSERT);
    assert_eq!(header.message_length, 121);
    assert_eq!(header.request_id, 17);
    assert_eq!(header.op_code, OpCode::Msg);

    let msg = OpMsg::decode(body).unwrap();
    assert!(!msg.flags().checksum_present());

    let doc = msg.document_deep().unwrap();
    assert_eq!(doc.get("insert"), Some(&Value::String("values".to_owned())));

    let documents = doc.get("documents").unwrap().as_array().unwrap();
    assert_eq!(documents.len(), 1);

    let inserted = documents.get(0).unwrap().as_document().unwrap();
    let Some(Value::Double(v)) = inserted.get("v") else {
        panic!("expected a double, got {:?}", inserted.get("v"));
    };
    assert!(v.is_nan());
    assert_eq!(v.to_bits(), 0x7ff8_0000_0000_0001);
    assert_eq!(
        inserted.get("_id"),
        Some(&Value::ObjectId(ObjectId([
            0x63, 0x77, 0xf2, 0x13, 0x75, 0x7c, 0x0b, 0xab, 0xde, 0xbc, 0x2f, 0x6a,
        ])))
    );

    assert_eq!(join(&header, &msg), NAN_INSERT);
}

#[test]
fn test_nan_insert_shallow_deep_equivalence() {
    let (_, body) = split(NAN_INSERT);
    let msg = OpMsg::decode(body).unwrap();

    let shallow = msg.document().decode().unwrap();
    let deep = msg.document().decode_deep().unwrap();

    let Some(Value::RawArray(raw)) = shallow.get("documents") else {
        panic!("shallow decode should keep the array raw");
    };
    assert_eq!(
        deep.get("documents"),
        Some(&Value::Array(raw.decode_deep().unwrap()))
    );
}

#[test]
fn test_negative_zero_insert_decoding() {
    let (header, body) = split(NEGATIVE_ZERO_INSERT);
    assert_eq!(header.message_length, 139);
    assert_eq!(header.request_id, 12);

    let msg = OpMsg::decode(body).unwrap();
    assert_eq!(msg.sections().len(), 2);
    assert_eq!(msg.command().unwrap(), "insert");

    let MsgSection::DocumentSequence {
        identifier,
        documents,
    } = &msg.sections()[1]
    else {
        panic!("expected a document sequence section");
    };
    assert_eq!(identifier, "documents");
    assert_eq!(documents.len(), 1);

    let inserted = documents[0].decode().unwrap();
    let Some(Value::Double(v)) = inserted.get("v") else {
        panic!("expected a double");
    };
    assert_eq!(v.to_bits(), 0x8000_0000_0000_0000);

    assert_eq!(join(&header, &msg), NEGATIVE_ZERO_INSERT);
}

#[test]
fn test_multi_section_checksum() {
    let (header, body_bytes) = split(MULTI_SECTION_INSERT);
    assert_eq!(header.message_length, 118);

    let msg = OpMsg::decode(body_bytes.clone()).unwrap();
    assert!(msg.flags().checksum_present());
    assert_eq!(msg.checksum(), Some(0x6790_b7e2));

    // the sequence section comes first on the wire and must stay first
    assert_eq!(msg.sections()[0].kind(), 1);
    assert_eq!(msg.sections()[1].kind(), 0);
    assert_eq!(msg.command().unwrap(), "insert");

    OpMsg::verify_checksum(&header, &body_bytes).unwrap();

    assert_eq!(join(&header, &msg), MULTI_SECTION_INSERT);
}

#[test]
fn test_stale_checksum_detected() {
    // the frame itself is well-formed: header decodes, the announced length
    // matches, and the checksum verifies BEFORE section parsing, so the
    // corruption surfaces as a checksum mismatch rather than a framing error
    let (header, body_bytes) = split(STALE_CHECKSUM_INSERT);

    let err = OpMsg::verify_checksum(&header, &body_bytes).unwrap_err();
    let WireError::ChecksumMismatch { expected, actual } = err else {
        panic!("expected a checksum mismatch, got {err:?}");
    };
    assert_eq!(expected, 0x6790_b7e2);
    assert_ne!(actual, expected);
}

#[test]
fn test_every_truncated_prefix_fails() {
    // A reader sees the announced message_length first; a prefix either
    // fails the header decode, comes up short against the announced length,
    // or fails the body decode. No prefix may pass for a complete message.
    for frame in [NAN_INSERT, NEGATIVE_ZERO_INSERT, MULTI_SECTION_INSERT] {
        for n in 0..frame.len() - 1 {
            let prefix = &frame[..n];

            let outcome: Result<(), WireError> = if prefix.len() < HEADER_LEN {
                Err(WireError::UnexpectedEof)
            } else {
                let header = MsgHeader::decode(prefix).unwrap();
                if header.message_length as usize > prefix.len() {
                    // the transport reports a short read here
                    Err(WireError::UnexpectedEof)
                } else {
                    OpMsg::decode(Bytes::copy_from_slice(&prefix[HEADER_LEN..])).map(|_| ())
                }
            };

            assert!(outcome.is_err(), "prefix of {n} bytes decoded successfully");
        }
    }
}

#[test]
fn test_msg_body_dispatch() {
    let (header, body) = split(NAN_INSERT);
    let body = MsgBody::decode(header.op_code, body).unwrap();

    assert_eq!(body.op_code(), OpCode::Msg);
    assert_eq!(body.command().as_deref(), Some("insert"));
    assert_eq!(
        [header.encode().to_vec(), body.encode().unwrap()].concat(),
        NAN_INSERT
    );
}
