use bytes::{Buf, BufMut};
use tally_core::{
    MessageKind, Operation, RequestId, CALLBACK_OPERATION_CODE, CALLBACK_REQUEST_ID,
};

use crate::body::{BalanceUpdate, MessageReply, WireBody};
use crate::error::CodecError;

/// Fixed envelope header: kind (1) + request id (4) + operation code (1).
pub const PACKET_HEADER_LEN: usize = 1 + 4 + 1;

/// Envelope for every datagram on the wire.
///
/// The body length is implicit: everything after the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: MessageKind,
    pub request_id: RequestId,
    /// Raw operation code; validated by the dispatcher, not the codec.
    pub operation: u8,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn request(request_id: RequestId, operation: Operation, body: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Request,
            request_id,
            operation: operation.code(),
            body,
        }
    }

    /// Success reply echoing the request's id and operation code.
    pub fn reply_to(request: &Packet, body: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Reply,
            request_id: request.request_id,
            operation: request.operation,
            body,
        }
    }

    /// Error reply echoing the request's id and operation code.
    pub fn error_to(request: &Packet, message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            request_id: request.request_id,
            operation: request.operation,
            body: MessageReply::new(message).to_bytes(),
        }
    }

    /// Unsolicited callback; never carries the triggering request's id.
    pub fn callback(update: &BalanceUpdate) -> Self {
        Self {
            kind: MessageKind::Callback,
            request_id: CALLBACK_REQUEST_ID,
            operation: CALLBACK_OPERATION_CODE,
            body: update.to_bytes(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        PACKET_HEADER_LEN + self.body.len()
    }
}

/// Encodes a packet; total length is always `6 + body.len()`.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(packet.encoded_len());
    buf.put_u8(packet.kind.to_byte());
    buf.put_u32(packet.request_id);
    buf.put_u8(packet.operation);
    buf.put_slice(&packet.body);
    buf
}

/// Decodes a packet envelope. Fails only when the input is shorter than the
/// header; the body is returned uninspected.
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, CodecError> {
    if bytes.len() < PACKET_HEADER_LEN {
        return Err(CodecError::PacketTooShort { len: bytes.len() });
    }
    let mut cursor = bytes;
    let kind = MessageKind::from_byte(cursor.get_u8());
    let request_id = cursor.get_u32();
    let operation = cursor.get_u8();
    Ok(Packet {
        kind,
        request_id,
        operation,
        body: cursor.to_vec(),
    })
}
