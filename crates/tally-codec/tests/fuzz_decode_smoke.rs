use std::panic;

use tally_codec::body::{
    AuthRequest, BalanceUpdate, MessageReply, OpenAccountRequest, SubscribeRequest,
    TransactionRequest, TransferRequest, WireBody,
};
use tally_codec::packet::{decode_packet, encode_packet, Packet};
use tally_core::Operation;

fn xorshift64(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut s = seed.max(1);
    let mut out = vec![0_u8; len];
    for b in &mut out {
        *b = (xorshift64(&mut s) & 0xFF) as u8;
    }
    out
}

fn decode_all_bodies(data: &[u8]) {
    let _ = OpenAccountRequest::from_bytes(data);
    let _ = AuthRequest::from_bytes(data);
    let _ = TransactionRequest::from_bytes(data);
    let _ = TransferRequest::from_bytes(data);
    let _ = SubscribeRequest::from_bytes(data);
    let _ = MessageReply::from_bytes(data);
    let _ = BalanceUpdate::from_bytes(data);
}

fn sample_transfer_packet() -> Packet {
    let body = TransferRequest {
        name: "Alice".into(),
        password: "password123".into(),
        sender_id: 1,
        receiver_id: 2,
        amount: 12.5,
    };
    Packet::request(55, Operation::Transfer, body.to_bytes())
}

#[test]
fn fuzz_like_random_inputs_do_not_panic_decoders() {
    for i in 0..2000_u64 {
        let len = ((i as usize) * 37) % 512;
        let data = random_bytes(0xBAD5EED ^ i, len);

        let pkt = panic::catch_unwind(|| decode_packet(&data));
        assert!(pkt.is_ok(), "decode_packet panicked at case {i}");

        let bodies = panic::catch_unwind(|| decode_all_bodies(&data));
        assert!(bodies.is_ok(), "body decoders panicked at case {i}");
    }
}

#[test]
fn fuzz_like_mutations_of_valid_packets_do_not_panic() {
    let mut bytes = encode_packet(&sample_transfer_packet());

    for i in 0..512_usize {
        let idx = i % bytes.len();
        bytes[idx] ^= (i as u8).wrapping_mul(31).wrapping_add(1);
        let data = bytes.clone();

        let result = panic::catch_unwind(|| {
            if let Ok(pkt) = decode_packet(&data) {
                decode_all_bodies(&pkt.body);
            }
        });
        assert!(result.is_ok(), "decoders panicked for mutated packet at case {i}");
    }
}

#[test]
fn truncated_packets_never_yield_partial_bodies() {
    let bytes = encode_packet(&sample_transfer_packet());
    let full = decode_packet(&bytes).expect("full packet decodes");
    assert!(TransferRequest::from_bytes(&full.body).is_ok());

    for cut in 0..bytes.len() {
        match decode_packet(&bytes[..cut]) {
            Ok(pkt) => assert!(
                TransferRequest::from_bytes(&pkt.body).is_err(),
                "truncated body of {cut} bytes must not decode"
            ),
            Err(_) => assert!(cut < 6),
        }
    }
}
