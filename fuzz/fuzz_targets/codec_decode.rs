#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_codec::body::{
    AuthRequest, BalanceUpdate, MessageReply, OpenAccountRequest, SubscribeRequest,
    TransactionRequest, TransferRequest, WireBody,
};
use tally_codec::packet::decode_packet;

fuzz_target!(|data: &[u8]| {
    let _ = decode_packet(data);
    let _ = OpenAccountRequest::from_bytes(data);
    let _ = AuthRequest::from_bytes(data);
    let _ = TransactionRequest::from_bytes(data);
    let _ = TransferRequest::from_bytes(data);
    let _ = SubscribeRequest::from_bytes(data);
    let _ = MessageReply::from_bytes(data);
    let _ = BalanceUpdate::from_bytes(data);
});
