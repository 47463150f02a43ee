//! Request, reply, and callback body shapes.
//!
//! Every shape is a fixed positional sequence of field primitives. Decoding
//! short-circuits on the first failing field and never returns a partial
//! value. Trailing bytes after the last field are ignored.

use tally_core::AccountId;

use crate::error::CodecError;
use crate::field::{encode_f64, encode_string, encode_u32, encode_u8, FieldReader};

/// Positional body encoding shared by all request/reply shapes.
pub trait WireBody: Sized {
    fn encode_into(&self, buf: &mut Vec<u8>);
    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::decode_from(&mut FieldReader::new(bytes))
    }
}

/// Open: `[name][password][currency: u8][initial_balance: f64]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAccountRequest {
    pub name: String,
    pub password: String,
    /// Raw currency byte; the ledger rejects unsupported values.
    pub currency: u8,
    pub initial_balance: f64,
}

impl WireBody for OpenAccountRequest {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_string(buf, &self.name);
        encode_string(buf, &self.password);
        encode_u8(buf, self.currency);
        encode_f64(buf, self.initial_balance);
    }

    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            name: reader.read_string()?,
            password: reader.read_string()?,
            currency: reader.read_u8()?,
            initial_balance: reader.read_f64()?,
        })
    }
}

/// Close / CheckBalance: `[name][password][account_id: u32]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub name: String,
    pub password: String,
    pub account_id: AccountId,
}

impl WireBody for AuthRequest {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_string(buf, &self.name);
        encode_string(buf, &self.password);
        encode_u32(buf, self.account_id);
    }

    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            name: reader.read_string()?,
            password: reader.read_string()?,
            account_id: reader.read_u32()?,
        })
    }
}

/// Deposit / Withdraw: `[name][password][account_id: u32][amount: f64]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub name: String,
    pub password: String,
    pub account_id: AccountId,
    pub amount: f64,
}

impl WireBody for TransactionRequest {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_string(buf, &self.name);
        encode_string(buf, &self.password);
        encode_u32(buf, self.account_id);
        encode_f64(buf, self.amount);
    }

    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            name: reader.read_string()?,
            password: reader.read_string()?,
            account_id: reader.read_u32()?,
            amount: reader.read_f64()?,
        })
    }
}

/// Transfer: `[name][password][sender_id: u32][receiver_id: u32][amount: f64]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub name: String,
    pub password: String,
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: f64,
}

impl WireBody for TransferRequest {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_string(buf, &self.name);
        encode_string(buf, &self.password);
        encode_u32(buf, self.sender_id);
        encode_u32(buf, self.receiver_id);
        encode_f64(buf, self.amount);
    }

    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            name: reader.read_string()?,
            password: reader.read_string()?,
            sender_id: reader.read_u32()?,
            receiver_id: reader.read_u32()?,
            amount: reader.read_f64()?,
        })
    }
}

/// Subscribe: `[duration_seconds: u32]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub duration_seconds: u32,
}

impl WireBody for SubscribeRequest {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_u32(buf, self.duration_seconds);
    }

    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            duration_seconds: reader.read_u32()?,
        })
    }
}

/// Open reply: `[new_account_id: u32]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenAccountReply {
    pub account_id: AccountId,
}

impl WireBody for OpenAccountReply {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_u32(buf, self.account_id);
    }

    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            account_id: reader.read_u32()?,
        })
    }
}

/// CheckBalance / Deposit / Withdraw / Transfer reply: `[resulting_balance: f64]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceReply {
    pub balance: f64,
}

impl WireBody for BalanceReply {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_f64(buf, self.balance);
    }

    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            balance: reader.read_f64()?,
        })
    }
}

/// Close / Subscribe reply and every Error body: `[message]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReply {
    pub message: String,
}

impl MessageReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl WireBody for MessageReply {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_string(buf, &self.message);
    }

    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            message: reader.read_string()?,
        })
    }
}

/// Callback body: `[account_id: u32][new_balance: f64]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceUpdate {
    pub account_id: AccountId,
    pub balance: f64,
}

impl WireBody for BalanceUpdate {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_u32(buf, self.account_id);
        encode_f64(buf, self.balance);
    }

    fn decode_from(reader: &mut FieldReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            account_id: reader.read_u32()?,
            balance: reader.read_f64()?,
        })
    }
}
