use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Server-assigned account number.
pub type AccountId = u32;
/// Client-chosen request identifier, unique per session over its lifetime.
pub type RequestId = u32;

/// Operation code carried by unsolicited callback packets.
pub const CALLBACK_OPERATION_CODE: u8 = 0;
/// Request id carried by unsolicited callback packets.
pub const CALLBACK_REQUEST_ID: RequestId = 0;

/// First byte of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Reply,
    Error,
    Callback,
    /// Any byte outside the known set; decoded as-is and never produced locally.
    Unknown(u8),
}

impl MessageKind {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Request,
            1 => Self::Reply,
            2 => Self::Error,
            3 => Self::Callback,
            other => Self::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Request => 0,
            Self::Reply => 1,
            Self::Error => 2,
            Self::Callback => 3,
            Self::Unknown(other) => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Request => "Request",
            Self::Reply => "Reply",
            Self::Error => "Error",
            Self::Callback => "Callback",
            Self::Unknown(_) => "UnknownMsg",
        }
    }
}

/// Closed set of operations the service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    Open = 1,
    Close = 2,
    Deposit = 3,
    Withdraw = 4,
    Subscribe = 5,
    CheckBalance = 6,
    Transfer = 7,
}

impl Operation {
    /// Every operation, in wire-code order.
    pub const ALL: [Operation; 7] = [
        Operation::Open,
        Operation::Close,
        Operation::Deposit,
        Operation::Withdraw,
        Operation::Subscribe,
        Operation::CheckBalance,
        Operation::Transfer,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Close => "Close",
            Self::Deposit => "Deposit",
            Self::Withdraw => "Withdraw",
            Self::Subscribe => "Subscribe",
            Self::CheckBalance => "CheckBalance",
            Self::Transfer => "Transfer",
        }
    }

    /// Human-readable name for a raw code, including the callback code.
    pub fn name_for_code(code: u8) -> &'static str {
        match Self::from_code(code) {
            Some(op) => op.name(),
            None if code == CALLBACK_OPERATION_CODE => "Callback",
            None => "UnknownOp",
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(CoreError::UnknownOperation(code))
    }
}

/// Currency tag recorded on an account at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Currency {
    Usd = 0,
    Sgd = 1,
    Eur = 2,
    Gbp = 3,
    Cny = 4,
}

impl Currency {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Sgd => "SGD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Cny => "CNY",
        }
    }
}

impl TryFrom<u8> for Currency {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Usd),
            1 => Ok(Self::Sgd),
            2 => Ok(Self::Eur),
            3 => Ok(Self::Gbp),
            4 => Ok(Self::Cny),
            other => Err(CoreError::UnknownCurrency(other)),
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "SGD" => Ok(Self::Sgd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "CNY" => Ok(Self::Cny),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
