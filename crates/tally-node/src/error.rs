use tally_codec::error::CodecError;
use tally_core::AccountId;
use thiserror::Error;

/// Credential failures; surfaced to the caller as an Error reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("account {0} does not exist")]
    AccountNotFound(AccountId),
    #[error("name mismatch")]
    NameMismatch,
    #[error("incorrect password")]
    IncorrectPassword,
}

/// Ledger rule violations; surfaced to the caller as an Error reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusinessRuleError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("receiver account {0} does not exist")]
    ReceiverNotFound(AccountId),
    #[error("invalid amount")]
    InvalidAmount,
    #[error("unsupported currency {0}")]
    UnsupportedCurrency(u8),
}

/// Every failure that becomes an Error reply. The `Display` text is the reply
/// body verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    BusinessRule(#[from] BusinessRuleError),
    #[error("unknown operation {0}")]
    UnknownOperation(u8),
}

/// Outcome of running one operation handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    /// Body did not match the operation's field layout; the request is
    /// dropped without a reply.
    #[error("malformed body: {0}")]
    Format(#[from] CodecError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[cfg(test)]
mod tests {
    use super::{AuthError, BusinessRuleError, HandleError, ServiceError};
    use tally_codec::error::CodecError;

    #[test]
    fn reply_texts_are_stable() {
        let cases: Vec<(ServiceError, &str)> = vec![
            (AuthError::AccountNotFound(12).into(), "account 12 does not exist"),
            (AuthError::NameMismatch.into(), "name mismatch"),
            (AuthError::IncorrectPassword.into(), "incorrect password"),
            (
                BusinessRuleError::InsufficientFunds.into(),
                "insufficient funds",
            ),
            (
                BusinessRuleError::ReceiverNotFound(9).into(),
                "receiver account 9 does not exist",
            ),
            (BusinessRuleError::InvalidAmount.into(), "invalid amount"),
            (
                BusinessRuleError::UnsupportedCurrency(8).into(),
                "unsupported currency 8",
            ),
            (ServiceError::UnknownOperation(99), "unknown operation 99"),
        ];
        for (err, text) in cases {
            assert_eq!(err.to_string(), text);
        }
    }

    #[test]
    fn handle_error_wraps_codec_and_service_errors() {
        let format: HandleError = CodecError::PacketTooShort { len: 1 }.into();
        assert!(format.to_string().starts_with("malformed body:"));

        let service: HandleError = ServiceError::from(AuthError::NameMismatch).into();
        assert_eq!(service.to_string(), "name mismatch");
    }
}
