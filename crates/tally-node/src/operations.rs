//! Operation lookup table: maps each operation code to its handler.

use tally_codec::body::{
    AuthRequest, BalanceReply, BalanceUpdate, MessageReply, OpenAccountReply, OpenAccountRequest,
    SubscribeRequest, TransactionRequest, TransferRequest, WireBody,
};
use tally_codec::error::CodecError;
use tally_core::Operation;

use crate::error::HandleError;
use crate::ledger::AccountService;

/// Successful handler result: the encoded reply body plus the balance events
/// to publish, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub body: Vec<u8>,
    pub events: Vec<BalanceUpdate>,
}

impl Handled {
    fn quiet(body: Vec<u8>) -> Self {
        Self {
            body,
            events: Vec::new(),
        }
    }

    fn with_events(body: Vec<u8>, events: Vec<BalanceUpdate>) -> Self {
        Self { body, events }
    }
}

pub type OperationFn<S> = fn(&S, &[u8]) -> Result<Handled, HandleError>;

/// Where a decoded operation code is handled.
pub enum Route<S> {
    /// Ledger operation, independent of who sent it.
    Account(OperationFn<S>),
    /// Needs the sender's address and the clock; handled by the dispatcher.
    Subscribe,
}

impl<S> Clone for Route<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Route<S> {}

impl<S> std::fmt::Debug for Route<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Account(_) => f.write_str("Account"),
            Route::Subscribe => f.write_str("Subscribe"),
        }
    }
}

pub fn route<S: AccountService>(operation: Operation) -> Route<S> {
    match operation {
        Operation::Open => Route::Account(open_account::<S>),
        Operation::Close => Route::Account(close_account::<S>),
        Operation::Deposit => Route::Account(deposit::<S>),
        Operation::Withdraw => Route::Account(withdraw::<S>),
        Operation::Subscribe => Route::Subscribe,
        Operation::CheckBalance => Route::Account(check_balance::<S>),
        Operation::Transfer => Route::Account(transfer::<S>),
    }
}

/// Decodes `body` against the request layout of `operation_code` without
/// running anything. Unknown codes pass, since they are answered with an
/// Error reply rather than dropped.
pub fn validate_request_body(operation_code: u8, body: &[u8]) -> Result<(), CodecError> {
    let Some(operation) = Operation::from_code(operation_code) else {
        return Ok(());
    };
    match operation {
        Operation::Open => OpenAccountRequest::from_bytes(body).map(drop),
        Operation::Close | Operation::CheckBalance => AuthRequest::from_bytes(body).map(drop),
        Operation::Deposit | Operation::Withdraw => TransactionRequest::from_bytes(body).map(drop),
        Operation::Subscribe => SubscribeRequest::from_bytes(body).map(drop),
        Operation::Transfer => TransferRequest::from_bytes(body).map(drop),
    }
}

pub fn open_account<S: AccountService>(service: &S, body: &[u8]) -> Result<Handled, HandleError> {
    let req = OpenAccountRequest::from_bytes(body)?;
    let opened = service.open_account(&req)?;
    let reply = OpenAccountReply {
        account_id: opened.account_id,
    };
    Ok(Handled::with_events(reply.to_bytes(), vec![opened]))
}

pub fn close_account<S: AccountService>(service: &S, body: &[u8]) -> Result<Handled, HandleError> {
    let req = AuthRequest::from_bytes(body)?;
    let closed = service.close_account(&req)?;
    let reply = MessageReply::new(format!("Account {} closed successfully", closed.account_id));
    Ok(Handled::with_events(reply.to_bytes(), vec![closed]))
}

pub fn deposit<S: AccountService>(service: &S, body: &[u8]) -> Result<Handled, HandleError> {
    let req = TransactionRequest::from_bytes(body)?;
    let update = service.deposit(&req)?;
    Ok(balance_changed(update))
}

pub fn withdraw<S: AccountService>(service: &S, body: &[u8]) -> Result<Handled, HandleError> {
    let req = TransactionRequest::from_bytes(body)?;
    let update = service.withdraw(&req)?;
    Ok(balance_changed(update))
}

pub fn check_balance<S: AccountService>(service: &S, body: &[u8]) -> Result<Handled, HandleError> {
    let req = AuthRequest::from_bytes(body)?;
    let balance = service.check_balance(&req)?;
    Ok(Handled::quiet(BalanceReply { balance }.to_bytes()))
}

pub fn transfer<S: AccountService>(service: &S, body: &[u8]) -> Result<Handled, HandleError> {
    let req = TransferRequest::from_bytes(body)?;
    let outcome = service.transfer(&req)?;
    let reply = BalanceReply {
        balance: outcome.sender.balance,
    };
    Ok(Handled::with_events(
        reply.to_bytes(),
        vec![outcome.sender, outcome.receiver],
    ))
}

fn balance_changed(update: BalanceUpdate) -> Handled {
    let reply = BalanceReply {
        balance: update.balance,
    };
    Handled::with_events(reply.to_bytes(), vec![update])
}
