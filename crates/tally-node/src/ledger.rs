//! Account ledger behind the dispatch loop.
//!
//! `AccountService` is the seam the dispatcher calls into; `Ledger` is the
//! in-memory implementation. All account state lives behind one lock, so a
//! transfer's debit and credit are observed together by every reader.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tally_codec::body::{
    AuthRequest, BalanceUpdate, OpenAccountRequest, TransactionRequest, TransferRequest,
};
use tally_core::{AccountId, Currency};

use crate::error::{AuthError, BusinessRuleError, ServiceError};
use crate::lock;

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub password: String,
    pub currency: Currency,
    pub balance: f64,
}

/// Balances of both sides after a transfer, sender first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferOutcome {
    pub sender: BalanceUpdate,
    pub receiver: BalanceUpdate,
}

/// Business operations the dispatcher routes requests into.
///
/// Every mutating method returns the resulting account state so the caller
/// can publish it.
pub trait AccountService {
    fn open_account(&self, req: &OpenAccountRequest) -> Result<BalanceUpdate, ServiceError>;
    /// Returns the closed account's final state.
    fn close_account(&self, req: &AuthRequest) -> Result<BalanceUpdate, ServiceError>;
    fn deposit(&self, req: &TransactionRequest) -> Result<BalanceUpdate, ServiceError>;
    fn withdraw(&self, req: &TransactionRequest) -> Result<BalanceUpdate, ServiceError>;
    fn check_balance(&self, req: &AuthRequest) -> Result<f64, ServiceError>;
    fn transfer(&self, req: &TransferRequest) -> Result<TransferOutcome, ServiceError>;
}

#[derive(Debug)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    rng: StdRng,
}

impl LedgerState {
    fn authenticate(
        &mut self,
        account_id: AccountId,
        name: &str,
        password: &str,
    ) -> Result<&mut Account, AuthError> {
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(AuthError::AccountNotFound(account_id))?;
        if account.name != name {
            return Err(AuthError::NameMismatch);
        }
        if account.password != password {
            return Err(AuthError::IncorrectPassword);
        }
        Ok(account)
    }

    fn next_account_id(&mut self) -> AccountId {
        loop {
            let id: AccountId = self.rng.gen();
            if id != 0 && !self.accounts.contains_key(&id) {
                return id;
            }
        }
    }
}

fn validate_amount(amount: f64) -> Result<(), BusinessRuleError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(BusinessRuleError::InvalidAmount)
    }
}

fn adjust_balance(
    accounts: &mut HashMap<AccountId, Account>,
    account_id: AccountId,
    delta: f64,
) -> Option<BalanceUpdate> {
    let account = accounts.get_mut(&account_id)?;
    account.balance += delta;
    Some(update_of(account))
}

fn update_of(account: &Account) -> BalanceUpdate {
    BalanceUpdate {
        account_id: account.id,
        balance: account.balance,
    }
}

/// In-memory ledger; no persistence across restarts.
#[derive(Debug)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger with a reproducible account-id sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                accounts: HashMap::new(),
                rng,
            }),
        }
    }

    pub fn account_count(&self) -> usize {
        lock(&self.state).accounts.len()
    }

    pub fn account(&self, account_id: AccountId) -> Option<Account> {
        lock(&self.state).accounts.get(&account_id).cloned()
    }

    /// Sum of all balances, read atomically.
    pub fn total_balance(&self) -> f64 {
        lock(&self.state).accounts.values().map(|a| a.balance).sum()
    }

    fn apply_delta(
        &self,
        req: &TransactionRequest,
        withdraw: bool,
    ) -> Result<BalanceUpdate, ServiceError> {
        let mut state = lock(&self.state);
        let account = state.authenticate(req.account_id, &req.name, &req.password)?;
        validate_amount(req.amount)?;
        if withdraw {
            if account.balance < req.amount {
                return Err(BusinessRuleError::InsufficientFunds.into());
            }
            account.balance -= req.amount;
        } else {
            account.balance += req.amount;
        }
        Ok(update_of(account))
    }
}

impl AccountService for Ledger {
    fn open_account(&self, req: &OpenAccountRequest) -> Result<BalanceUpdate, ServiceError> {
        let currency = Currency::try_from(req.currency)
            .map_err(|_| BusinessRuleError::UnsupportedCurrency(req.currency))?;
        validate_amount(req.initial_balance)?;

        let mut state = lock(&self.state);
        let id = state.next_account_id();
        let account = Account {
            id,
            name: req.name.clone(),
            password: req.password.clone(),
            currency,
            balance: req.initial_balance,
        };
        let update = update_of(&account);
        state.accounts.insert(id, account);
        Ok(update)
    }

    fn close_account(&self, req: &AuthRequest) -> Result<BalanceUpdate, ServiceError> {
        let mut state = lock(&self.state);
        let update = update_of(state.authenticate(req.account_id, &req.name, &req.password)?);
        state.accounts.remove(&req.account_id);
        Ok(update)
    }

    fn deposit(&self, req: &TransactionRequest) -> Result<BalanceUpdate, ServiceError> {
        self.apply_delta(req, false)
    }

    fn withdraw(&self, req: &TransactionRequest) -> Result<BalanceUpdate, ServiceError> {
        self.apply_delta(req, true)
    }

    fn check_balance(&self, req: &AuthRequest) -> Result<f64, ServiceError> {
        let mut state = lock(&self.state);
        let account = state.authenticate(req.account_id, &req.name, &req.password)?;
        Ok(account.balance)
    }

    fn transfer(&self, req: &TransferRequest) -> Result<TransferOutcome, ServiceError> {
        let mut state = lock(&self.state);
        let sender_balance = state
            .authenticate(req.sender_id, &req.name, &req.password)?
            .balance;
        validate_amount(req.amount)?;
        if !state.accounts.contains_key(&req.receiver_id) {
            return Err(BusinessRuleError::ReceiverNotFound(req.receiver_id).into());
        }
        if sender_balance < req.amount {
            return Err(BusinessRuleError::InsufficientFunds.into());
        }

        // Both ids were checked above under the same lock.
        let sender = adjust_balance(&mut state.accounts, req.sender_id, -req.amount)
            .ok_or(AuthError::AccountNotFound(req.sender_id))?;
        let receiver = adjust_balance(&mut state.accounts, req.receiver_id, req.amount)
            .ok_or(BusinessRuleError::ReceiverNotFound(req.receiver_id))?;
        Ok(TransferOutcome { sender, receiver })
    }
}
