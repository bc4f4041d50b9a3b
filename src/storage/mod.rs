//! Persistence layer.
//!
//! The in-memory ledger is authoritative; storage is a durable mirror of
//! accounts, rounds, odds epochs, bets and the append-only audit trail.
//! Writes go through [`queue::PersistenceQueue`] and never block a ledger
//! operation. Reads are used for restart recovery, reversal and account
//! statements.

pub mod queue;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    Account, Bet, BetStatus, Odds, Role, Round, RoundResult, RoundStatus, Side, Transaction,
    TransactionKind,
};

// ---------------------------------------------------------------------------
// Durable rows
// ---------------------------------------------------------------------------

/// The durable part of an account. Hold, nets and bet counts are
/// round-scoped and rebuilt from bets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub user_id: String,
    pub short_id: u32,
    pub role: Role,
    pub credit: i64,
}

impl From<&Account> for AccountRow {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.clone(),
            short_id: account.short_id,
            role: account.role,
            credit: account.credit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRow {
    pub id: u64,
    pub status: RoundStatus,
    pub result: Option<RoundResult>,
    pub created_at: i64,
}

impl From<&Round> for RoundRow {
    fn from(round: &Round) -> Self {
        Self {
            id: round.id,
            status: round.status,
            result: round.result,
            created_at: round.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetRow {
    pub user_id: String,
    pub odds_index: usize,
    pub side: Side,
    pub amount: i64,
    pub win_amount: i64,
    pub loss_amount: i64,
    pub status: BetStatus,
    pub created_at: i64,
}

impl BetRow {
    pub fn into_bet(self) -> Bet {
        Bet {
            user_id: self.user_id,
            odds_index: self.odds_index,
            side: self.side,
            amount: self.amount,
            win_amount: self.win_amount,
            loss_amount: self.loss_amount,
            timestamp: self.created_at,
            status: self.status,
        }
    }
}

/// An audit entry waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEntry {
    pub user_id: String,
    /// Signed credit delta.
    pub amount: i64,
    pub kind: TransactionKind,
    pub reference: String,
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Durable storage seen by the ledger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn save_account(&self, account: &AccountRow) -> Result<()>;

    async fn save_round(&self, round: &RoundRow) -> Result<()>;

    /// Upsert one odds epoch of a round.
    async fn save_odds(&self, round_id: u64, odds_index: usize, odds: &Odds) -> Result<()>;

    async fn save_bet(&self, round_id: u64, bet: &Bet) -> Result<()>;

    /// Mark every bet of one odds epoch VOID.
    async fn void_bets(&self, round_id: u64, odds_index: usize) -> Result<()>;

    /// Resolve every PENDING bet of the round against the result.
    async fn settle_bets_bulk(&self, round_id: u64, result: RoundResult) -> Result<()>;

    async fn log_transaction(&self, entry: &TransactionEntry) -> Result<()>;

    /// WON/LOST bets of the round back to PENDING.
    async fn mark_bets_pending(&self, round_id: u64) -> Result<()>;

    /// Round back to CLOSED with its result and odds epochs cleared.
    async fn reopen_round_for_reversal(&self, round_id: u64) -> Result<()>;

    /// Delete all rounds, odds and bets. Accounts and transactions stay.
    async fn clear_betting_data(&self) -> Result<()>;

    async fn load_all_accounts(&self) -> Result<Vec<AccountRow>>;

    /// Latest round that is not COMPLETED.
    async fn load_active_round(&self) -> Result<Option<RoundRow>>;

    async fn last_round_id(&self) -> Result<Option<u64>>;

    async fn load_round_odds(&self, round_id: u64) -> Result<Vec<(usize, Odds)>>;

    /// All bets of the round in placement order.
    async fn load_round_bets(&self, round_id: u64) -> Result<Vec<BetRow>>;

    /// The given round, or the latest COMPLETED one when `round_id` is `None`.
    async fn find_round_for_reversal(&self, round_id: Option<u64>) -> Result<Option<RoundRow>>;

    /// WON and LOST bets of the round in placement order.
    async fn load_settled_bets(&self, round_id: u64) -> Result<Vec<BetRow>>;

    /// Newest first.
    async fn recent_transactions(&self, user_id: &str, limit: u32) -> Result<Vec<Transaction>>;
}
