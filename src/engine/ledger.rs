//! The ledger aggregate.
//!
//! One owned [`Ledger`] holds every account, the current round and the
//! settled history. Mutating operations take `&mut self` and are
//! synchronous: an accepted change is fully applied in memory before the
//! method returns, and its durable mirror is handed to the
//! [`PersistenceQueue`] without waiting. Round, placement, settlement,
//! cancellation and reversal operations live in sibling modules as
//! further `impl Ledger` blocks.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{AppConfig, LedgerConfig, OddsDefaults};
use crate::engine::calculator::Exposure;
use crate::storage::queue::{PersistenceQueue, WriteOp};
use crate::storage::PersistenceGateway;
use crate::types::{
    Account, BetStatus, LedgerError, LedgerResult, Odds, Role, Round, RoundResult,
    RoundStatus, Side, TransactionKind,
};

/// Process-wide handle. Readers take a read guard; every mutation takes the
/// write guard for the duration of one command.
pub type SharedLedger = Arc<RwLock<Ledger>>;

/// Operator credit change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOp {
    Deposit(i64),
    Withdraw(i64),
    Set(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditAdjustment {
    pub short_id: u32,
    pub old_credit: i64,
    pub new_credit: i64,
    pub delta: i64,
}

// ---------------------------------------------------------------------------
// Board read model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundBoard {
    pub round_id: u64,
    pub status: RoundStatus,
    pub result: Option<RoundResult>,
    pub current_odds: Option<usize>,
    pub epochs: Vec<EpochBoard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpochBoard {
    pub index: usize,
    pub odds: Odds,
    pub red_total: i64,
    pub blue_total: i64,
    pub bets: Vec<BoardBet>,
    pub void_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardBet {
    /// `None` when the bettor is no longer a known account.
    pub short_id: Option<u32>,
    pub side: Side,
    pub amount: i64,
    pub status: BetStatus,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct Ledger {
    pub(super) config: LedgerConfig,
    pub(super) odds_defaults: OddsDefaults,
    pub(super) accounts: HashMap<String, Account>,
    /// Dense display id → user id.
    pub(super) short_ids: BTreeMap<u32, String>,
    pub(super) next_short_id: u32,
    pub(super) current_round: Option<Round>,
    pub(super) history: Vec<Round>,
    pub(super) last_round_id: u64,
    pub(super) queue: PersistenceQueue,
    pub(super) gateway: Arc<dyn PersistenceGateway>,
}

impl Ledger {
    /// An empty ledger.
    pub fn new(config: &AppConfig, gateway: Arc<dyn PersistenceGateway>, queue: PersistenceQueue) -> Self {
        Self {
            config: config.ledger.clone(),
            odds_defaults: config.odds.clone(),
            accounts: HashMap::new(),
            short_ids: BTreeMap::new(),
            next_short_id: 1,
            current_round: None,
            history: Vec::new(),
            last_round_id: 0,
            queue,
            gateway,
        }
    }

    /// Rebuild the in-memory ledger from durable storage.
    ///
    /// Accounts come back with their credit and role; the active round (if
    /// any) comes back with its odds epochs and bets, and each account's
    /// hold, nets and per-epoch counts are replayed from those bets.
    pub async fn restore(
        config: &AppConfig,
        gateway: Arc<dyn PersistenceGateway>,
        queue: PersistenceQueue,
    ) -> Result<Self> {
        let mut ledger = Self::new(config, gateway.clone(), queue);

        for row in gateway.load_all_accounts().await? {
            let mut account = Account::new(row.user_id, row.short_id, row.credit);
            account.role = row.role;
            ledger.next_short_id = ledger.next_short_id.max(row.short_id + 1);
            ledger.short_ids.insert(account.short_id, account.user_id.clone());
            ledger.accounts.insert(account.user_id.clone(), account);
        }
        ledger.last_round_id = gateway.last_round_id().await?.unwrap_or(0);

        if let Some(row) = gateway.load_active_round().await? {
            let mut round = Round::new(row.id, row.created_at);
            round.status = row.status;
            round.result = row.result;

            for (index, odds) in gateway.load_round_odds(row.id).await? {
                if index != round.odds.len() {
                    warn!(round_id = row.id, index, "Odds epochs not contiguous, truncating");
                    break;
                }
                round.odds.push(odds);
            }
            if round.status == RoundStatus::Open {
                round.current_odds = round.odds.iter().rposition(Odds::is_open);
            }

            round.bets = gateway
                .load_round_bets(row.id)
                .await?
                .into_iter()
                .map(|b| b.into_bet())
                .collect();

            let mut exposures: HashMap<&str, Exposure> = HashMap::new();
            for bet in &round.bets {
                let Some(account) = ledger.accounts.get_mut(&bet.user_id) else {
                    warn!(user_id = %bet.user_id, round_id = row.id, "Bet for unknown account skipped");
                    continue;
                };
                *account.odds_bet_counts.entry(bet.odds_index).or_insert(0) += 1;
                if bet.status == BetStatus::Pending {
                    let exposure = exposures.entry(bet.user_id.as_str()).or_default();
                    *exposure = exposure.apply(bet.side, bet.win_amount, bet.loss_amount);
                }
            }
            for (user_id, exposure) in exposures {
                if let Some(account) = ledger.accounts.get_mut(user_id) {
                    account.red_net = exposure.red_net;
                    account.blue_net = exposure.blue_net;
                    account.credit_hold = exposure.hold();
                }
            }

            info!(round = %round, "Active round restored");
            ledger.current_round = Some(round);
        }

        info!(
            accounts = ledger.accounts.len(),
            last_round_id = ledger.last_round_id,
            "Ledger restored"
        );
        Ok(ledger)
    }

    pub fn odds_defaults(&self) -> &OddsDefaults {
        &self.odds_defaults
    }

    pub fn gateway(&self) -> Arc<dyn PersistenceGateway> {
        self.gateway.clone()
    }

    /// Wait for every durable write scheduled so far.
    pub async fn flush(&self) -> LedgerResult<()> {
        self.queue.flush().await
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Register `user_id` on first contact with the starting credit and the
    /// next short id. Existing accounts are returned untouched.
    pub fn ensure_account(&mut self, user_id: &str) -> &Account {
        if !self.accounts.contains_key(user_id) {
            let account = self.blank_account(user_id);
            info!(user_id, short_id = account.short_id, credit = account.credit, "Account registered");
            self.next_short_id += 1;
            self.short_ids.insert(account.short_id, user_id.to_string());
            self.queue.save_account(&account);
            self.accounts.insert(user_id.to_string(), account);
        }
        &self.accounts[user_id]
    }

    /// The account a first-time user would get, without registering it.
    pub(super) fn blank_account(&self, user_id: &str) -> Account {
        Account::new(user_id, self.next_short_id, self.config.starting_credit)
    }

    pub fn account(&self, user_id: &str) -> Option<&Account> {
        self.accounts.get(user_id)
    }

    pub fn account_by_short_id(&self, short_id: u32) -> Option<&Account> {
        self.short_ids
            .get(&short_id)
            .and_then(|user_id| self.accounts.get(user_id))
    }

    /// All accounts ordered by short id.
    pub fn accounts(&self) -> Vec<&Account> {
        self.short_ids
            .values()
            .filter_map(|user_id| self.accounts.get(user_id))
            .collect()
    }

    /// ADMIN and MASTER accounts ordered by short id.
    pub fn admins(&self) -> Vec<&Account> {
        self.accounts()
            .into_iter()
            .filter(|a| a.role.is_privileged())
            .collect()
    }

    fn user_id_of(&self, short_id: u32) -> LedgerResult<String> {
        self.short_ids
            .get(&short_id)
            .filter(|user_id| self.accounts.contains_key(*user_id))
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("user #u{short_id}")))
    }

    /// Deposit, withdraw or set an account's credit.
    ///
    /// Credit may never drop below the account's current hold.
    pub fn adjust_credit(&mut self, short_id: u32, op: CreditOp) -> LedgerResult<CreditAdjustment> {
        let (amount, kind) = match op {
            CreditOp::Deposit(v) => (v, TransactionKind::Deposit),
            CreditOp::Withdraw(v) => (v, TransactionKind::Withdraw),
            CreditOp::Set(v) => (v, TransactionKind::Adjustment),
        };
        let positive = !matches!(op, CreditOp::Set(_));
        if amount < 0 || (positive && amount == 0) {
            return Err(LedgerError::Validation(format!("invalid credit amount: {amount}")));
        }

        let user_id = self.user_id_of(short_id)?;
        let account = self
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::NotFound(format!("user #u{short_id}")))?;
        let old_credit = account.credit;
        let new_credit = match op {
            CreditOp::Deposit(v) => old_credit.checked_add(v),
            CreditOp::Withdraw(v) => old_credit.checked_sub(v),
            CreditOp::Set(v) => Some(v),
        }
        .ok_or_else(|| LedgerError::Validation(format!("credit overflow: {old_credit} with {amount}")))?;
        if new_credit < account.credit_hold {
            return Err(LedgerError::InsufficientCredit {
                required: account.credit_hold,
                available: new_credit,
            });
        }

        account.credit = new_credit;
        let delta = new_credit - old_credit;
        info!(short_id, old_credit, new_credit, kind = %kind, "Credit adjusted");
        self.queue.save_account(account);
        if delta != 0 {
            self.queue.log_transaction(&user_id, delta, kind, "");
        }

        Ok(CreditAdjustment {
            short_id,
            old_credit,
            new_credit,
            delta,
        })
    }

    pub fn set_role(&mut self, short_id: u32, role: Role) -> LedgerResult<&Account> {
        let user_id = self.user_id_of(short_id)?;
        let account = self
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::NotFound(format!("user #u{short_id}")))?;
        account.role = role;
        info!(short_id, role = %role, "Role changed");
        self.queue.save_account(account);
        Ok(account)
    }

    /// Promote `user_id` to MASTER when the system has none yet.
    ///
    /// Once any ADMIN exists only an ADMIN may claim.
    pub fn claim_founding_master(&mut self, user_id: &str) -> LedgerResult<&Account> {
        if self.accounts.values().any(|a| a.role == Role::Master) {
            return Err(LedgerError::Conflict("a master already exists".into()));
        }
        let admins_exist = self.accounts.values().any(|a| a.role == Role::Admin);
        let caller_role = self.account(user_id).map(|a| a.role);
        if admins_exist && caller_role != Some(Role::Admin) {
            return Err(LedgerError::PermissionDenied(
                "only an admin may become the founding master".into(),
            ));
        }

        self.ensure_account(user_id);
        let short_id = self.accounts[user_id].short_id;
        self.set_role(short_id, Role::Master)
    }

    // -----------------------------------------------------------------------
    // Rounds (read side)
    // -----------------------------------------------------------------------

    pub fn current_round(&self) -> Option<&Round> {
        self.current_round.as_ref()
    }

    /// Settled rounds, oldest first.
    pub fn history(&self) -> &[Round] {
        &self.history
    }

    pub fn last_round_id(&self) -> u64 {
        self.last_round_id
    }

    /// Per-epoch view of the current round.
    pub fn board(&self) -> Option<RoundBoard> {
        let round = self.current_round.as_ref()?;
        let epochs = round
            .odds
            .iter()
            .enumerate()
            .map(|(index, odds)| {
                let in_epoch = round.bets.iter().filter(|b| b.odds_index == index);
                let void_count = in_epoch.clone().filter(|b| b.status == BetStatus::Void).count();
                let bets: Vec<BoardBet> = in_epoch
                    .filter(|b| b.status != BetStatus::Void)
                    .map(|b| BoardBet {
                        short_id: self.accounts.get(&b.user_id).map(|a| a.short_id),
                        side: b.side,
                        amount: b.amount,
                        status: b.status,
                    })
                    .collect();
                let total = |side: Side| -> i64 { bets.iter().filter(|b| b.side == side).map(|b| b.amount).sum() };
                EpochBoard {
                    index,
                    odds: odds.clone(),
                    red_total: total(Side::Red),
                    blue_total: total(Side::Blue),
                    void_count,
                    bets,
                }
            })
            .collect();

        Some(RoundBoard {
            round_id: round.id,
            status: round.status,
            result: round.result,
            current_odds: round.open_odds().map(|(i, _)| i),
            epochs,
        })
    }

    /// Drop every round and bet, keeping accounts and their credit.
    pub fn reset_system(&mut self) {
        self.current_round = None;
        self.history.clear();
        self.last_round_id = 0;
        self.reset_all_exposure();
        self.queue.enqueue(WriteOp::ClearBettingData);
        info!(accounts = self.accounts.len(), "System reset, rounds and bets cleared");
    }

    /// Fails when an account would end up with less credit than it holds.
    pub(super) fn check_covered(account: &Account, credit: i64, hold: i64) -> LedgerResult<()> {
        if credit - hold < 0 {
            warn!(user_id = %account.user_id, credit, hold, "Exposure not covered");
            return Err(LedgerError::InsufficientCredit {
                required: hold,
                available: credit,
            });
        }
        Ok(())
    }

    pub(super) fn reset_all_exposure(&mut self) {
        for account in self.accounts.values_mut() {
            account.reset_round();
        }
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
