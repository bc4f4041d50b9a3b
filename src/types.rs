//! Shared types for the RINGSIDE ledger.
//!
//! These types form the data model used across all modules: accounts,
//! rounds, odds epochs, bets and audit transactions. All money and all
//! odds ratios are integers; ratios are scaled by 10 ("2.5" is stored
//! as 25) so exposure arithmetic never touches floating point.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// One of the two outcomes a customer can back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Red,
    Blue,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Red => "RED",
            Side::Blue => "BLUE",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RED" => Ok(Side::Red),
            "BLUE" => Ok(Side::Blue),
            _ => Err(LedgerError::Validation(format!("unknown side: {s}"))),
        }
    }
}

/// Declared result of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundResult {
    Red,
    Blue,
    Draw,
}

impl RoundResult {
    /// The winning side, or `None` for a draw.
    pub fn winner(&self) -> Option<Side> {
        match self {
            RoundResult::Red => Some(Side::Red),
            RoundResult::Blue => Some(Side::Blue),
            RoundResult::Draw => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoundResult::Red => "RED",
            RoundResult::Blue => "BLUE",
            RoundResult::Draw => "DRAW",
        }
    }
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundResult {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RED" => Ok(RoundResult::Red),
            "BLUE" => Ok(RoundResult::Blue),
            "DRAW" => Ok(RoundResult::Draw),
            _ => Err(LedgerError::Validation(format!("unknown round result: {s}"))),
        }
    }
}

/// Account role. ADMIN and MASTER may run operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
    Master,
}

impl Role {
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Master)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
            Role::Master => "MASTER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(Role::Customer),
            "ADMIN" => Ok(Role::Admin),
            "MASTER" => Ok(Role::Master),
            _ => Err(LedgerError::Validation(format!("unknown role: {s}"))),
        }
    }
}

/// Round lifecycle: OPEN → CLOSED → WAITING_PAYMENT → COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Open,
    Closed,
    WaitingPayment,
    Completed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Open => "OPEN",
            RoundStatus::Closed => "CLOSED",
            RoundStatus::WaitingPayment => "WAITING_PAYMENT",
            RoundStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(RoundStatus::Open),
            "CLOSED" => Ok(RoundStatus::Closed),
            "WAITING_PAYMENT" => Ok(RoundStatus::WaitingPayment),
            "COMPLETED" => Ok(RoundStatus::Completed),
            _ => Err(LedgerError::Validation(format!("unknown round status: {s}"))),
        }
    }
}

/// Odds epoch lifecycle: OPEN → CLOSED → CANCELLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OddsStatus {
    Open,
    Closed,
    Cancelled,
}

impl OddsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OddsStatus::Open => "OPEN",
            OddsStatus::Closed => "CLOSED",
            OddsStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OddsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OddsStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(OddsStatus::Open),
            "CLOSED" => Ok(OddsStatus::Closed),
            "CANCELLED" => Ok(OddsStatus::Cancelled),
            _ => Err(LedgerError::Validation(format!("unknown odds status: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Draw,
    Void,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "PENDING",
            BetStatus::Won => "WON",
            BetStatus::Lost => "LOST",
            BetStatus::Draw => "DRAW",
            BetStatus::Void => "VOID",
        }
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BetStatus::Pending),
            "WON" => Ok(BetStatus::Won),
            "LOST" => Ok(BetStatus::Lost),
            "DRAW" => Ok(BetStatus::Draw),
            "VOID" => Ok(BetStatus::Void),
            _ => Err(LedgerError::Validation(format!("unknown bet status: {s}"))),
        }
    }
}

/// Audit transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    BetWin,
    BetLoss,
    Refund,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdraw => "WITHDRAW",
            TransactionKind::BetWin => "BET_WIN",
            TransactionKind::BetLoss => "BET_LOSS",
            TransactionKind::Refund => "REFUND",
            TransactionKind::Adjustment => "ADJUSTMENT",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TransactionKind::Deposit),
            "WITHDRAW" => Ok(TransactionKind::Withdraw),
            "BET_WIN" => Ok(TransactionKind::BetWin),
            "BET_LOSS" => Ok(TransactionKind::BetLoss),
            "REFUND" => Ok(TransactionKind::Refund),
            "ADJUSTMENT" => Ok(TransactionKind::Adjustment),
            _ => Err(LedgerError::Validation(format!("unknown transaction type: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A customer (or operator) ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    /// Dense display id, assigned on first appearance and never reused.
    pub short_id: u32,
    pub role: Role,
    pub credit: i64,
    /// Funds reserved against the worst outcome of the current round.
    pub credit_hold: i64,
    pub red_net: i64,
    pub blue_net: i64,
    /// odds index → bets placed in that epoch. Transient, never persisted.
    #[serde(skip)]
    pub odds_bet_counts: HashMap<usize, u32>,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#u{} [{}] credit={} hold={} available={} net(red={} blue={})",
            self.short_id,
            self.role,
            self.credit,
            self.credit_hold,
            self.available(),
            self.red_net,
            self.blue_net,
        )
    }
}

impl Account {
    pub fn new(user_id: impl Into<String>, short_id: u32, credit: i64) -> Self {
        Self {
            user_id: user_id.into(),
            short_id,
            role: Role::Customer,
            credit,
            credit_hold: 0,
            red_net: 0,
            blue_net: 0,
            odds_bet_counts: HashMap::new(),
        }
    }

    /// Credit not reserved by the current hold.
    pub fn available(&self) -> i64 {
        self.credit - self.credit_hold
    }

    /// Bets this account placed against the given odds epoch.
    pub fn bets_in_epoch(&self, odds_index: usize) -> u32 {
        self.odds_bet_counts.get(&odds_index).copied().unwrap_or(0)
    }

    /// Discharge all round-scoped exposure.
    pub fn clear_exposure(&mut self) {
        self.credit_hold = 0;
        self.red_net = 0;
        self.blue_net = 0;
    }

    /// Discharge exposure and forget per-epoch bet counts.
    pub fn reset_round(&mut self) {
        self.clear_exposure();
        self.odds_bet_counts.clear();
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// Scaled-by-10 loss/win ratios for one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideRatios {
    pub loss: i64,
    pub win: i64,
}

impl fmt::Display for SideRatios {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loss {} / win {}", display_ratio(self.loss), display_ratio(self.win))
    }
}

/// One pricing epoch inside a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Odds {
    pub red: SideRatios,
    pub blue: SideRatios,
    pub max_bet: i64,
    pub min_bet: i64,
    /// Bets per user in this epoch, 0 = unlimited.
    pub user_limit: u32,
    pub vig: i64,
    pub status: OddsStatus,
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] RED({}) BLUE({}) max={} min={} limit={} vig={}",
            self.status, self.red, self.blue, self.max_bet, self.min_bet, self.user_limit, self.vig,
        )
    }
}

impl Odds {
    pub fn ratios(&self, side: Side) -> SideRatios {
        match side {
            Side::Red => self.red,
            Side::Blue => self.blue,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == OddsStatus::Open
    }
}

/// Render a scaled ratio the way an operator typed it (25 → 2.5, 20 → 2).
pub fn display_ratio(scaled: i64) -> Decimal {
    Decimal::new(scaled, 1).normalize()
}

// ---------------------------------------------------------------------------
// Bet & Round
// ---------------------------------------------------------------------------

/// A single wager. Everything but `status` is fixed at placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub user_id: String,
    /// Index of the odds epoch active at placement.
    pub odds_index: usize,
    pub side: Side,
    pub amount: i64,
    pub win_amount: i64,
    pub loss_amount: i64,
    /// Placement time in unix milliseconds; 0 for bets rebuilt by reversal.
    pub timestamp: i64,
    pub status: BetStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: u64,
    pub odds: Vec<Odds>,
    /// Index into `odds` of the epoch currently taking bets.
    pub current_odds: Option<usize>,
    pub bets: Vec<Bet>,
    pub status: RoundStatus,
    /// Creation time in unix milliseconds.
    pub created_at: i64,
    pub result: Option<RoundResult>,
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#r{} [{}] odds={} bets={}",
            self.id,
            self.status,
            self.odds.len(),
            self.bets.len(),
        )?;
        if let Some(result) = self.result {
            write!(f, " result={result}")?;
        }
        Ok(())
    }
}

impl Round {
    pub fn new(id: u64, created_at: i64) -> Self {
        Self {
            id,
            odds: Vec::new(),
            current_odds: None,
            bets: Vec::new(),
            status: RoundStatus::Open,
            created_at,
            result: None,
        }
    }

    /// The epoch currently taking bets, if any.
    pub fn open_odds(&self) -> Option<(usize, &Odds)> {
        let index = self.current_odds?;
        self.odds
            .get(index)
            .filter(|odds| odds.is_open())
            .map(|odds| (index, odds))
    }

    /// Audit reference used on transactions for this round.
    pub fn reference(&self) -> String {
        round_reference(self.id)
    }
}

pub fn round_reference(round_id: u64) -> String {
    format!("#r{round_id}")
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// Money effect of a prospective bet on one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetImpact {
    pub win_amount: i64,
    pub loss_amount: i64,
    pub new_red_net: i64,
    pub new_blue_net: i64,
    pub new_hold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub round_id: u64,
    pub result: RoundResult,
    pub total_bets: usize,
    pub total_payout: i64,
    /// House P&L, negative when the house paid out more than it collected.
    pub casino_profit: i64,
}

impl fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#r{} settled {}: bets={} payout={} house={:+}",
            self.round_id, self.result, self.total_bets, self.total_payout, self.casino_profit,
        )
    }
}

/// An audit transaction as read back from durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    pub amount: i64,
    pub kind: TransactionKind,
    pub reference: String,
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Every way a ledger operation can be refused. All of them are raised
/// before the operation writes anything.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Insufficient credit: need {required}, have {available}")]
    InsufficientCredit { required: i64, available: i64 },

    #[error("Bet limit reached: {limit} per odds")]
    LimitExceeded { limit: u32 },

    #[error("No open market: {0}")]
    NoOpenMarket(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
