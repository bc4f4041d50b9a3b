//! Write-behind persistence queue.
//!
//! Ledger operations enqueue [`WriteOp`]s after their in-memory mutation
//! is committed and return immediately. A single background worker drains
//! the queue in FIFO order against the gateway. Failed writes are logged
//! and skipped; they never reach the caller of the ledger operation.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AccountRow, PersistenceGateway, RoundRow, TransactionEntry};
use crate::types::{Account, Bet, LedgerError, LedgerResult, Odds, Round, RoundResult, TransactionKind};

/// One durable write, owned so it can outlive the mutation that produced it.
#[derive(Debug)]
pub enum WriteOp {
    SaveAccount(AccountRow),
    SaveRound(RoundRow),
    SaveOdds {
        round_id: u64,
        odds_index: usize,
        odds: Odds,
    },
    SaveBet {
        round_id: u64,
        bet: Bet,
    },
    VoidBets {
        round_id: u64,
        odds_index: usize,
    },
    SettleBets {
        round_id: u64,
        result: RoundResult,
    },
    LogTransaction(TransactionEntry),
    MarkBetsPending {
        round_id: u64,
    },
    ReopenRound {
        round_id: u64,
    },
    ClearBettingData,
    /// Barrier: acknowledged once every earlier op has been applied.
    Flush(oneshot::Sender<()>),
}

impl WriteOp {
    fn label(&self) -> &'static str {
        match self {
            WriteOp::SaveAccount(_) => "save_account",
            WriteOp::SaveRound(_) => "save_round",
            WriteOp::SaveOdds { .. } => "save_odds",
            WriteOp::SaveBet { .. } => "save_bet",
            WriteOp::VoidBets { .. } => "void_bets",
            WriteOp::SettleBets { .. } => "settle_bets",
            WriteOp::LogTransaction(_) => "log_transaction",
            WriteOp::MarkBetsPending { .. } => "mark_bets_pending",
            WriteOp::ReopenRound { .. } => "reopen_round",
            WriteOp::ClearBettingData => "clear_betting_data",
            WriteOp::Flush(_) => "flush",
        }
    }
}

/// Handle for scheduling durable writes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    sender: mpsc::UnboundedSender<WriteOp>,
}

impl PersistenceQueue {
    /// Create the queue and spawn its worker on the current runtime.
    pub fn spawn(gateway: Arc<dyn PersistenceGateway>) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = Self::channel();
        let handle = tokio::spawn(persistence_worker(gateway, receiver));
        (queue, handle)
    }

    /// Create the queue without a worker; the caller owns the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WriteOp>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Schedule a write. Never blocks.
    pub fn enqueue(&self, op: WriteOp) {
        if let Err(err) = self.sender.send(op) {
            warn!(op = err.0.label(), "Persistence queue closed, write dropped");
        }
    }

    /// Wait until every write enqueued so far has been applied.
    pub async fn flush(&self) -> LedgerResult<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(WriteOp::Flush(ack))
            .map_err(|_| LedgerError::Storage("persistence worker stopped".into()))?;
        done.await
            .map_err(|_| LedgerError::Storage("persistence worker stopped".into()))
    }

    pub fn save_account(&self, account: &Account) {
        self.enqueue(WriteOp::SaveAccount(AccountRow::from(account)));
    }

    pub fn save_round(&self, round: &Round) {
        self.enqueue(WriteOp::SaveRound(RoundRow::from(round)));
    }

    pub fn save_odds(&self, round_id: u64, odds_index: usize, odds: &Odds) {
        self.enqueue(WriteOp::SaveOdds {
            round_id,
            odds_index,
            odds: odds.clone(),
        });
    }

    pub fn save_bet(&self, round_id: u64, bet: &Bet) {
        self.enqueue(WriteOp::SaveBet {
            round_id,
            bet: bet.clone(),
        });
    }

    pub fn log_transaction(&self, user_id: &str, amount: i64, kind: TransactionKind, reference: &str) {
        self.enqueue(WriteOp::LogTransaction(TransactionEntry {
            user_id: user_id.to_string(),
            amount,
            kind,
            reference: reference.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }));
    }
}

/// Apply one write to the gateway.
async fn apply(gateway: &dyn PersistenceGateway, op: WriteOp) -> Result<()> {
    match op {
        WriteOp::SaveAccount(row) => gateway.save_account(&row).await,
        WriteOp::SaveRound(row) => gateway.save_round(&row).await,
        WriteOp::SaveOdds {
            round_id,
            odds_index,
            odds,
        } => gateway.save_odds(round_id, odds_index, &odds).await,
        WriteOp::SaveBet { round_id, bet } => gateway.save_bet(round_id, &bet).await,
        WriteOp::VoidBets {
            round_id,
            odds_index,
        } => gateway.void_bets(round_id, odds_index).await,
        WriteOp::SettleBets { round_id, result } => gateway.settle_bets_bulk(round_id, result).await,
        WriteOp::LogTransaction(entry) => gateway.log_transaction(&entry).await,
        WriteOp::MarkBetsPending { round_id } => gateway.mark_bets_pending(round_id).await,
        WriteOp::ReopenRound { round_id } => gateway.reopen_round_for_reversal(round_id).await,
        WriteOp::ClearBettingData => gateway.clear_betting_data().await,
        WriteOp::Flush(ack) => {
            let _ = ack.send(());
            Ok(())
        }
    }
}

/// Background worker that drains the queue in order.
async fn persistence_worker(
    gateway: Arc<dyn PersistenceGateway>,
    mut receiver: mpsc::UnboundedReceiver<WriteOp>,
) {
    info!("Persistence worker started");

    while let Some(op) = receiver.recv().await {
        let label = op.label();
        match apply(gateway.as_ref(), op).await {
            Ok(()) => debug!(op = label, "Write applied"),
            Err(e) => error!(op = label, error = %e, "Durable write failed"),
        }
    }

    info!("Persistence worker shutting down");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
