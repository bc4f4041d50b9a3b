//! Settlement reversal.
//!
//! Undoes a completed settlement from its durable record: each WON bet
//! gives back its payout, each LOST bet is refunded, and the round comes
//! back CLOSED with its bets PENDING and no prices, ready for a new result.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use super::calculator::Exposure;
use super::ledger::Ledger;
use crate::storage::queue::WriteOp;
use crate::storage::BetRow;
use crate::types::{
    round_reference, Bet, BetStatus, LedgerError, LedgerResult, Round, RoundResult, RoundStatus,
    TransactionKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReverseRoundResult {
    pub round_id: u64,
    pub old_result: Option<RoundResult>,
    pub reversed_bets: usize,
}

/// Per-account effect of a reversal, computed before anything is applied.
#[derive(Debug, Default)]
struct Rollback {
    credit_delta: i64,
    exposure: Exposure,
}

fn storage_error(e: anyhow::Error) -> LedgerError {
    LedgerError::Storage(format!("{e:#}"))
}

impl Ledger {
    /// Reverse the settlement of `round_id`, or of the latest completed round.
    ///
    /// Durable reads happen first; the in-memory ledger is only changed once
    /// every check has passed.
    pub async fn reverse_round(&mut self, round_id: Option<u64>) -> LedgerResult<ReverseRoundResult> {
        if let Some(current) = &self.current_round {
            let hint = if current.status == RoundStatus::Open {
                "close it first"
            } else {
                "settle it first"
            };
            return Err(LedgerError::Conflict(format!(
                "round #r{} is {}; {hint}",
                current.id, current.status
            )));
        }

        // the settlement being reversed may still be in the write queue
        self.queue.flush().await?;
        let row = self
            .gateway
            .find_round_for_reversal(round_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| match round_id {
                Some(id) => LedgerError::NotFound(format!("round #r{id}")),
                None => LedgerError::NotFound("no completed round to reverse".into()),
            })?;
        if row.status != RoundStatus::Completed {
            return Err(LedgerError::InvalidState(format!(
                "round #r{} is {}, not COMPLETED",
                row.id, row.status
            )));
        }
        let settled = self
            .gateway
            .load_settled_bets(row.id)
            .await
            .map_err(storage_error)?;

        let mut rollbacks: HashMap<&str, Rollback> = HashMap::new();
        for bet in &settled {
            let entry = rollbacks.entry(bet.user_id.as_str()).or_default();
            entry.credit_delta += match bet.status {
                BetStatus::Won => -bet.win_amount,
                BetStatus::Lost => bet.loss_amount,
                _ => 0,
            };
            entry.exposure = entry.exposure.apply(bet.side, bet.win_amount, bet.loss_amount);
        }
        for (user_id, rollback) in &rollbacks {
            match self.accounts.get(*user_id) {
                Some(account) => Self::check_covered(
                    account,
                    account.credit + rollback.credit_delta,
                    rollback.exposure.hold(),
                )?,
                None => warn!(user_id, round_id = row.id, "Reversal skips unknown account"),
            }
        }

        // Apply.
        let reference = round_reference(row.id);
        self.reset_all_exposure();
        for bet in &settled {
            let (amount, kind) = match bet.status {
                BetStatus::Won => (-bet.win_amount, TransactionKind::Adjustment),
                BetStatus::Lost => (bet.loss_amount, TransactionKind::Refund),
                _ => continue,
            };
            if self.accounts.contains_key(&bet.user_id) {
                self.queue.log_transaction(&bet.user_id, amount, kind, &reference);
            }
        }
        for (user_id, rollback) in rollbacks {
            if let Some(account) = self.accounts.get_mut(user_id) {
                account.credit += rollback.credit_delta;
                account.red_net = rollback.exposure.red_net;
                account.blue_net = rollback.exposure.blue_net;
                account.credit_hold = rollback.exposure.hold();
                self.queue.save_account(account);
            }
        }
        self.queue.enqueue(WriteOp::MarkBetsPending { round_id: row.id });
        self.queue.enqueue(WriteOp::ReopenRound { round_id: row.id });

        let reversed_bets = settled.len();
        let mut round = Round::new(row.id, row.created_at);
        round.status = RoundStatus::Closed;
        round.bets = settled.into_iter().map(restored_bet).collect();
        self.history.retain(|r| r.id != row.id);
        self.current_round = Some(round);

        info!(
            round_id = row.id,
            old_result = ?row.result,
            reversed_bets,
            "Settlement reversed"
        );
        Ok(ReverseRoundResult {
            round_id: row.id,
            old_result: row.result,
            reversed_bets,
        })
    }
}

fn restored_bet(row: BetRow) -> Bet {
    let mut bet = row.into_bet();
    bet.status = BetStatus::Pending;
    bet.timestamp = 0;
    bet
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
