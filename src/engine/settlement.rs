//! Round settlement.

use std::collections::BTreeSet;

use tracing::{info, warn};

use super::ledger::Ledger;
use crate::storage::queue::WriteOp;
use crate::types::{
    BetStatus, LedgerError, LedgerResult, RoundStatus, SettlementReport, TransactionKind,
};

impl Ledger {
    /// Resolve every non-void bet of the round against its declared result,
    /// move the money, discharge all round exposure and archive the round.
    pub fn settle_round(&mut self) -> LedgerResult<SettlementReport> {
        let round = self
            .current_round
            .as_ref()
            .filter(|r| r.status == RoundStatus::WaitingPayment)
            .ok_or_else(|| LedgerError::InvalidState("no round is WAITING_PAYMENT".into()))?;
        let result = round
            .result
            .ok_or_else(|| LedgerError::InvalidState("no result declared".into()))?;

        let Some(mut round) = self.current_round.take() else {
            return Err(LedgerError::InvalidState("no round is WAITING_PAYMENT".into()));
        };
        let reference = round.reference();
        let mut total_bets = 0;
        let mut total_payout = 0;
        let mut casino_profit = 0;

        for bet in round.bets.iter_mut().filter(|b| b.status != BetStatus::Void) {
            total_bets += 1;
            bet.status = match result.winner() {
                None => BetStatus::Draw,
                Some(side) if side == bet.side => BetStatus::Won,
                Some(_) => BetStatus::Lost,
            };
            let Some(account) = self.accounts.get_mut(&bet.user_id) else {
                warn!(user_id = %bet.user_id, round_id = round.id, "Settled bet has no account");
                continue;
            };
            match bet.status {
                BetStatus::Won => {
                    account.credit += bet.win_amount;
                    total_payout += bet.win_amount;
                    casino_profit -= bet.win_amount;
                    self.queue
                        .log_transaction(&bet.user_id, bet.win_amount, TransactionKind::BetWin, &reference);
                }
                BetStatus::Lost => {
                    account.credit -= bet.loss_amount;
                    casino_profit += bet.loss_amount;
                    self.queue
                        .log_transaction(&bet.user_id, -bet.loss_amount, TransactionKind::BetLoss, &reference);
                }
                _ => {}
            }
        }

        let participants: BTreeSet<&str> = round.bets.iter().map(|b| b.user_id.as_str()).collect();
        for user_id in participants {
            if let Some(account) = self.accounts.get_mut(user_id) {
                account.clear_exposure();
                self.queue.save_account(account);
            }
        }

        self.queue.enqueue(WriteOp::SettleBets {
            round_id: round.id,
            result,
        });
        round.status = RoundStatus::Completed;
        self.queue.save_round(&round);

        let report = SettlementReport {
            round_id: round.id,
            result,
            total_bets,
            total_payout,
            casino_profit,
        };
        info!(report = %report, "Round settled");
        self.history.push(round);
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
