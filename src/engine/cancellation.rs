//! Odds cancellation ("void an epoch").
//!
//! Voiding an epoch retroactively removes bets from each affected
//! account's exposure. Hold and nets are rebuilt from scratch by replaying
//! the account's remaining pending bets in placement order, never by
//! subtracting the voided ones.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use super::calculator::{self, Exposure};
use super::ledger::Ledger;
use crate::storage::queue::WriteOp;
use crate::types::{BetStatus, LedgerError, LedgerResult, OddsStatus, Round};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOddsResult {
    pub round_id: u64,
    pub odds_index: usize,
    pub voided_bets: usize,
    pub affected_accounts: usize,
}

/// Exposure of one account after replaying its pending bets, skipping
/// `voided` and any epoch already cancelled.
///
/// Only the end state is checked for coverage, so the order of the
/// remaining bets cannot make the replay fail.
fn replay_account(round: &Round, user_id: &str, voided: usize) -> Exposure {
    round
        .bets
        .iter()
        .filter(|b| b.user_id == user_id && b.status == BetStatus::Pending && b.odds_index != voided)
        .filter_map(|bet| {
            let odds = round.odds.get(bet.odds_index)?;
            (odds.status != OddsStatus::Cancelled).then_some((bet, odds))
        })
        .fold(Exposure::default(), |exposure, (bet, odds)| {
            let (win_amount, loss_amount) = calculator::stake_amounts(bet.side, bet.amount, odds);
            exposure.apply(bet.side, win_amount, loss_amount)
        })
}

impl Ledger {
    /// Cancel an odds epoch: the given index, or the most recently CLOSED one.
    pub fn cancel_odds(&mut self, target: Option<usize>) -> LedgerResult<CancelOddsResult> {
        let round = self
            .current_round
            .as_ref()
            .ok_or_else(|| LedgerError::NoOpenMarket("no round in progress".into()))?;

        let odds_index = match target {
            None => round
                .odds
                .iter()
                .rposition(|o| o.status == OddsStatus::Closed)
                .ok_or_else(|| LedgerError::NotFound("no CLOSED odds to cancel".into()))?,
            Some(index) => {
                let odds = round
                    .odds
                    .get(index)
                    .ok_or_else(|| LedgerError::NotFound(format!("odds #o{}", index + 1)))?;
                match odds.status {
                    OddsStatus::Open => {
                        return Err(LedgerError::InvalidState(format!(
                            "odds #o{} are still open; close them first",
                            index + 1
                        )))
                    }
                    OddsStatus::Cancelled => {
                        return Err(LedgerError::InvalidState(format!(
                            "odds #o{} are already cancelled",
                            index + 1
                        )))
                    }
                    OddsStatus::Closed => index,
                }
            }
        };

        // Compute every affected account's new exposure before touching anything.
        let affected: BTreeSet<&str> = round
            .bets
            .iter()
            .filter(|b| b.odds_index == odds_index)
            .map(|b| b.user_id.as_str())
            .collect();
        let mut rebuilt = Vec::with_capacity(affected.len());
        for user_id in &affected {
            if let Some(account) = self.accounts.get(*user_id) {
                let exposure = replay_account(round, user_id, odds_index);
                Self::check_covered(account, account.credit, exposure.hold())?;
                rebuilt.push((user_id.to_string(), exposure));
            }
        }
        let affected_accounts = affected.len();

        let Some(round) = self.current_round.as_mut() else {
            return Err(LedgerError::NoOpenMarket("no round in progress".into()));
        };
        round.odds[odds_index].status = OddsStatus::Cancelled;
        if round.current_odds == Some(odds_index) {
            round.current_odds = None;
        }
        let mut voided_bets = 0;
        for bet in round.bets.iter_mut().filter(|b| b.odds_index == odds_index) {
            bet.status = BetStatus::Void;
            voided_bets += 1;
        }
        self.queue.save_odds(round.id, odds_index, &round.odds[odds_index]);
        self.queue.enqueue(WriteOp::VoidBets {
            round_id: round.id,
            odds_index,
        });

        for (user_id, exposure) in rebuilt {
            if let Some(account) = self.accounts.get_mut(&user_id) {
                account.red_net = exposure.red_net;
                account.blue_net = exposure.blue_net;
                account.credit_hold = exposure.hold();
                self.queue.save_account(account);
            }
        }

        info!(round_id = round.id, odds_index, voided_bets, affected_accounts, "Odds cancelled");
        Ok(CancelOddsResult {
            round_id: round.id,
            odds_index,
            voided_bets,
            affected_accounts,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
