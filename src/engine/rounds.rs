//! Round and odds lifecycle.
//!
//! Round: OPEN → CLOSED → WAITING_PAYMENT → COMPLETED.
//! Odds epoch: OPEN → CLOSED → CANCELLED. At most one epoch is OPEN.

use tracing::info;

use super::ledger::Ledger;
use super::odds::OddsSpec;
use crate::types::{LedgerError, LedgerResult, Odds, OddsStatus, Round, RoundResult, RoundStatus};

impl Ledger {
    /// Start a new round. Every account's hold, nets and bet counts reset.
    pub fn open_round(&mut self) -> LedgerResult<&Round> {
        if let Some(round) = &self.current_round {
            return Err(LedgerError::Conflict(format!(
                "round #r{} is still {}; settle it first",
                round.id, round.status
            )));
        }

        self.reset_all_exposure();
        self.last_round_id += 1;
        let round = Round::new(self.last_round_id, chrono::Utc::now().timestamp_millis());
        self.queue.save_round(&round);
        info!(round_id = round.id, "Round opened");
        Ok(&*self.current_round.insert(round))
    }

    /// Stop taking bets for the round, force-closing an open epoch.
    pub fn close_round(&mut self) -> LedgerResult<&Round> {
        let round = self
            .current_round
            .as_mut()
            .filter(|r| r.status == RoundStatus::Open)
            .ok_or_else(|| LedgerError::InvalidState("no OPEN round to close".into()))?;

        if let Some(index) = round.current_odds.take() {
            if let Some(odds) = round.odds.get_mut(index).filter(|o| o.is_open()) {
                odds.status = OddsStatus::Closed;
                self.queue.save_odds(round.id, index, odds);
            }
        }
        round.status = RoundStatus::Closed;
        self.queue.save_round(round);
        info!(round_id = round.id, bets = round.bets.len(), "Round closed");
        Ok(&*round)
    }

    /// Open a new pricing epoch. The previous epoch must be closed.
    pub fn open_odds(&mut self, spec: &OddsSpec) -> LedgerResult<(usize, &Odds)> {
        let round = self
            .current_round
            .as_mut()
            .filter(|r| r.status == RoundStatus::Open)
            .ok_or_else(|| LedgerError::InvalidState("odds can only be opened in an OPEN round".into()))?;
        if let Some((index, _)) = round.open_odds() {
            return Err(LedgerError::Conflict(format!(
                "odds #o{} are still open; close them first",
                index + 1
            )));
        }

        let odds = spec.derive(&self.odds_defaults)?;
        let index = round.odds.len();
        self.queue.save_odds(round.id, index, &odds);
        info!(round_id = round.id, index, odds = %odds, "Odds opened");
        round.odds.push(odds);
        round.current_odds = Some(index);
        Ok((index, &round.odds[index]))
    }

    /// Stop taking bets on the current epoch. The round stays OPEN.
    pub fn close_odds(&mut self) -> LedgerResult<usize> {
        let round = self
            .current_round
            .as_mut()
            .ok_or_else(|| LedgerError::NoOpenMarket("no round in progress".into()))?;
        let index = round
            .open_odds()
            .map(|(i, _)| i)
            .ok_or_else(|| LedgerError::NoOpenMarket("no open odds".into()))?;

        round.odds[index].status = OddsStatus::Closed;
        round.current_odds = None;
        self.queue.save_odds(round.id, index, &round.odds[index]);
        info!(round_id = round.id, index, "Odds closed");
        Ok(index)
    }

    /// Declare the outcome of a CLOSED round.
    pub fn set_result(&mut self, result: RoundResult) -> LedgerResult<&Round> {
        let round = self
            .current_round
            .as_mut()
            .filter(|r| r.status == RoundStatus::Closed)
            .ok_or_else(|| LedgerError::InvalidState("the round must be CLOSED first".into()))?;

        round.result = Some(result);
        round.status = RoundStatus::WaitingPayment;
        self.queue.save_round(round);
        info!(round_id = round.id, result = %result, "Result declared");
        Ok(&*round)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
