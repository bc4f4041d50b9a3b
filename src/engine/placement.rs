//! Bet placement.

use serde::Serialize;
use tracing::{info, warn};

use super::calculator;
use super::ledger::Ledger;
use crate::types::{Bet, BetImpact, BetStatus, LedgerError, LedgerResult, RoundStatus, Side};

/// Outcome of an accepted bet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceBetResult {
    pub round_id: u64,
    pub odds_index: usize,
    pub impact: BetImpact,
    pub side: Side,
    /// Amount actually staked, after capping to the epoch maximum.
    pub amount: i64,
    pub requested: i64,
    /// Credit left after the new hold.
    pub available_credit: i64,
    /// Set when the stake was capped to `max_bet`.
    pub capped: bool,
}

impl Ledger {
    /// Place one bet against the current open odds.
    ///
    /// Every check runs against the account as it would be after the bet;
    /// nothing is written unless all of them pass. A first-time bettor is
    /// registered only when the bet is accepted.
    pub fn place_bet(&mut self, user_id: &str, side: Side, requested: i64) -> LedgerResult<PlaceBetResult> {
        let round = self
            .current_round
            .as_ref()
            .ok_or_else(|| LedgerError::NoOpenMarket("no round in progress".into()))?;
        if round.status != RoundStatus::Open {
            return Err(LedgerError::NoOpenMarket("betting is closed for this round".into()));
        }
        let (odds_index, odds) = round
            .open_odds()
            .map(|(i, odds)| (i, odds.clone()))
            .ok_or_else(|| LedgerError::NoOpenMarket("no open odds".into()))?;
        let round_id = round.id;

        let prospective;
        let account = match self.accounts.get(user_id) {
            Some(account) => account,
            None => {
                prospective = self.blank_account(user_id);
                &prospective
            }
        };

        let placed = account.bets_in_epoch(odds_index);
        if odds.user_limit > 0 && placed >= odds.user_limit {
            return Err(LedgerError::LimitExceeded { limit: odds.user_limit });
        }
        if requested < odds.min_bet {
            return Err(LedgerError::Validation(format!(
                "minimum bet is {}, got {requested}",
                odds.min_bet
            )));
        }
        let amount = requested.min(odds.max_bet);
        let capped = amount < requested;

        let impact = calculator::impact(account, side, amount, &odds)?;

        // Accepted: commit to memory before anything is scheduled.
        self.ensure_account(user_id);
        let Some(account) = self.accounts.get_mut(user_id) else {
            return Err(LedgerError::NotFound(format!("account {user_id}")));
        };
        account.red_net = impact.new_red_net;
        account.blue_net = impact.new_blue_net;
        account.credit_hold = impact.new_hold;
        *account.odds_bet_counts.entry(odds_index).or_insert(0) += 1;
        let available_credit = account.available();

        let bet = Bet {
            user_id: user_id.to_string(),
            odds_index,
            side,
            amount,
            win_amount: impact.win_amount,
            loss_amount: impact.loss_amount,
            timestamp: chrono::Utc::now().timestamp_millis(),
            status: BetStatus::Pending,
        };
        self.queue.save_bet(round_id, &bet);
        self.queue.save_account(account);
        if let Some(round) = self.current_round.as_mut() {
            round.bets.push(bet);
        }

        if capped {
            warn!(user_id, requested, amount, "Stake capped to max bet");
        }
        info!(
            user_id,
            round_id,
            odds_index,
            side = %side,
            amount,
            hold = impact.new_hold,
            "Bet placed"
        );

        Ok(PlaceBetResult {
            round_id,
            odds_index,
            impact,
            side,
            amount,
            requested,
            available_credit,
            capped,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ledger::testing::{drain, ledger};
    use crate::engine::odds::OddsSpec;
    use crate::storage::queue::WriteOp;

    fn open_market(ledger: &mut Ledger, spec: OddsSpec) {
        ledger.open_round().unwrap();
        ledger.open_odds(&spec).unwrap();
    }

    #[test]
    fn test_red_bet_scenario() {
        let (mut ledger, _rx) = ledger();
        open_market(&mut ledger, OddsSpec::new(Side::Red, 20, 18));

        let result = ledger.place_bet("alice", Side::Red, 100).unwrap();
        assert_eq!(result.impact.win_amount, 18);
        assert_eq!(result.impact.loss_amount, 20);
        assert_eq!(result.available_credit, 980);
        assert!(!result.capped);

        let alice = ledger.account("alice").unwrap();
        assert_eq!((alice.short_id, alice.credit, alice.credit_hold), (1, 1000, 20));
        assert_eq!(alice.bets_in_epoch(0), 1);
        assert_eq!(ledger.current_round().unwrap().bets.len(), 1);
    }

    #[test]
    fn test_hedged_bets_combine_hold() {
        let (mut ledger, _rx) = ledger();
        open_market(&mut ledger, OddsSpec::new(Side::Red, 20, 18));

        ledger.place_bet("alice", Side::Red, 100).unwrap();
        let second = ledger.place_bet("alice", Side::Blue, 50).unwrap();
        assert_eq!(second.impact.new_red_net, -1);
        assert_eq!(second.impact.new_blue_net, -10);
        assert_eq!(second.impact.new_hold, 10);
        assert_eq!(ledger.account("alice").unwrap().credit_hold, 10);
    }

    #[test]
    fn test_user_limit_enforced() {
        let (mut ledger, _rx) = ledger();
        open_market(&mut ledger, OddsSpec::new(Side::Red, 20, 18).with_user_limit(2));

        ledger.place_bet("alice", Side::Red, 100).unwrap();
        ledger.place_bet("alice", Side::Red, 100).unwrap();
        let err = ledger.place_bet("alice", Side::Red, 100).unwrap_err();
        assert_eq!(err, LedgerError::LimitExceeded { limit: 2 });
        assert_eq!(ledger.account("alice").unwrap().credit_hold, 40);

        // the quota is per epoch
        ledger.close_odds().unwrap();
        ledger.open_odds(&OddsSpec::new(Side::Red, 20, 18)).unwrap();
        assert!(ledger.place_bet("alice", Side::Red, 100).is_ok());
    }

    #[test]
    fn test_unlimited_when_limit_zero() {
        let (mut ledger, _rx) = ledger();
        open_market(&mut ledger, OddsSpec::new(Side::Red, 20, 18).with_user_limit(0));
        for _ in 0..5 {
            ledger.place_bet("alice", Side::Red, 20).unwrap();
        }
    }

    #[test]
    fn test_min_bet_rejected_and_max_bet_capped() {
        let (mut ledger, _rx) = ledger();
        open_market(
            &mut ledger,
            OddsSpec::new(Side::Red, 10, 10).with_max_bet(500).with_min_bet(50),
        );

        assert!(matches!(
            ledger.place_bet("alice", Side::Red, 49),
            Err(LedgerError::Validation(_))
        ));

        let result = ledger.place_bet("alice", Side::Red, 900).unwrap();
        assert!(result.capped);
        assert_eq!((result.requested, result.amount), (900, 500));
        assert_eq!(ledger.current_round().unwrap().bets[0].amount, 500);
    }

    #[test]
    fn test_rejected_bet_leaves_no_trace() {
        let (mut ledger, mut rx) = ledger();
        open_market(&mut ledger, OddsSpec::new(Side::Red, 20, 18));
        drain(&mut rx);

        // 1000 credit cannot cover a 6000 stake losing 1200
        let err = ledger.place_bet("alice", Side::Red, 6000).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientCredit { required: 1200, available: 1000 });
        assert!(ledger.account("alice").is_none());
        assert!(ledger.current_round().unwrap().bets.is_empty());
        assert!(drain(&mut rx).is_empty());

        // the short id was not consumed
        assert_eq!(ledger.ensure_account("bob").short_id, 1);
    }

    #[test]
    fn test_no_open_market() {
        let (mut ledger, _rx) = ledger();
        assert!(matches!(
            ledger.place_bet("alice", Side::Red, 100),
            Err(LedgerError::NoOpenMarket(_))
        ));

        ledger.open_round().unwrap();
        assert!(matches!(
            ledger.place_bet("alice", Side::Red, 100),
            Err(LedgerError::NoOpenMarket(_))
        ));

        ledger.open_odds(&OddsSpec::new(Side::Red, 20, 18)).unwrap();
        ledger.close_odds().unwrap();
        assert!(matches!(
            ledger.place_bet("alice", Side::Red, 100),
            Err(LedgerError::NoOpenMarket(_))
        ));
    }

    #[test]
    fn test_accepted_bet_is_persisted() {
        let (mut ledger, mut rx) = ledger();
        open_market(&mut ledger, OddsSpec::new(Side::Red, 20, 18));
        drain(&mut rx);

        ledger.place_bet("alice", Side::Blue, 100).unwrap();
        let ops = drain(&mut rx);
        assert!(matches!(
            ops.as_slice(),
            [WriteOp::SaveAccount(_), WriteOp::SaveBet { round_id: 1, .. }, WriteOp::SaveAccount(_)]
        ));
    }

    #[test]
    fn test_credit_never_below_hold() {
        let (mut ledger, _rx) = ledger();
        open_market(&mut ledger, OddsSpec::new(Side::Blue, 50, 10).with_user_limit(0));
        for amount in [700, 300, 250, 20, 1000, 45] {
            let _ = ledger.place_bet("alice", Side::Blue, amount);
            let alice = ledger.account("alice").unwrap();
            assert!(alice.available() >= 0);
        }
    }
}
