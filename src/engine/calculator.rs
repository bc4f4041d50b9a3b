//! Exposure calculator.
//!
//! The single source of truth for money math. Placement, cancellation
//! replay and reversal all funnel through here so they share the same
//! rounding: payouts round down, collections round up.

use crate::types::{Account, Bet, BetImpact, BetStatus, LedgerError, LedgerResult, Odds, Side};

/// Running per-outcome P&L of one account and the hold it implies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exposure {
    pub red_net: i64,
    pub blue_net: i64,
}

impl Exposure {
    pub fn of(account: &Account) -> Self {
        Self {
            red_net: account.red_net,
            blue_net: account.blue_net,
        }
    }

    /// Add one bet: the backed side gains `win`, the other side loses `loss`.
    pub fn apply(self, side: Side, win_amount: i64, loss_amount: i64) -> Self {
        match side {
            Side::Red => Self {
                red_net: self.red_net + win_amount,
                blue_net: self.blue_net - loss_amount,
            },
            Side::Blue => Self {
                red_net: self.red_net - loss_amount,
                blue_net: self.blue_net + win_amount,
            },
        }
    }

    /// Hold sized to the worse of the two outcomes.
    pub fn hold(&self) -> i64 {
        (-self.red_net.min(self.blue_net)).max(0)
    }

    /// Rebuild exposure from scratch by replaying bets in order.
    /// Only PENDING bets count.
    pub fn replay<'a>(bets: impl IntoIterator<Item = &'a Bet>) -> Self {
        bets.into_iter()
            .filter(|bet| bet.status == BetStatus::Pending)
            .fold(Self::default(), |exposure, bet| {
                exposure.apply(bet.side, bet.win_amount, bet.loss_amount)
            })
    }
}

/// Win and loss amounts of a stake at the given odds.
///
/// `win = floor(amount × win / 100)`, `loss = ceil(amount × loss / 100)`.
pub fn stake_amounts(side: Side, amount: i64, odds: &Odds) -> (i64, i64) {
    let ratios = odds.ratios(side);
    let win_amount = (amount * ratios.win).div_euclid(100);
    let loss_amount = -(-(amount * ratios.loss)).div_euclid(100);
    (win_amount, loss_amount)
}

/// Compute the effect of a bet on an account without applying it.
///
/// Fails with `InsufficientCredit` when the new hold would exceed the
/// account's credit; the caller must then leave the account untouched.
pub fn impact(account: &Account, side: Side, amount: i64, odds: &Odds) -> LedgerResult<BetImpact> {
    let (win_amount, loss_amount) = stake_amounts(side, amount, odds);
    let next = Exposure::of(account).apply(side, win_amount, loss_amount);
    let new_hold = next.hold();

    if account.credit - new_hold < 0 {
        return Err(LedgerError::InsufficientCredit {
            required: new_hold,
            available: account.credit,
        });
    }

    Ok(BetImpact {
        win_amount,
        loss_amount,
        new_red_net: next.red_net,
        new_blue_net: next.blue_net,
        new_hold,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
