//! Odds derivation.
//!
//! An operator quotes only the favorite's loss/win prices; the underdog's
//! ratios are derived (`underdog loss = favorite win + vig`,
//! `underdog win = favorite loss`). This module keeps that step pure so it
//! can be tested apart from any command parsing.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::config::OddsDefaults;
use crate::types::{LedgerError, LedgerResult, Odds, OddsStatus, Side, SideRatios};

/// Smallest and largest operator price, scaled by 10.
const MIN_RATIO: i64 = 1;
const MAX_RATIO: i64 = 990;

const MAX_BET_CEILING: i64 = 1_000_000;
const USER_LIMIT_CEILING: u32 = 100;
const VIG_CEILING: i64 = 1000;

/// An operator's odds declaration before derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OddsSpec {
    pub favorite: Side,
    /// Favorite's loss ratio, scaled by 10.
    pub loss: i64,
    /// Favorite's win ratio, scaled by 10.
    pub win: i64,
    pub max_bet: Option<i64>,
    pub user_limit: Option<u32>,
    pub min_bet: Option<i64>,
    pub vig: Option<i64>,
}

impl OddsSpec {
    pub fn new(favorite: Side, loss: i64, win: i64) -> Self {
        Self {
            favorite,
            loss,
            win,
            max_bet: None,
            user_limit: None,
            min_bet: None,
            vig: None,
        }
    }

    pub fn with_max_bet(mut self, max_bet: i64) -> Self {
        self.max_bet = Some(max_bet);
        self
    }

    pub fn with_user_limit(mut self, user_limit: u32) -> Self {
        self.user_limit = Some(user_limit);
        self
    }

    pub fn with_min_bet(mut self, min_bet: i64) -> Self {
        self.min_bet = Some(min_bet);
        self
    }

    pub fn with_vig(mut self, vig: i64) -> Self {
        self.vig = Some(vig);
        self
    }

    /// Convert an operator price ("2.5", "10") to its scaled integer form.
    ///
    /// Accepts 0.1–99 with at most one decimal place.
    pub fn ratio(text: &str) -> LedgerResult<i64> {
        let text = text.trim();
        if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(LedgerError::Validation(format!(
                "price must be a plain number, got {text:?}"
            )));
        }

        let value = Decimal::from_str(text)
            .map_err(|_| LedgerError::Validation(format!("price is not a number: {text:?}")))?;
        if value.scale() > 1 {
            return Err(LedgerError::Validation(format!(
                "price allows one decimal place, got {text}"
            )));
        }

        let scaled = (value * Decimal::TEN)
            .to_i64()
            .ok_or_else(|| LedgerError::Validation(format!("price out of range: {text}")))?;
        check_ratio("price", scaled)?;
        Ok(scaled)
    }

    /// Validate the declaration and build the full four-ratio odds record.
    pub fn derive(&self, defaults: &OddsDefaults) -> LedgerResult<Odds> {
        check_ratio("loss", self.loss)?;
        check_ratio("win", self.win)?;

        let max_bet = self.max_bet.unwrap_or(defaults.max_bet);
        if !(1..=MAX_BET_CEILING).contains(&max_bet) {
            return Err(LedgerError::Validation(format!(
                "max bet must be 1-{MAX_BET_CEILING}, got {max_bet}"
            )));
        }

        let user_limit = self.user_limit.unwrap_or(defaults.user_limit);
        if user_limit > USER_LIMIT_CEILING {
            return Err(LedgerError::Validation(format!(
                "user limit must be 0-{USER_LIMIT_CEILING} (0 = unlimited), got {user_limit}"
            )));
        }

        let min_bet = self.min_bet.unwrap_or(defaults.min_bet);
        if min_bet < 1 {
            return Err(LedgerError::Validation(format!(
                "min bet must be at least 1, got {min_bet}"
            )));
        }
        if min_bet > max_bet {
            return Err(LedgerError::Validation(format!(
                "min bet ({min_bet}) must not exceed max bet ({max_bet})"
            )));
        }

        let vig = self.vig.unwrap_or(defaults.vig);
        if !(0..=VIG_CEILING).contains(&vig) {
            return Err(LedgerError::Validation(format!(
                "vig must be 0-{VIG_CEILING}, got {vig}"
            )));
        }

        let favorite = SideRatios {
            loss: self.loss,
            win: self.win,
        };
        let underdog = SideRatios {
            loss: self.win + vig,
            win: self.loss,
        };
        let (red, blue) = match self.favorite {
            Side::Red => (favorite, underdog),
            Side::Blue => (underdog, favorite),
        };

        Ok(Odds {
            red,
            blue,
            max_bet,
            min_bet,
            user_limit,
            vig,
            status: OddsStatus::Open,
        })
    }
}

fn check_ratio(field: &str, scaled: i64) -> LedgerResult<()> {
    if (MIN_RATIO..=MAX_RATIO).contains(&scaled) {
        Ok(())
    } else {
        Err(LedgerError::Validation(format!(
            "{field} must be between 0.1 and 99, got {}",
            crate::types::display_ratio(scaled)
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
