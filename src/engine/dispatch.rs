//! Command dispatch.
//!
//! The transport hands over an already-parsed [`Command`] with the caller's
//! identity. The caller is registered on first contact, operator commands
//! are gated on role, and batches run strictly one command after another.

use serde::Serialize;
use tracing::debug;

use super::cancellation::CancelOddsResult;
use super::ledger::{CreditAdjustment, CreditOp, Ledger, RoundBoard};
use super::odds::OddsSpec;
use super::placement::PlaceBetResult;
use super::reversal::ReverseRoundResult;
use crate::types::{
    Account, LedgerError, LedgerResult, Odds, Role, Round, RoundResult, SettlementReport, Side,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // customer
    PlaceBet { side: Side, amount: i64 },
    Balance,
    Board,
    ClaimMaster,

    // operator
    OpenRound,
    CloseRound,
    OpenOdds(OddsSpec),
    CloseOdds,
    SetResult(RoundResult),
    Settle,
    CancelOdds(Option<usize>),
    ReverseRound(Option<u64>),
    AdjustCredit { short_id: u32, op: CreditOp },
    SetRole { short_id: u32, role: Role },
    ListAccounts,
    ListAdmins,
    ResetSystem,
}

impl Command {
    pub fn requires_operator(&self) -> bool {
        !matches!(
            self,
            Command::PlaceBet { .. } | Command::Balance | Command::Board | Command::ClaimMaster
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::PlaceBet { .. } => "place_bet",
            Command::Balance => "balance",
            Command::Board => "board",
            Command::ClaimMaster => "claim_master",
            Command::OpenRound => "open_round",
            Command::CloseRound => "close_round",
            Command::OpenOdds(_) => "open_odds",
            Command::CloseOdds => "close_odds",
            Command::SetResult(_) => "set_result",
            Command::Settle => "settle",
            Command::CancelOdds(_) => "cancel_odds",
            Command::ReverseRound(_) => "reverse_round",
            Command::AdjustCredit { .. } => "adjust_credit",
            Command::SetRole { .. } => "set_role",
            Command::ListAccounts => "list_accounts",
            Command::ListAdmins => "list_admins",
            Command::ResetSystem => "reset_system",
        }
    }
}

/// What a command produced, for the transport to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Reply {
    BetPlaced(PlaceBetResult),
    Balance(Account),
    Board(Option<RoundBoard>),
    RoundOpened(Round),
    RoundClosed(Round),
    OddsOpened { index: usize, odds: Odds },
    OddsClosed { index: usize },
    ResultSet(Round),
    Settled(SettlementReport),
    OddsCancelled(CancelOddsResult),
    RoundReversed(ReverseRoundResult),
    CreditAdjusted(CreditAdjustment),
    RoleChanged(Account),
    Accounts(Vec<Account>),
    SystemReset,
}

impl Ledger {
    /// Run one command for `caller`.
    pub async fn execute(&mut self, caller: &str, command: Command) -> LedgerResult<Reply> {
        let name = command.name();
        let result = self.run(caller, command).await;
        if let Err(e) = &result {
            debug!(caller, command = name, error = %e, "Command rejected");
        }
        result
    }

    /// Run commands strictly in order, each fully applied before the next.
    pub async fn execute_batch(&mut self, batch: Vec<(String, Command)>) -> Vec<LedgerResult<Reply>> {
        let mut replies = Vec::with_capacity(batch.len());
        for (caller, command) in batch {
            replies.push(self.execute(&caller, command).await);
        }
        replies
    }

    async fn run(&mut self, caller: &str, command: Command) -> LedgerResult<Reply> {
        let role = self.ensure_account(caller).role;
        if command.requires_operator() && !role.is_privileged() {
            return Err(LedgerError::PermissionDenied(format!(
                "{} requires ADMIN or MASTER",
                command.name()
            )));
        }

        let reply = match command {
            Command::PlaceBet { side, amount } => Reply::BetPlaced(self.place_bet(caller, side, amount)?),
            Command::Balance => Reply::Balance(self.ensure_account(caller).clone()),
            Command::Board => Reply::Board(self.board()),
            Command::ClaimMaster => Reply::RoleChanged(self.claim_founding_master(caller)?.clone()),
            Command::OpenRound => Reply::RoundOpened(self.open_round()?.clone()),
            Command::CloseRound => Reply::RoundClosed(self.close_round()?.clone()),
            Command::OpenOdds(spec) => {
                let (index, odds) = self.open_odds(&spec)?;
                Reply::OddsOpened {
                    index,
                    odds: odds.clone(),
                }
            }
            Command::CloseOdds => Reply::OddsClosed {
                index: self.close_odds()?,
            },
            Command::SetResult(result) => Reply::ResultSet(self.set_result(result)?.clone()),
            Command::Settle => Reply::Settled(self.settle_round()?),
            Command::CancelOdds(target) => Reply::OddsCancelled(self.cancel_odds(target)?),
            Command::ReverseRound(round_id) => Reply::RoundReversed(self.reverse_round(round_id).await?),
            Command::AdjustCredit { short_id, op } => Reply::CreditAdjusted(self.adjust_credit(short_id, op)?),
            Command::SetRole { short_id, role } => Reply::RoleChanged(self.set_role(short_id, role)?.clone()),
            Command::ListAccounts => Reply::Accounts(self.accounts().into_iter().cloned().collect()),
            Command::ListAdmins => Reply::Accounts(self.admins().into_iter().cloned().collect()),
            Command::ResetSystem => {
                self.reset_system();
                Reply::SystemReset
            }
        };
        Ok(reply)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
