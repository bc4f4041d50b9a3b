//! Dashboard API route handlers.
//!
//! All endpoints are read-only and return JSON. Handlers take the ledger's
//! read guard only for as long as it takes to copy out a view.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::engine::ledger::RoundBoard;
use crate::engine::SharedLedger;
use crate::storage::PersistenceGateway;
use crate::types::{Account, Role, Transaction};

/// Transactions shown on an account statement.
const STATEMENT_LENGTH: u32 = 5;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub ledger: SharedLedger,
    pub gateway: Arc<dyn PersistenceGateway>,
}

impl DashboardState {
    pub fn new(ledger: SharedLedger, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { ledger, gateway }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub short_id: u32,
    pub role: Role,
    pub credit: i64,
    pub credit_hold: i64,
    pub available: i64,
    pub red_net: i64,
    pub blue_net: i64,
}

impl From<&Account> for AccountView {
    fn from(a: &Account) -> Self {
        Self {
            short_id: a.short_id,
            role: a.role,
            credit: a.credit,
            credit_hold: a.credit_hold,
            available: a.available(),
            red_net: a.red_net,
            blue_net: a.blue_net,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundResponse {
    pub last_round_id: u64,
    pub settled_rounds: usize,
    pub board: Option<RoundBoard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountStatement {
    pub account: AccountView,
    pub transactions: Vec<Transaction>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/round
pub async fn get_round(State(state): State<AppState>) -> Json<RoundResponse> {
    let ledger = state.ledger.read().await;
    Json(RoundResponse {
        last_round_id: ledger.last_round_id(),
        settled_rounds: ledger.history().len(),
        board: ledger.board(),
    })
}

/// GET /api/accounts
pub async fn get_accounts(State(state): State<AppState>) -> Json<Vec<AccountView>> {
    let ledger = state.ledger.read().await;
    Json(ledger.accounts().into_iter().map(AccountView::from).collect())
}

/// GET /api/admins
pub async fn get_admins(State(state): State<AppState>) -> Json<Vec<AccountView>> {
    let ledger = state.ledger.read().await;
    Json(ledger.admins().into_iter().map(AccountView::from).collect())
}

/// GET /api/accounts/:short_id
pub async fn get_account(
    State(state): State<AppState>,
    Path(short_id): Path<u32>,
) -> Result<Json<AccountStatement>, StatusCode> {
    let (user_id, account) = {
        let ledger = state.ledger.read().await;
        let account = ledger.account_by_short_id(short_id).ok_or(StatusCode::NOT_FOUND)?;
        (account.user_id.clone(), AccountView::from(account))
    };

    let transactions = state
        .gateway
        .recent_transactions(&user_id, STATEMENT_LENGTH)
        .await
        .map_err(|e| {
            error!(short_id, error = %e, "Statement lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(AccountStatement {
        account,
        transactions,
    }))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
