//! End-to-end tests over the real SQLite gateway and write-behind worker.

mod lifecycle;
mod restore;
mod reversal;

use std::sync::Arc;

use ringside::config::AppConfig;
use ringside::engine::{Command, Ledger, OddsSpec};
use ringside::storage::queue::PersistenceQueue;
use ringside::storage::sqlite::SqliteGateway;
use ringside::storage::PersistenceGateway;
use ringside::types::Side;

pub const MASTER: &str = "boss";

/// A fresh ledger over an empty in-memory database, with `boss` as MASTER.
pub async fn fresh_ledger() -> (Ledger, Arc<dyn PersistenceGateway>) {
    let gateway: Arc<dyn PersistenceGateway> =
        Arc::new(SqliteGateway::in_memory().await.expect("in-memory database"));
    let (queue, _worker) = PersistenceQueue::spawn(gateway.clone());
    let mut ledger = Ledger::new(&AppConfig::default(), gateway.clone(), queue);
    ledger
        .execute(MASTER, Command::ClaimMaster)
        .await
        .expect("founding master");
    (ledger, gateway)
}

/// Open a round with RED favourite at 2.0 / 1.8 (BLUE 3.8 / 2.0 after vig).
pub async fn open_red_favourite(ledger: &mut Ledger) {
    ledger.execute(MASTER, Command::OpenRound).await.unwrap();
    ledger
        .execute(MASTER, Command::OpenOdds(OddsSpec::new(Side::Red, 20, 18)))
        .await
        .unwrap();
}

pub async fn bet(ledger: &mut Ledger, user: &str, side: Side, amount: i64) {
    ledger
        .execute(user, Command::PlaceBet { side, amount })
        .await
        .unwrap();
}

/// Credit summed over every account.
pub fn total_credit(ledger: &Ledger) -> i64 {
    ledger.accounts().iter().map(|a| a.credit).sum()
}
