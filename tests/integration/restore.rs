use ringside::config::AppConfig;
use ringside::engine::{Command, Ledger, OddsSpec};
use ringside::storage::queue::PersistenceQueue;
use ringside::types::{LedgerError, Role, RoundResult, RoundStatus, Side};

use crate::{bet, fresh_ledger, open_red_favourite, MASTER};

/// Simulate a restart: a new ledger restored from the same database.
async fn restart(ledger: Ledger) -> Ledger {
    ledger.flush().await.unwrap();
    let gateway = ledger.gateway();
    drop(ledger);
    let (queue, _worker) = PersistenceQueue::spawn(gateway.clone());
    Ledger::restore(&AppConfig::default(), gateway, queue)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_open_round_survives_restart() {
    let (mut ledger, _gateway) = fresh_ledger().await;
    open_red_favourite(&mut ledger).await;
    bet(&mut ledger, "alice", Side::Red, 100).await;
    ledger.execute(MASTER, Command::CloseOdds).await.unwrap();
    ledger
        .execute(MASTER, Command::OpenOdds(OddsSpec::new(Side::Blue, 15, 12)))
        .await
        .unwrap();
    bet(&mut ledger, "alice", Side::Blue, 100).await;
    bet(&mut ledger, "alice", Side::Blue, 100).await;
    let before = ledger.account("alice").unwrap().clone();

    let mut ledger = restart(ledger).await;

    let alice = ledger.account("alice").unwrap();
    assert_eq!(alice.short_id, before.short_id);
    assert_eq!(alice.credit, before.credit);
    assert_eq!(alice.credit_hold, before.credit_hold);
    assert_eq!((alice.red_net, alice.blue_net), (before.red_net, before.blue_net));
    assert_eq!(alice.bets_in_epoch(1), 2);
    assert_eq!(ledger.account(MASTER).unwrap().role, Role::Master);

    let round = ledger.current_round().unwrap();
    assert_eq!(round.status, RoundStatus::Open);
    assert_eq!(round.odds.len(), 2);
    assert_eq!(round.open_odds().map(|(i, _)| i), Some(1));
    assert_eq!(round.bets.len(), 3);

    // the per-epoch limit still counts bets placed before the restart
    let err = ledger
        .execute("alice", Command::PlaceBet { side: Side::Blue, amount: 100 })
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::LimitExceeded { limit: 2 });
}

#[tokio::test]
async fn test_round_ids_continue_after_restart() {
    let (mut ledger, _gateway) = fresh_ledger().await;
    open_red_favourite(&mut ledger).await;
    ledger.execute(MASTER, Command::CloseRound).await.unwrap();
    ledger
        .execute(MASTER, Command::SetResult(RoundResult::Red))
        .await
        .unwrap();
    ledger.execute(MASTER, Command::Settle).await.unwrap();

    let mut ledger = restart(ledger).await;
    assert!(ledger.current_round().is_none());
    assert_eq!(ledger.last_round_id(), 1);

    let round = ledger.open_round().unwrap();
    assert_eq!(round.id, 2);
}

#[tokio::test]
async fn test_reversed_round_survives_restart() {
    let (mut ledger, _gateway) = fresh_ledger().await;
    open_red_favourite(&mut ledger).await;
    bet(&mut ledger, "alice", Side::Red, 100).await;
    bet(&mut ledger, "bob", Side::Blue, 100).await;
    ledger.execute(MASTER, Command::CloseRound).await.unwrap();
    ledger
        .execute(MASTER, Command::SetResult(RoundResult::Red))
        .await
        .unwrap();
    ledger.execute(MASTER, Command::Settle).await.unwrap();
    ledger
        .execute(MASTER, Command::ReverseRound(None))
        .await
        .unwrap();

    let mut ledger = restart(ledger).await;

    let round = ledger.current_round().unwrap();
    assert_eq!((round.id, round.status, round.result), (1, RoundStatus::Closed, None));
    assert_eq!(ledger.account("alice").unwrap().credit_hold, 20);
    assert_eq!(ledger.account("bob").unwrap().credit_hold, 38);

    ledger
        .execute(MASTER, Command::SetResult(RoundResult::Draw))
        .await
        .unwrap();
    ledger.execute(MASTER, Command::Settle).await.unwrap();
    assert_eq!(ledger.account("alice").unwrap().credit, 1000);
    assert_eq!(ledger.account("bob").unwrap().credit, 1000);
}
