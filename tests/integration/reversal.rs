use std::sync::Arc;

use ringside::engine::{Command, CreditOp, Ledger, Reply};
use ringside::storage::PersistenceGateway;
use ringside::types::{BetStatus, LedgerError, RoundResult, RoundStatus, Side, TransactionKind};
use tokio_test::assert_ok;

use crate::{bet, fresh_ledger, open_red_favourite, total_credit, MASTER};

async fn settle(ledger: &mut Ledger, result: RoundResult) {
    ledger
        .execute(MASTER, Command::SetResult(result))
        .await
        .unwrap();
    ledger.execute(MASTER, Command::Settle).await.unwrap();
}

/// alice RED 100 (wins 18), bob BLUE 100 (loses 38), settled RED.
async fn settled_round() -> (Ledger, Arc<dyn PersistenceGateway>) {
    let (mut ledger, gateway) = fresh_ledger().await;
    open_red_favourite(&mut ledger).await;
    bet(&mut ledger, "alice", Side::Red, 100).await;
    bet(&mut ledger, "bob", Side::Blue, 100).await;
    ledger.execute(MASTER, Command::CloseRound).await.unwrap();
    settle(&mut ledger, RoundResult::Red).await;
    (ledger, gateway)
}

#[tokio::test]
async fn test_reversal_restores_pre_settlement_state() {
    let (mut ledger, gateway) = settled_round().await;
    let settled_total = total_credit(&ledger);

    let reply = ledger
        .execute(MASTER, Command::ReverseRound(None))
        .await
        .unwrap();
    match reply {
        Reply::RoundReversed(result) => {
            assert_eq!(result.round_id, 1);
            assert_eq!(result.old_result, Some(RoundResult::Red));
            assert_eq!(result.reversed_bets, 2);
        }
        other => panic!("unexpected reply {other:?}"),
    }

    let alice = ledger.account("alice").unwrap();
    assert_eq!((alice.credit, alice.credit_hold), (1000, 20));
    let bob = ledger.account("bob").unwrap();
    assert_eq!((bob.credit, bob.credit_hold), (1000, 38));
    // the house gives back exactly what it made
    assert_eq!(total_credit(&ledger) - settled_total, 20);

    let round = ledger.current_round().unwrap();
    assert_eq!(round.id, 1);
    assert_eq!(round.status, RoundStatus::Closed);
    assert!(round.result.is_none());
    assert!(round.odds.is_empty());
    assert!(round.bets.iter().all(|b| b.status == BetStatus::Pending && b.timestamp == 0));
    assert!(ledger.history().is_empty());

    assert_ok!(ledger.flush().await);
    let active = gateway.load_active_round().await.unwrap().unwrap();
    assert_eq!((active.id, active.status, active.result), (1, RoundStatus::Closed, None));
    assert!(gateway.load_round_odds(1).await.unwrap().is_empty());
    let bets = gateway.load_round_bets(1).await.unwrap();
    assert!(bets.iter().all(|b| b.status == BetStatus::Pending));

    let alice_log = gateway.recent_transactions("alice", 5).await.unwrap();
    assert_eq!(alice_log[0].kind, TransactionKind::Adjustment);
    assert_eq!(alice_log[0].amount, -18);
    let bob_log = gateway.recent_transactions("bob", 5).await.unwrap();
    assert_eq!(bob_log[0].kind, TransactionKind::Refund);
    assert_eq!(bob_log[0].amount, 38);
}

#[tokio::test]
async fn test_reversed_round_can_be_settled_again() {
    let (mut ledger, gateway) = settled_round().await;
    ledger
        .execute(MASTER, Command::ReverseRound(Some(1)))
        .await
        .unwrap();
    settle(&mut ledger, RoundResult::Blue).await;

    assert_eq!(ledger.account("alice").unwrap().credit, 980);
    assert_eq!(ledger.account("bob").unwrap().credit, 1020);
    assert_eq!(ledger.history().len(), 1);

    assert_ok!(ledger.flush().await);
    let statuses: Vec<BetStatus> = gateway
        .load_round_bets(1)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.status)
        .collect();
    assert_eq!(statuses, vec![BetStatus::Lost, BetStatus::Won]);
    let row = gateway.find_round_for_reversal(None).await.unwrap().unwrap();
    assert_eq!((row.id, row.result), (1, Some(RoundResult::Blue)));
}

#[tokio::test]
async fn test_reversal_refused_while_round_current() {
    let (mut ledger, _gateway) = settled_round().await;
    ledger.execute(MASTER, Command::OpenRound).await.unwrap();

    let err = ledger
        .execute(MASTER, Command::ReverseRound(None))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(ref msg) if msg.contains("close it first")));
    assert_eq!(ledger.account("alice").unwrap().credit, 1018);
}

#[tokio::test]
async fn test_reversal_without_completed_round() {
    let (mut ledger, _gateway) = fresh_ledger().await;
    let err = ledger
        .execute(MASTER, Command::ReverseRound(None))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    let err = ledger
        .execute(MASTER, Command::ReverseRound(Some(7)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_uncovered_reversal_changes_nothing() {
    let (mut ledger, gateway) = settled_round().await;
    // winnings withdrawn, and then some
    ledger
        .execute(MASTER, Command::AdjustCredit { short_id: 2, op: CreditOp::Withdraw(1000) })
        .await
        .unwrap();

    let err = ledger
        .execute(MASTER, Command::ReverseRound(None))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientCredit { .. }));

    assert_eq!(ledger.account("alice").unwrap().credit, 18);
    assert_eq!(ledger.account("bob").unwrap().credit, 962);
    assert!(ledger.current_round().is_none());
    assert_eq!(ledger.history().len(), 1);

    assert_ok!(ledger.flush().await);
    let row = gateway.find_round_for_reversal(None).await.unwrap().unwrap();
    assert_eq!(row.status, RoundStatus::Completed);
}
