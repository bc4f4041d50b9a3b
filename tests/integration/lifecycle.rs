use ringside::engine::{Command, CreditOp, OddsSpec, Reply};
use ringside::storage::PersistenceGateway;
use ringside::types::{BetStatus, LedgerError, RoundResult, RoundStatus, Side, TransactionKind};

use crate::{bet, fresh_ledger, open_red_favourite, total_credit, MASTER};

#[tokio::test]
async fn test_full_round_settles_and_persists() {
    let (mut ledger, gateway) = fresh_ledger().await;
    open_red_favourite(&mut ledger).await;
    bet(&mut ledger, "alice", Side::Red, 100).await;
    bet(&mut ledger, "bob", Side::Blue, 100).await;

    assert_eq!(ledger.account("alice").unwrap().credit_hold, 20);
    assert_eq!(ledger.account("bob").unwrap().credit_hold, 38);

    let before = total_credit(&ledger);
    ledger.execute(MASTER, Command::CloseRound).await.unwrap();
    ledger
        .execute(MASTER, Command::SetResult(RoundResult::Red))
        .await
        .unwrap();
    let report = match ledger.execute(MASTER, Command::Settle).await.unwrap() {
        Reply::Settled(report) => report,
        other => panic!("unexpected reply {other:?}"),
    };

    assert_eq!(report.total_bets, 2);
    assert_eq!(report.total_payout, 18);
    assert_eq!(report.casino_profit, 20);
    // money only moves between customers and the house
    assert_eq!(total_credit(&ledger) - before + report.casino_profit, 0);

    let alice = ledger.account("alice").unwrap();
    assert_eq!((alice.credit, alice.credit_hold), (1018, 0));
    let bob = ledger.account("bob").unwrap();
    assert_eq!((bob.credit, bob.credit_hold), (962, 0));
    assert!(ledger.current_round().is_none());
    assert_eq!(ledger.history().len(), 1);

    ledger.flush().await.unwrap();
    let statuses: Vec<BetStatus> = gateway
        .load_round_bets(1)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.status)
        .collect();
    assert_eq!(statuses, vec![BetStatus::Won, BetStatus::Lost]);
    assert!(gateway.load_active_round().await.unwrap().is_none());

    let statement = gateway.recent_transactions("alice", 5).await.unwrap();
    assert_eq!(statement.len(), 1);
    assert_eq!(statement[0].kind, TransactionKind::BetWin);
    assert_eq!(statement[0].amount, 18);
    assert_eq!(statement[0].reference, "#r1");
}

#[tokio::test]
async fn test_draw_returns_every_stake() {
    let (mut ledger, gateway) = fresh_ledger().await;
    open_red_favourite(&mut ledger).await;
    bet(&mut ledger, "alice", Side::Red, 100).await;
    bet(&mut ledger, "bob", Side::Blue, 300).await;

    ledger.execute(MASTER, Command::CloseRound).await.unwrap();
    ledger
        .execute(MASTER, Command::SetResult(RoundResult::Draw))
        .await
        .unwrap();
    ledger.execute(MASTER, Command::Settle).await.unwrap();

    for user in ["alice", "bob"] {
        let account = ledger.account(user).unwrap();
        assert_eq!((account.credit, account.credit_hold), (1000, 0));
    }

    ledger.flush().await.unwrap();
    let bets = gateway.load_round_bets(1).await.unwrap();
    assert!(bets.iter().all(|b| b.status == BetStatus::Draw));
    assert!(gateway.recent_transactions("bob", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_epoch_is_left_out_of_settlement() {
    let (mut ledger, gateway) = fresh_ledger().await;
    open_red_favourite(&mut ledger).await;
    bet(&mut ledger, "alice", Side::Red, 100).await;
    ledger.execute(MASTER, Command::CloseOdds).await.unwrap();

    ledger
        .execute(MASTER, Command::OpenOdds(OddsSpec::new(Side::Blue, 15, 12)))
        .await
        .unwrap();
    bet(&mut ledger, "alice", Side::Red, 200).await;
    ledger.execute(MASTER, Command::CloseOdds).await.unwrap();

    let reply = ledger
        .execute(MASTER, Command::CancelOdds(None))
        .await
        .unwrap();
    match reply {
        Reply::OddsCancelled(result) => {
            assert_eq!(result.odds_index, 1);
            assert_eq!(result.voided_bets, 1);
        }
        other => panic!("unexpected reply {other:?}"),
    }
    // only the first epoch's bet is still held
    assert_eq!(ledger.account("alice").unwrap().credit_hold, 20);

    ledger.execute(MASTER, Command::CloseRound).await.unwrap();
    ledger
        .execute(MASTER, Command::SetResult(RoundResult::Blue))
        .await
        .unwrap();
    let report = match ledger.execute(MASTER, Command::Settle).await.unwrap() {
        Reply::Settled(report) => report,
        other => panic!("unexpected reply {other:?}"),
    };
    assert_eq!(report.total_bets, 1);
    assert_eq!(ledger.account("alice").unwrap().credit, 980);

    ledger.flush().await.unwrap();
    let statuses: Vec<BetStatus> = gateway
        .load_round_bets(1)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.status)
        .collect();
    assert_eq!(statuses, vec![BetStatus::Lost, BetStatus::Void]);
}

#[tokio::test]
async fn test_uncovered_bet_leaves_no_trace() {
    let (mut ledger, gateway) = fresh_ledger().await;
    open_red_favourite(&mut ledger).await;

    // BLUE at 3.8: a 3000 stake needs a hold of 1140
    let err = ledger.place_bet("carol", Side::Blue, 3000).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientCredit { .. }));
    assert!(ledger.account("carol").is_none());

    ledger.flush().await.unwrap();
    assert!(gateway.load_round_bets(1).await.unwrap().is_empty());
    let accounts = gateway.load_all_accounts().await.unwrap();
    assert!(accounts.iter().all(|a| a.user_id != "carol"));
}

#[tokio::test]
async fn test_reset_clears_rounds_but_keeps_credit() {
    let (mut ledger, gateway) = fresh_ledger().await;
    open_red_favourite(&mut ledger).await;
    bet(&mut ledger, "alice", Side::Red, 100).await;
    ledger
        .execute(MASTER, Command::AdjustCredit {
            short_id: 2,
            op: CreditOp::Deposit(500),
        })
        .await
        .unwrap();

    ledger.execute(MASTER, Command::ResetSystem).await.unwrap();
    assert!(ledger.current_round().is_none());
    assert_eq!(ledger.last_round_id(), 0);
    let alice = ledger.account("alice").unwrap();
    assert_eq!((alice.credit, alice.credit_hold), (1500, 0));

    ledger.flush().await.unwrap();
    assert!(gateway.last_round_id().await.unwrap().is_none());
    assert!(gateway.load_round_bets(1).await.unwrap().is_empty());

    // ids start over after a reset
    let reply = ledger.execute(MASTER, Command::OpenRound).await.unwrap();
    assert!(matches!(reply, Reply::RoundOpened(ref r) if r.id == 1 && r.status == RoundStatus::Open));
}
