//! Whole rounds driven through the public engine API, on a paused clock,
//! against the RocksDB ledger and round store.

use crashline::config::GameConfig;
use crashline::game::randomness::FixedDuration;
use crashline::game::{CrashGame, GameEvent, PlaceBetRequest, RoundState};
use crashline::ledger::{Ledger, RocksLedger};
use crashline::round_store::{RocksRoundStore, RoundStore};
use crashline::storage::OptimizedStorage;
use crashline::GameError;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);
const ROUND: Duration = Duration::from_secs(8);

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn request(wallet: &str, stake: &str, auto: Option<&str>) -> PlaceBetRequest {
    PlaceBetRequest {
        wallet: wallet.to_string(),
        currency: "USDC".to_string(),
        stake: dec(stake),
        auto_cash_out: auto.map(dec),
        transport_id: format!("ws_{}", wallet),
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<GameEvent>) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_two_rounds_with_queued_bet_and_persistence() {
    let dir = tempdir().unwrap();
    let storage = OptimizedStorage::new(dir.path()).unwrap();
    let ledger = Arc::new(RocksLedger::new(storage.clone()));
    let store = Arc::new(RocksRoundStore::new(storage));

    for wallet in ["alice", "bob", "carol"] {
        ledger
            .credit(wallet, "USDC", dec("100"), "Seed balance", uuid::Uuid::nil())
            .await
            .unwrap();
    }

    let config = GameConfig {
        wait_time_ms: WAIT.as_millis() as u64,
        ..GameConfig::default()
    };
    let game = CrashGame::with_duration_source(
        &config,
        ledger.clone(),
        store.clone(),
        Arc::new(FixedDuration(ROUND)),
    );

    let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
    let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
    game.connect("ws_alice".into(), alice_tx).await;
    game.connect("ws_bob".into(), bob_tx).await;
    game.identify("ws_alice", "alice".into()).await;

    // Round 1, WAITING: alice joins with an auto cash-out, bob manually
    game.place_bet(request("alice", "50", Some("1.20"))).await.unwrap();
    game.place_bet(request("bob", "20", None)).await.unwrap();
    assert_eq!(ledger.balance("alice", "USDC").await.unwrap(), dec("50"));

    tokio::time::sleep(WAIT + Duration::from_secs(1)).await;
    assert_eq!(game.snapshot().await.state, RoundState::Running);

    // carol queues for round 2 while round 1 runs
    game.place_bet(request("carol", "30", None)).await.unwrap();
    assert_eq!(ledger.balance("carol", "USDC").await.unwrap(), dec("100"));
    assert!(matches!(
        game.place_bet(request("bob", "5", None)).await,
        Err(GameError::AlreadyJoined)
    ));

    // ln(1.2)/6e-5 is about 3.04s, so alice cashes out automatically
    tokio::time::sleep(Duration::from_secs(4)).await;
    let alice_events = drain(&mut alice_rx);
    assert!(alice_events
        .iter()
        .any(|e| matches!(e, GameEvent::PlayerWon { wallet, auto: true, .. } if wallet == "alice")));
    assert!(alice_events
        .iter()
        .any(|e| matches!(e, GameEvent::BalanceUpdate { balance, .. } if *balance == dec("110"))));

    // Crash at 8s: bob never cashed out
    tokio::time::sleep(Duration::from_secs(4)).await;
    let snapshot = game.snapshot().await;
    assert_eq!(snapshot.state, RoundState::Crashed);
    assert_eq!(snapshot.active.len(), 1);
    assert_eq!(snapshot.active[0].wallet, "carol");
    assert!(snapshot.pending.is_empty());
    assert_eq!(ledger.balance("carol", "USDC").await.unwrap(), dec("70"));

    let bob_events = drain(&mut bob_rx);
    assert!(bob_events
        .iter()
        .any(|e| matches!(e, GameEvent::PlayerLost { wallet } if wallet == "bob")));
    let crashed = bob_events
        .iter()
        .find_map(|e| match e {
            GameEvent::RoundCrashed { round } => Some(round.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(crashed.players, 2);
    assert_eq!(crashed.winners, 1);
    assert_eq!(crashed.duration, 8_000);
    assert_eq!(crashed.multiplier, dec("1.61"));

    // Round 2 begins after the wait and carries carol's committed bet
    tokio::time::sleep(WAIT + Duration::from_millis(1)).await;
    let snapshot = game.snapshot().await;
    assert_eq!(snapshot.state, RoundState::Waiting);
    assert_ne!(snapshot.round_id, crashed.id);
    assert_eq!(snapshot.active[0].wallet, "carol");

    tokio::time::sleep(WAIT + Duration::from_secs(2)).await;
    let receipt = game.cash_out("carol").await.unwrap();
    assert_eq!(receipt.round_id, snapshot.round_id);
    assert_eq!(
        ledger.balance("carol", "USDC").await.unwrap(),
        dec("70") + receipt.payout
    );

    tokio::time::sleep(ROUND).await;
    let history = game.recent_rounds(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, snapshot.round_id);
    assert_eq!(history[1].id, crashed.id);
    assert_eq!(store.get(crashed.id).await.unwrap(), Some(crashed));

    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_everyone_leaves_then_someone_returns() {
    let dir = tempdir().unwrap();
    let storage = OptimizedStorage::new(dir.path()).unwrap();
    let ledger = Arc::new(RocksLedger::new(storage.clone()));
    let store = Arc::new(RocksRoundStore::new(storage));

    let config = GameConfig {
        wait_time_ms: WAIT.as_millis() as u64,
        ..GameConfig::default()
    };
    let game = CrashGame::with_duration_source(&config, ledger, store.clone(), Arc::new(FixedDuration(ROUND)));

    let (tx, _rx) = mpsc::unbounded_channel();
    game.connect("ws_1".into(), tx).await;
    let first_round = game.snapshot().await.round_id;
    game.disconnect("ws_1").await;

    tokio::time::sleep(WAIT * 4).await;
    assert_eq!(game.snapshot().await.state, RoundState::Stopped);
    assert!(store.recent(10).await.unwrap().is_empty());

    let (tx, mut rx) = mpsc::unbounded_channel();
    game.connect("ws_2".into(), tx).await;
    let snapshot = game.snapshot().await;
    assert_eq!(snapshot.state, RoundState::Waiting);
    assert_ne!(snapshot.round_id, first_round);
    assert!(matches!(rx.try_recv(), Ok(GameEvent::RoundWaiting { .. })));

    tokio::time::sleep(WAIT + ROUND + Duration::from_millis(1)).await;
    assert_eq!(store.recent(10).await.unwrap().len(), 1);
}
