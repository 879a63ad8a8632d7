//! Outbound game events and fan-out to observers
//!
//! Delivery is fire-and-forget: a closed or lagging transport simply misses
//! the event and never affects delivery to the others.

use crate::game::observers::ObserverRegistry;
use crate::game::types::{BetView, FinishedRound};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-transport outbound queue
pub type EventSink = mpsc::UnboundedSender<GameEvent>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GameEvent {
    #[serde(rename_all = "camelCase")]
    RoundWaiting {
        round_id: Uuid,
        start_time: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    RoundRunning {
        round_id: Uuid,
        start_time: DateTime<Utc>,
    },
    RoundCrashed {
        round: FinishedRound,
    },
    #[serde(rename_all = "camelCase")]
    PlayerWon {
        wallet: String,
        currency: String,
        stake: Decimal,
        multiplier: Decimal,
        payout: Decimal,
        auto: bool,
    },
    PlayerLost {
        wallet: String,
    },
    BetList {
        active: Vec<BetView>,
        pending: Vec<BetView>,
    },
    BalanceUpdate {
        currency: String,
        balance: Decimal,
    },
    BalanceInit {
        balances: BTreeMap<String, Decimal>,
    },
}

impl GameEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::RoundWaiting { .. } => "round-waiting",
            GameEvent::RoundRunning { .. } => "round-running",
            GameEvent::RoundCrashed { .. } => "round-crashed",
            GameEvent::PlayerWon { .. } => "player-won",
            GameEvent::PlayerLost { .. } => "player-lost",
            GameEvent::BetList { .. } => "bet-list",
            GameEvent::BalanceUpdate { .. } => "balance-update",
            GameEvent::BalanceInit { .. } => "balance-init",
        }
    }
}

/// Send to every observer. Returns how many transports accepted it.
pub fn broadcast(observers: &ObserverRegistry, event: &GameEvent) -> usize {
    broadcast_filtered(observers, event, |_| true)
}

/// Send to the observers selected by `filter`
pub fn broadcast_filtered<F>(observers: &ObserverRegistry, event: &GameEvent, filter: F) -> usize
where
    F: Fn(&crate::game::observers::Observer) -> bool,
{
    let mut delivered = 0;
    for observer in observers.iter().filter(|o| filter(o)) {
        match observer.sink.send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(_) => tracing::debug!(
                transport_id = %observer.transport_id,
                event = event.name(),
                "dropping event for closed transport"
            ),
        }
    }
    delivered
}

/// Private message to one transport. Returns `false` if it is gone.
pub fn send_to(observers: &ObserverRegistry, transport_id: &str, event: GameEvent) -> bool {
    match observers.lookup(transport_id) {
        Some(observer) => observer.sink.send(event).is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_names() {
        let event = GameEvent::PlayerLost {
            wallet: "0xabc".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "player-lost");
        assert_eq!(json["wallet"], "0xabc");

        let event = GameEvent::RoundWaiting {
            round_id: Uuid::nil(),
            start_time: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "round-waiting");
        assert!(json.get("roundId").is_some());
        assert!(json.get("startTime").is_some());
    }

    #[test]
    fn test_broadcast_skips_closed_transports() {
        let mut observers = ObserverRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();
        observers.connect("a".into(), tx1);
        observers.connect("b".into(), tx2);
        observers.connect("c".into(), tx3);
        drop(rx2);

        let event = GameEvent::PlayerLost {
            wallet: "0xabc".into(),
        };
        assert_eq!(broadcast(&observers, &event), 2);
        assert_eq!(rx1.try_recv().unwrap(), event);
        assert_eq!(rx3.try_recv().unwrap(), event);
    }

    #[test]
    fn test_send_to_targets_one_transport() {
        let mut observers = ObserverRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        observers.connect("a".into(), tx1);
        observers.connect("b".into(), tx2);

        let event = GameEvent::BalanceUpdate {
            currency: "USDC".into(),
            balance: Decimal::TEN,
        };
        assert!(send_to(&observers, "b", event.clone()));
        assert!(!send_to(&observers, "missing", event.clone()));

        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), event);
    }

    #[test]
    fn test_filtered_broadcast() {
        let mut observers = ObserverRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        observers.connect("a".into(), tx1);
        observers.connect("b".into(), tx2);
        observers.identify("b", "0xabc".into());

        let event = GameEvent::PlayerLost {
            wallet: "0xabc".into(),
        };
        let sent = broadcast_filtered(&observers, &event, |o| o.wallet.is_some());
        assert_eq!(sent, 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }
}
