//! Round, bet and record types shared by the engine and the transport

use crate::game::timers::TimerHandle;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Identity assigned to a client connection by the transport
pub type TransportId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundState {
    Stopped,
    Waiting,
    Running,
    Crashed,
}

impl std::fmt::Display for RoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoundState::Stopped => "stopped",
            RoundState::Waiting => "waiting",
            RoundState::Running => "running",
            RoundState::Crashed => "crashed",
        };
        f.write_str(name)
    }
}

/// Outcome stamped on a bet when it cashes out
#[derive(Debug, Clone, PartialEq)]
pub struct CashOut {
    pub at: DateTime<Utc>,
    pub elapsed: Duration,
    pub multiplier: Decimal,
    pub payout: Decimal,
    pub auto: bool,
    pub cashed_out: bool,
}

/// A wallet's participation in one round
#[derive(Debug)]
pub struct Bet {
    pub wallet: String,
    pub currency: String,
    pub stake: Decimal,
    /// `None` means manual cash-out only
    pub auto_cash_out: Option<Decimal>,
    pub transport_id: TransportId,
    pub cash_out: Option<CashOut>,
    pub(crate) timer: Option<TimerHandle>,
}

impl Bet {
    pub fn new(request: PlaceBetRequest) -> Self {
        Self {
            wallet: request.wallet,
            currency: request.currency,
            stake: request.stake,
            auto_cash_out: request.auto_cash_out.filter(|t| *t > Decimal::ONE),
            transport_id: request.transport_id,
            cash_out: None,
            timer: None,
        }
    }

    pub fn is_cashed_out(&self) -> bool {
        self.cash_out.as_ref().map_or(false, |c| c.cashed_out)
    }

    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    pub fn view(&self) -> BetView {
        BetView {
            wallet: self.wallet.clone(),
            currency: self.currency.clone(),
            stake: self.stake,
            auto_cash_out: self.auto_cash_out,
            cashed_out: self.is_cashed_out(),
            multiplier: self.cash_out.as_ref().map(|c| c.multiplier),
            payout: self.cash_out.as_ref().map(|c| c.payout),
            auto: self.cash_out.as_ref().map(|c| c.auto),
        }
    }
}

/// Client-facing projection of a bet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetView {
    pub wallet: String,
    pub currency: String,
    pub stake: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_cash_out: Option<Decimal>,
    pub cashed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto: Option<bool>,
}

/// Immutable summary of a crashed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedRound {
    pub id: Uuid,
    /// Epoch seconds
    pub start_time: i64,
    /// RUNNING phase length in milliseconds
    pub duration: u64,
    pub multiplier: Decimal,
    pub players: u32,
    pub winners: u32,
}

#[derive(Debug, Clone)]
pub struct PlaceBetRequest {
    pub wallet: String,
    pub currency: String,
    pub stake: Decimal,
    pub auto_cash_out: Option<Decimal>,
    pub transport_id: TransportId,
}

/// Result of a successful cash-out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashOutReceipt {
    pub round_id: Uuid,
    pub multiplier: Decimal,
    pub payout: Decimal,
    pub auto: bool,
}

/// Point-in-time view of the current round. Never exposes the crash time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    pub round_id: Uuid,
    pub state: RoundState,
    pub start_time: DateTime<Utc>,
    pub observers: usize,
    pub active: Vec<BetView>,
    pub pending: Vec<BetView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_round_wire_shape() {
        let record = FinishedRound {
            id: Uuid::nil(),
            start_time: 1_700_000_000,
            duration: 4_250,
            multiplier: "1.29".parse().unwrap(),
            players: 3,
            winners: 1,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["startTime"], 1_700_000_000);
        assert_eq!(json["duration"], 4_250);
        assert_eq!(json["multiplier"], "1.29");
        assert_eq!(json["players"], 3);
        assert_eq!(json["winners"], 1);
    }

    #[test]
    fn test_threshold_at_one_means_manual() {
        let bet = Bet::new(PlaceBetRequest {
            wallet: "0xabc".into(),
            currency: "USDC".into(),
            stake: Decimal::TEN,
            auto_cash_out: Some(Decimal::ONE),
            transport_id: "ws_1".into(),
        });
        assert_eq!(bet.auto_cash_out, None);
        assert!(!bet.is_cashed_out());
    }
}
