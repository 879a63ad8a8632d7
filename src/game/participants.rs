//! Bets for the current round and bets queued for the next one
//!
//! Only the engine touches the registry, always while holding the round
//! lock. Money never moves here except in [`ParticipantRegistry::commit_pending_to_active`].

use crate::errors::GameError;
use crate::game::calculator::{payout, GrowthCurve};
use crate::game::timers::TimerHandle;
use crate::game::types::{Bet, BetView, CashOut};
use crate::ledger::Ledger;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    active: Vec<Bet>,
    pending: Vec<Bet>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_active(&self, wallet: &str) -> bool {
        self.active.iter().any(|b| b.wallet == wallet)
    }

    pub fn has_pending(&self, wallet: &str) -> bool {
        self.pending.iter().any(|b| b.wallet == wallet)
    }

    pub fn active_bet(&self, wallet: &str) -> Option<&Bet> {
        self.active.iter().find(|b| b.wallet == wallet)
    }

    pub fn add_active_bet(&mut self, bet: Bet) -> Result<(), GameError> {
        if self.has_active(&bet.wallet) {
            return Err(GameError::AlreadyJoined);
        }
        self.active.push(bet);
        Ok(())
    }

    pub fn add_pending_bet(&mut self, bet: Bet) -> Result<(), GameError> {
        if self.has_pending(&bet.wallet) {
            return Err(GameError::AlreadyJoined);
        }
        self.pending.push(bet);
        Ok(())
    }

    pub fn remove_active_bet(&mut self, wallet: &str) -> Result<Bet, GameError> {
        let index = self
            .active
            .iter()
            .position(|b| b.wallet == wallet)
            .ok_or(GameError::NotFound)?;
        let mut bet = self.active.remove(index);
        bet.cancel_timer();
        Ok(bet)
    }

    pub fn remove_pending_bet(&mut self, wallet: &str) -> Result<Bet, GameError> {
        let index = self
            .pending
            .iter()
            .position(|b| b.wallet == wallet)
            .ok_or(GameError::NotFound)?;
        Ok(self.pending.remove(index))
    }

    /// Stamp the cash-out outcome on `wallet`'s bet and disarm its timer.
    /// The caller is responsible for crediting the payout.
    pub fn resolve_cash_out(
        &mut self,
        wallet: &str,
        elapsed: Duration,
        auto: bool,
        curve: &GrowthCurve,
    ) -> Result<CashOut, GameError> {
        let bet = self
            .active
            .iter_mut()
            .find(|b| b.wallet == wallet)
            .ok_or(GameError::NotFound)?;

        if bet.is_cashed_out() {
            return Err(GameError::AlreadyCashedOut);
        }

        let multiplier = curve.multiplier_for_elapsed(elapsed);
        let outcome = CashOut {
            at: Utc::now(),
            elapsed,
            multiplier,
            payout: payout(bet.stake, multiplier),
            auto,
            cashed_out: true,
        };

        bet.cancel_timer();
        bet.cash_out = Some(outcome.clone());
        Ok(outcome)
    }

    /// Debit every pending bet and make the ones that succeed the new active
    /// set. Failed debits drop the bet. Pending is always left empty.
    pub async fn commit_pending_to_active(
        &mut self,
        ledger: &dyn Ledger,
        round_id: Uuid,
    ) -> Vec<BetView> {
        let queued = std::mem::take(&mut self.pending);
        let mut committed = Vec::with_capacity(queued.len());

        for bet in queued {
            match ledger
                .debit(&bet.wallet, &bet.currency, bet.stake, "Bet placed", round_id)
                .await
            {
                Ok(balance) => {
                    debug!(wallet = %bet.wallet, stake = %bet.stake, %balance, "queued bet committed");
                    committed.push(bet);
                }
                Err(e) => {
                    warn!(
                        wallet = %bet.wallet,
                        currency = %bet.currency,
                        stake = %bet.stake,
                        error = %e,
                        "dropping queued bet, debit failed"
                    );
                }
            }
        }

        self.cancel_all_timers();
        self.active = committed;
        self.active_views()
    }

    /// Arm one auto cash-out per bet that has a usable threshold.
    /// `schedule` receives the bet and its delay from round start.
    pub fn arm_auto_cash_outs<F>(&mut self, curve: &GrowthCurve, mut schedule: F) -> usize
    where
        F: FnMut(&Bet, Duration) -> TimerHandle,
    {
        let mut armed = 0;
        for bet in self.active.iter_mut() {
            if bet.is_cashed_out() {
                continue;
            }
            let Some(delay) = bet.auto_cash_out.and_then(|t| curve.auto_cash_out_delay(t)) else {
                continue;
            };
            bet.cancel_timer();
            let handle = schedule(bet, delay);
            bet.timer = Some(handle);
            armed += 1;
        }
        armed
    }

    pub fn cancel_all_timers(&mut self) {
        for bet in self.active.iter_mut() {
            bet.cancel_timer();
        }
    }

    /// Drain the active set, e.g. to refund stakes of a round that never ran
    pub fn take_active(&mut self) -> Vec<Bet> {
        self.cancel_all_timers();
        std::mem::take(&mut self.active)
    }

    /// Wallets whose active bet has not cashed out
    pub fn losers(&self) -> impl Iterator<Item = &Bet> {
        self.active.iter().filter(|b| !b.is_cashed_out())
    }

    pub fn players(&self) -> usize {
        self.active.len()
    }

    pub fn winners(&self) -> usize {
        self.active.iter().filter(|b| b.is_cashed_out()).count()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_views(&self) -> Vec<BetView> {
        self.active.iter().map(Bet::view).collect()
    }

    pub fn pending_views(&self) -> Vec<BetView> {
        self.pending.iter().map(Bet::view).collect()
    }
}
