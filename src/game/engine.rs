//! Round state machine and scheduler
//!
//! One [`CrashGame`] drives one round at a time through
//! STOPPED → WAITING → RUNNING → CRASHED → WAITING ... All mutable round
//! state sits behind a single async mutex. Client commands and timer
//! callbacks both go through it, so every transition is totally ordered.
//! Timer callbacks carry the id of the round that armed them and do nothing
//! if the round has moved on.

use crate::config::GameConfig;
use crate::errors::{GameError, LedgerError};
use crate::game::calculator::GrowthCurve;
use crate::game::events::{self, EventSink, GameEvent};
use crate::game::observers::ObserverRegistry;
use crate::game::participants::ParticipantRegistry;
use crate::game::randomness::{DurationSource, UniformDuration};
use crate::game::timers::{self, TimerHandle};
use crate::game::types::{
    Bet, BetView, CashOutReceipt, FinishedRound, PlaceBetRequest, RoundSnapshot, RoundState,
    TransportId,
};
use crate::ledger::Ledger;
use crate::metrics::GameMetrics;
use crate::round_store::RoundStore;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum TimerAction {
    Start(Uuid),
    Crash(Uuid),
    NextRound(Uuid),
    AutoCashOut(Uuid, String),
}

struct RoundSession {
    id: Uuid,
    state: RoundState,
    start_time: DateTime<Utc>,
    start_instant: Instant,
    duration: Duration,
    participants: ParticipantRegistry,
    observers: ObserverRegistry,
    start_timer: Option<TimerHandle>,
    crash_timer: Option<TimerHandle>,
    next_round_timer: Option<TimerHandle>,
}

impl RoundSession {
    fn new() -> Self {
        Self {
            id: Uuid::nil(),
            state: RoundState::Stopped,
            start_time: Utc::now(),
            start_instant: Instant::now(),
            duration: Duration::ZERO,
            participants: ParticipantRegistry::new(),
            observers: ObserverRegistry::new(),
            start_timer: None,
            crash_timer: None,
            next_round_timer: None,
        }
    }

    fn cancel_phase_timers(&mut self) {
        for timer in [
            self.start_timer.take(),
            self.crash_timer.take(),
            self.next_round_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.cancel();
        }
    }

    fn waiting_event(&self) -> GameEvent {
        GameEvent::RoundWaiting {
            round_id: self.id,
            start_time: self.start_time,
        }
    }

    fn bet_list_event(&self) -> GameEvent {
        GameEvent::BetList {
            active: self.participants.active_views(),
            pending: self.participants.pending_views(),
        }
    }

    fn ensure_not_joined(&self, wallet: &str) -> Result<(), GameError> {
        if self.participants.has_active(wallet) || self.participants.has_pending(wallet) {
            return Err(GameError::AlreadyJoined);
        }
        Ok(())
    }
}

struct GameInner {
    session: Mutex<RoundSession>,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn RoundStore>,
    durations: Arc<dyn DurationSource>,
    curve: GrowthCurve,
    wait_time: Duration,
    metrics: Arc<GameMetrics>,
}

/// Handle to the round engine. Cheap to clone; all clones drive the same
/// round.
#[derive(Clone)]
pub struct CrashGame {
    inner: Arc<GameInner>,
}

impl CrashGame {
    /// Engine drawing round lengths uniformly from the configured bound
    pub fn new(config: &GameConfig, ledger: Arc<dyn Ledger>, store: Arc<dyn RoundStore>) -> Self {
        let durations = Arc::new(UniformDuration::new(config.max_round_duration()));
        Self::with_duration_source(config, ledger, store, durations)
    }

    pub fn with_duration_source(
        config: &GameConfig,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn RoundStore>,
        durations: Arc<dyn DurationSource>,
    ) -> Self {
        Self {
            inner: Arc::new(GameInner {
                session: Mutex::new(RoundSession::new()),
                ledger,
                store,
                durations,
                curve: GrowthCurve::new(config.growth_rate),
                wait_time: config.wait_time(),
                metrics: Arc::new(GameMetrics::new()),
            }),
        }
    }

    pub fn metrics(&self) -> Arc<GameMetrics> {
        self.inner.metrics.clone()
    }

    pub fn curve(&self) -> GrowthCurve {
        self.inner.curve
    }

    async fn lock(&self) -> MutexGuard<'_, RoundSession> {
        self.inner.session.lock().await
    }

    // ---------------------------------------------------------------------
    // Transport commands
    // ---------------------------------------------------------------------

    /// Register a transport. Starts a round if the game is idle, otherwise
    /// replays the pending WAITING announcement to the newcomer.
    pub async fn connect(&self, transport_id: TransportId, sink: EventSink) {
        let mut session = self.lock().await;
        let (_, created) = session.observers.connect(transport_id.clone(), sink);
        debug!(%transport_id, created, observers = session.observers.len(), "observer connected");

        match session.state {
            RoundState::Stopped => self.create_round(&mut session),
            RoundState::Waiting if created => {
                let event = session.waiting_event();
                events::send_to(&session.observers, &transport_id, event);
            }
            _ => {}
        }
    }

    /// Attach a wallet to a transport and push its balances to it
    pub async fn identify(&self, transport_id: &str, wallet: String) {
        let known = self
            .lock()
            .await
            .observers
            .identify(transport_id, wallet.clone());
        if !known {
            debug!(%transport_id, "identify for unknown transport ignored");
            return;
        }

        match self.inner.ledger.balances(&wallet).await {
            Ok(balances) => {
                let session = self.lock().await;
                events::send_to(&session.observers, transport_id, GameEvent::BalanceInit { balances });
            }
            Err(e) => debug!(%wallet, error = %e, "balance lookup on identify failed"),
        }
    }

    pub async fn disconnect(&self, transport_id: &str) {
        let mut session = self.lock().await;
        if session.observers.disconnect(transport_id).is_some() {
            debug!(%transport_id, observers = session.observers.len(), "observer disconnected");
        }
    }

    /// Join the current round (WAITING, debited now) or queue for the next
    /// one (RUNNING, debited when the current round crashes).
    pub async fn place_bet(&self, request: PlaceBetRequest) -> Result<BetView, GameError> {
        if request.stake <= Decimal::ZERO {
            return Err(GameError::InvalidAmount(request.stake));
        }

        self.lock().await.ensure_not_joined(&request.wallet)?;

        // Balance check runs unlocked; state is re-validated afterwards
        let balance = self
            .inner
            .ledger
            .balance(&request.wallet, &request.currency)
            .await
            .map_err(|e| {
                GameMetrics::incr(&self.inner.metrics.ledger_failures);
                GameError::from(e)
            })?;
        if balance < request.stake {
            return Err(GameError::InsufficientFunds);
        }

        let mut session = self.lock().await;
        session.ensure_not_joined(&request.wallet)?;

        let bet = Bet::new(request);
        let view = bet.view();
        match session.state {
            RoundState::Waiting => {
                self.inner
                    .ledger
                    .debit(&bet.wallet, &bet.currency, bet.stake, "Bet placed", session.id)
                    .await
                    .map_err(|e| match e {
                        LedgerError::InsufficientFunds { .. } => GameError::InsufficientFunds,
                        other => {
                            GameMetrics::incr(&self.inner.metrics.ledger_failures);
                            GameError::Ledger(other)
                        }
                    })?;
                session.participants.add_active_bet(bet)?;
            }
            RoundState::Running => session.participants.add_pending_bet(bet)?,
            RoundState::Stopped | RoundState::Crashed => return Err(GameError::WrongState),
        }

        GameMetrics::incr(&self.inner.metrics.bets_placed);
        info!(
            round_id = %session.id,
            wallet = %view.wallet,
            stake = %view.stake,
            state = %session.state,
            "🎲 Bet placed"
        );
        let event = session.bet_list_event();
        events::broadcast(&session.observers, &event);
        Ok(view)
    }

    /// Withdraw a queued bet at any time, or an active bet before the round
    /// starts (stake is refunded).
    pub async fn cancel_bet(&self, wallet: &str) -> Result<(), GameError> {
        let mut session = self.lock().await;

        if session.participants.has_pending(wallet) {
            session.participants.remove_pending_bet(wallet)?;
        } else if session.participants.has_active(wallet) {
            if session.state != RoundState::Waiting {
                return Err(GameError::WrongState);
            }
            let bet = session.participants.remove_active_bet(wallet)?;
            self.refund(&bet, "Bet cancelled", session.id).await;
        } else {
            return Err(GameError::NotFound);
        }

        GameMetrics::incr(&self.inner.metrics.bets_cancelled);
        info!(round_id = %session.id, %wallet, "Bet cancelled");
        let event = session.bet_list_event();
        events::broadcast(&session.observers, &event);
        Ok(())
    }

    /// Manual cash-out at the current multiplier
    pub async fn cash_out(&self, wallet: &str) -> Result<CashOutReceipt, GameError> {
        self.resolve_cash_out(wallet, false, None).await
    }

    async fn resolve_cash_out(
        &self,
        wallet: &str,
        auto: bool,
        armed_for: Option<Uuid>,
    ) -> Result<CashOutReceipt, GameError> {
        let (receipt, bet_currency, transport_id) = {
            let mut session = self.lock().await;
            if session.state != RoundState::Running {
                return Err(GameError::WrongState);
            }
            if armed_for.map_or(false, |id| id != session.id) {
                return Err(GameError::WrongState);
            }

            // The crash callback may still be queued behind this lock; a
            // request that arrives at or past the crash point has lost
            let elapsed = Instant::now().saturating_duration_since(session.start_instant);
            if elapsed >= session.duration {
                return Err(GameError::WrongState);
            }
            let outcome =
                session
                    .participants
                    .resolve_cash_out(wallet, elapsed, auto, &self.inner.curve)?;
            let bet = session
                .participants
                .active_bet(wallet)
                .ok_or(GameError::NotFound)?;

            let won = GameEvent::PlayerWon {
                wallet: bet.wallet.clone(),
                currency: bet.currency.clone(),
                stake: bet.stake,
                multiplier: outcome.multiplier,
                payout: outcome.payout,
                auto,
            };
            let currency = bet.currency.clone();
            let transport_id = bet.transport_id.clone();
            events::broadcast(&session.observers, &won);

            GameMetrics::incr(if auto {
                &self.inner.metrics.auto_cash_outs
            } else {
                &self.inner.metrics.cash_outs
            });
            info!(
                round_id = %session.id,
                %wallet,
                multiplier = %outcome.multiplier,
                payout = %outcome.payout,
                auto,
                "💰 Cash-out"
            );

            (
                CashOutReceipt {
                    round_id: session.id,
                    multiplier: outcome.multiplier,
                    payout: outcome.payout,
                    auto,
                },
                currency,
                transport_id,
            )
        };

        let reason = if auto { "Auto cashout" } else { "Cashout" };
        let credited = self
            .inner
            .ledger
            .credit(wallet, &bet_currency, receipt.payout, reason, receipt.round_id)
            .await;

        let session = self.lock().await;
        match credited {
            Ok(balance) => {
                events::send_to(
                    &session.observers,
                    &transport_id,
                    GameEvent::BalanceUpdate {
                        currency: bet_currency,
                        balance,
                    },
                );
            }
            Err(e) => {
                // The win stands; the credit has to be reconciled out of band
                GameMetrics::incr(&self.inner.metrics.ledger_failures);
                error!(
                    round_id = %receipt.round_id,
                    %wallet,
                    payout = %receipt.payout,
                    error = %e,
                    "❌ Failed to credit cash-out"
                );
            }
        }
        let event = session.bet_list_event();
        events::broadcast(&session.observers, &event);

        Ok(receipt)
    }

    pub async fn snapshot(&self) -> RoundSnapshot {
        let session = self.lock().await;
        RoundSnapshot {
            round_id: session.id,
            state: session.state,
            start_time: session.start_time,
            observers: session.observers.len(),
            active: session.participants.active_views(),
            pending: session.participants.pending_views(),
        }
    }

    pub async fn recent_rounds(&self, limit: usize) -> Result<Vec<FinishedRound>, GameError> {
        Ok(self.inner.store.recent(limit).await?)
    }

    pub async fn round(&self, id: Uuid) -> Result<Option<FinishedRound>, GameError> {
        Ok(self.inner.store.get(id).await?)
    }

    /// Disarm every timer. The current round freezes where it is.
    pub async fn shutdown(&self) {
        let mut session = self.lock().await;
        session.cancel_phase_timers();
        session.participants.cancel_all_timers();
        info!(round_id = %session.id, state = %session.state, "Round engine stopped");
    }

    // ---------------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------------

    fn schedule_at(&self, deadline: Instant, action: TimerAction) -> TimerHandle {
        let game = self.clone();
        timers::schedule_at(deadline, move || async move { game.fire(action).await })
    }

    async fn fire(self, action: TimerAction) {
        match action {
            TimerAction::Start(id) => self.start_round(id).await,
            TimerAction::Crash(id) => self.crash_round(id).await,
            TimerAction::NextRound(id) => self.next_round(id).await,
            TimerAction::AutoCashOut(id, wallet) => {
                if let Err(e) = self.resolve_cash_out(&wallet, true, Some(id)).await {
                    debug!(round_id = %id, %wallet, error = %e, "auto cash-out skipped");
                }
            }
        }
    }

    fn create_round(&self, session: &mut RoundSession) {
        let duration = match self.inner.durations.draw() {
            Ok(duration) => duration,
            Err(e) => {
                GameMetrics::incr(&self.inner.metrics.randomness_failures);
                error!(error = %e, "❌ Could not draw round duration, game halted");
                session.state = RoundState::Stopped;
                return;
            }
        };

        session.cancel_phase_timers();
        session.id = Uuid::now_v7();
        session.state = RoundState::Waiting;
        session.duration = duration;
        session.start_instant = Instant::now() + self.inner.wait_time;
        session.start_time =
            Utc::now() + chrono::Duration::milliseconds(self.inner.wait_time.as_millis() as i64);

        session.start_timer =
            Some(self.schedule_at(session.start_instant, TimerAction::Start(session.id)));

        info!(
            round_id = %session.id,
            start_time = %session.start_time,
            bets = session.participants.players(),
            "🕐 Round waiting"
        );
        let event = session.waiting_event();
        events::broadcast(&session.observers, &event);
    }

    async fn start_round(&self, id: Uuid) {
        let mut session = self.lock().await;
        if session.id != id || session.state != RoundState::Waiting {
            return;
        }
        session.start_timer = None;

        if session.observers.is_empty() {
            session.state = RoundState::Stopped;
            session.cancel_phase_timers();
            GameMetrics::incr(&self.inner.metrics.rounds_aborted);

            let stranded = session.participants.take_active();
            for bet in &stranded {
                self.refund(bet, "Round aborted", id).await;
            }
            info!(round_id = %id, refunded = stranded.len(), "⏹️ No observers, round aborted");
            return;
        }

        session.state = RoundState::Running;
        let round_start = session.start_instant;
        let crash_at = round_start + session.duration;

        let armed = session.participants.arm_auto_cash_outs(&self.inner.curve, |bet, delay| {
            self.schedule_at(round_start + delay, TimerAction::AutoCashOut(id, bet.wallet.clone()))
        });
        session.crash_timer = Some(self.schedule_at(crash_at, TimerAction::Crash(id)));

        GameMetrics::incr(&self.inner.metrics.rounds_started);
        info!(
            round_id = %id,
            players = session.participants.players(),
            auto_cash_outs = armed,
            "🚀 Round running"
        );
        let event = GameEvent::RoundRunning {
            round_id: id,
            start_time: session.start_time,
        };
        events::broadcast(&session.observers, &event);
    }

    async fn crash_round(&self, id: Uuid) {
        let mut session = self.lock().await;
        if session.id != id || session.state != RoundState::Running {
            return;
        }
        session.crash_timer = None;
        session.state = RoundState::Crashed;

        for bet in session.participants.losers() {
            let event = GameEvent::PlayerLost {
                wallet: bet.wallet.clone(),
            };
            events::broadcast(&session.observers, &event);
        }

        let record = FinishedRound {
            id,
            start_time: session.start_time.timestamp(),
            duration: session.duration.as_millis() as u64,
            multiplier: self.inner.curve.multiplier_for_elapsed(session.duration),
            players: session.participants.players() as u32,
            winners: session.participants.winners() as u32,
        };
        if let Err(e) = self.inner.store.append(&record).await {
            GameMetrics::incr(&self.inner.metrics.store_failures);
            error!(round_id = %id, error = %e, "❌ Failed to persist round record");
        }

        session.participants.cancel_all_timers();
        let queued = session.participants.pending_len();
        let committed = session
            .participants
            .commit_pending_to_active(self.inner.ledger.as_ref(), id)
            .await;
        GameMetrics::add(
            &self.inner.metrics.bets_dropped,
            queued.saturating_sub(committed.len()) as u64,
        );

        GameMetrics::incr(&self.inner.metrics.rounds_crashed);
        info!(
            round_id = %id,
            multiplier = %record.multiplier,
            players = record.players,
            winners = record.winners,
            next_round_bets = committed.len(),
            "💥 Round crashed"
        );
        events::broadcast(&session.observers, &GameEvent::RoundCrashed { round: record });
        let event = session.bet_list_event();
        events::broadcast(&session.observers, &event);

        session.next_round_timer = Some(self.schedule_at(
            Instant::now() + self.inner.wait_time,
            TimerAction::NextRound(id),
        ));
    }

    async fn next_round(&self, id: Uuid) {
        let mut session = self.lock().await;
        if session.id != id || session.state != RoundState::Crashed {
            return;
        }
        session.next_round_timer = None;
        self.create_round(&mut session);
    }

    async fn refund(&self, bet: &Bet, reason: &str, round_id: Uuid) {
        if let Err(e) = self
            .inner
            .ledger
            .credit(&bet.wallet, &bet.currency, bet.stake, reason, round_id)
            .await
        {
            GameMetrics::incr(&self.inner.metrics.ledger_failures);
            warn!(
                %round_id,
                wallet = %bet.wallet,
                stake = %bet.stake,
                error = %e,
                "refund failed"
            );
        }
    }
}
