//! Game counters, rendered in Prometheus text format

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct GameMetrics {
    start_time: Instant,
    pub rounds_started: AtomicU64,
    pub rounds_crashed: AtomicU64,
    pub rounds_aborted: AtomicU64,
    pub bets_placed: AtomicU64,
    pub bets_cancelled: AtomicU64,
    pub bets_dropped: AtomicU64,
    pub cash_outs: AtomicU64,
    pub auto_cash_outs: AtomicU64,
    pub ledger_failures: AtomicU64,
    pub store_failures: AtomicU64,
    pub randomness_failures: AtomicU64,
    pub websocket_connections_active: AtomicU64,
}

impl Default for GameMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GameMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rounds_started: AtomicU64::new(0),
            rounds_crashed: AtomicU64::new(0),
            rounds_aborted: AtomicU64::new(0),
            bets_placed: AtomicU64::new(0),
            bets_cancelled: AtomicU64::new(0),
            bets_dropped: AtomicU64::new(0),
            cash_outs: AtomicU64::new(0),
            auto_cash_outs: AtomicU64::new(0),
            ledger_failures: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            randomness_failures: AtomicU64::new(0),
            websocket_connections_active: AtomicU64::new(0),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn to_prometheus_format(&self) -> String {
        let counters: [(&str, &str, &AtomicU64); 11] = [
            ("rounds_started_total", "Rounds that reached RUNNING", &self.rounds_started),
            ("rounds_crashed_total", "Rounds that crashed", &self.rounds_crashed),
            ("rounds_aborted_total", "Rounds aborted for lack of observers", &self.rounds_aborted),
            ("bets_placed_total", "Accepted bets", &self.bets_placed),
            ("bets_cancelled_total", "Withdrawn bets", &self.bets_cancelled),
            ("bets_dropped_total", "Queued bets dropped on failed debit", &self.bets_dropped),
            ("cash_outs_total", "Manual cash-outs", &self.cash_outs),
            ("auto_cash_outs_total", "Automatic cash-outs", &self.auto_cash_outs),
            ("ledger_failures_total", "Failed ledger operations", &self.ledger_failures),
            ("store_failures_total", "Failed round record writes", &self.store_failures),
            ("randomness_failures_total", "Failed round duration draws", &self.randomness_failures),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP crashline_{name} {help}\n\
                 # TYPE crashline_{name} counter\n\
                 crashline_{name} {}\n\n",
                value.load(Ordering::Relaxed)
            ));
        }

        output.push_str(&format!(
            "# HELP crashline_websocket_connections_active Open WebSocket connections\n\
             # TYPE crashline_websocket_connections_active gauge\n\
             crashline_websocket_connections_active {}\n\n",
            self.websocket_connections_active.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP crashline_uptime_seconds Process uptime\n\
             # TYPE crashline_uptime_seconds gauge\n\
             crashline_uptime_seconds {}\n",
            self.uptime_secs()
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_output_contains_counters() {
        let metrics = GameMetrics::new();
        GameMetrics::incr(&metrics.rounds_started);
        GameMetrics::add(&metrics.bets_placed, 3);

        let text = metrics.to_prometheus_format();
        assert!(text.contains("crashline_rounds_started_total 1"));
        assert!(text.contains("crashline_bets_placed_total 3"));
        assert!(text.contains("# TYPE crashline_websocket_connections_active gauge"));
    }
}
