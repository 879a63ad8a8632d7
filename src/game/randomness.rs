//! Source of round lengths
//!
//! Each round's RUNNING phase length is drawn before the round is announced.
//! Production draws come from the operating system's entropy pool.

use crate::errors::GameError;
use rand::rngs::OsRng;
use rand::RngCore;
use std::time::Duration;

pub trait DurationSource: Send + Sync {
    fn draw(&self) -> Result<Duration, GameError>;
}

/// Uniform over `[0, max)` in whole milliseconds
#[derive(Debug, Clone)]
pub struct UniformDuration {
    max_ms: u64,
}

impl UniformDuration {
    pub fn new(max: Duration) -> Self {
        Self {
            max_ms: max.as_millis() as u64,
        }
    }
}

impl DurationSource for UniformDuration {
    fn draw(&self) -> Result<Duration, GameError> {
        if self.max_ms == 0 {
            return Err(GameError::Randomness("empty duration range".to_string()));
        }

        // Rejection sampling keeps the draw unbiased for any bound
        let zone = u64::MAX - (u64::MAX % self.max_ms);
        let mut buf = [0u8; 8];
        loop {
            OsRng
                .try_fill_bytes(&mut buf)
                .map_err(|e| GameError::Randomness(e.to_string()))?;
            let value = u64::from_le_bytes(buf);
            if value < zone {
                return Ok(Duration::from_millis(value % self.max_ms));
            }
        }
    }
}

/// Always the same length. Used where round timing must be reproducible.
#[derive(Debug, Clone)]
pub struct FixedDuration(pub Duration);

impl DurationSource for FixedDuration {
    fn draw(&self) -> Result<Duration, GameError> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_draws_stay_in_range() {
        let source = UniformDuration::new(Duration::from_millis(250));
        for _ in 0..1_000 {
            let d = source.draw().unwrap();
            assert!(d < Duration::from_millis(250));
        }
    }

    #[test]
    fn test_uniform_draws_vary() {
        let source = UniformDuration::new(Duration::from_secs(10));
        let draws: std::collections::HashSet<_> =
            (0..50).map(|_| source.draw().unwrap()).collect();
        assert!(draws.len() > 1);
    }

    #[test]
    fn test_empty_range_is_a_randomness_failure() {
        let source = UniformDuration::new(Duration::ZERO);
        let err = source.draw().unwrap_err();
        assert_eq!(err.code(), "RANDOMNESS_FAILURE");
    }
}
