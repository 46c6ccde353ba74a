use governor::{clock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;

use crate::config::RateLimitConfig;

/// Token-bucket limiter in front of IPC command handling, so a misbehaving
/// client cannot flood the session with trigger/cancel cycles.
pub struct CommandRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, clock::DefaultClock>,
    enabled: bool,
}

impl CommandRateLimiter {
    /// Panics if `commands_per_second` or `burst_capacity` is zero.
    pub fn new(config: &RateLimitConfig) -> Self {
        let quota = Quota::per_second(Self::non_zero(config.commands_per_second))
            .allow_burst(Self::non_zero(config.burst_capacity));

        Self {
            limiter: RateLimiter::direct(quota),
            enabled: config.enabled,
        }
    }

    /// Immediate check, never waits: true when the command may proceed.
    pub fn check(&self) -> bool {
        if !self.enabled {
            return true;
        }
        self.limiter.check().is_ok()
    }

    fn non_zero(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).expect("rate limit values must be non-zero")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(per_second: u32, burst: u32, enabled: bool) -> RateLimitConfig {
        RateLimitConfig {
            commands_per_second: per_second,
            burst_capacity: burst,
            enabled,
        }
    }

    #[test]
    fn test_first_command_allowed() {
        let limiter = CommandRateLimiter::new(&config(10, 20, true));
        assert!(limiter.check());
    }

    #[test]
    fn test_disabled_always_allows() {
        let limiter = CommandRateLimiter::new(&config(1, 1, false));
        for _ in 0..100 {
            assert!(limiter.check());
        }
    }

    #[test]
    fn test_burst_exhaustion() {
        let limiter = CommandRateLimiter::new(&config(10, 20, true));
        for _ in 0..20 {
            assert!(limiter.check(), "burst capacity should allow 20 commands");
        }
        assert!(!limiter.check(), "21st immediate command should be limited");
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_rate_panics() {
        CommandRateLimiter::new(&config(0, 20, true));
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_burst_panics() {
        CommandRateLimiter::new(&config(10, 0, true));
    }
}
