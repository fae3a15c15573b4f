use std::time::Duration;

use crate::code_generator::ALPHABET_SIZE;
use crate::error::GateError;
use crate::global_limiter::GlobalLimiterConfig;
use crate::per_client_limiter::PerClientConfig;
use crate::shortener::ShortenerConfig;

/// Construction-time checks for the admission and storage components.
///
/// A failure here is fatal for the component being built.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_token_bucket(count: u64, capacity: u64) -> Result<(), GateError> {
        if capacity == 0 {
            return Err(GateError::Validation(
                "Capacity must be a non-zero positive integer".to_string(),
            ));
        }

        if count > capacity {
            return Err(GateError::Validation(format!(
                "Initial count {} must not exceed capacity {}",
                count, capacity
            )));
        }

        Ok(())
    }

    pub fn validate_refill_rate(rate: u64) -> Result<(), GateError> {
        if rate == 0 {
            return Err(GateError::Validation(
                "Refill rate must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_global_limiter(config: &GlobalLimiterConfig) -> Result<(), GateError> {
        Self::validate_token_bucket(config.initial_count, config.capacity)?;
        Self::validate_refill_rate(config.rate_per_second)
    }

    pub fn validate_per_client(config: &PerClientConfig) -> Result<(), GateError> {
        if config.capacity == 0 {
            return Err(GateError::Validation(
                "Distinct client capacity must be greater than 0".to_string(),
            ));
        }

        if config.limit == 0 {
            return Err(GateError::Validation(
                "Requests per window must be greater than 0".to_string(),
            ));
        }

        if config.window.is_zero() {
            return Err(GateError::Validation(
                "Window duration must be greater than 0".to_string(),
            ));
        }

        if config.client_ttl < config.window {
            return Err(GateError::Validation(format!(
                "Client TTL {:?} must be at least the window {:?}",
                config.client_ttl, config.window
            )));
        }

        if config.sweep_interval.is_zero() {
            return Err(GateError::Validation(
                "Sweep interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_shortener(config: &ShortenerConfig) -> Result<(), GateError> {
        if config.capacity < config.min_capacity {
            return Err(GateError::Validation(format!(
                "Capacity has to be at least {}",
                config.min_capacity
            )));
        }

        if config.ttl < config.min_ttl || config.ttl.is_zero() {
            return Err(GateError::Validation(format!(
                "Time to live has to be at least {:?}",
                config.min_ttl.max(Duration::from_nanos(1))
            )));
        }

        if config.code_length == 0 {
            return Err(GateError::Validation(
                "Short code length must be greater than 0".to_string(),
            ));
        }

        // A full store still reports taken codes as collisions, so the generator
        // needs a free code to exist before it can observe the capacity error.
        let code_space = u32::try_from(config.code_length)
            .ok()
            .and_then(|len| (ALPHABET_SIZE as u128).checked_pow(len))
            .unwrap_or(u128::MAX);
        if code_space <= config.capacity as u128 {
            return Err(GateError::Validation(format!(
                "Short code length {} cannot address {} mappings",
                config.code_length, config.capacity
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn per_client() -> PerClientConfig {
        PerClientConfig {
            capacity: 10,
            limit: 3,
            window: Duration::from_secs(1),
            client_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_valid_rate_limit() {
        assert!(ConfigValidator::validate_global_limiter(&GlobalLimiterConfig {
            initial_count: 10,
            capacity: 10,
            rate_per_second: 1,
        })
        .is_ok());
    }

    #[test]
    fn test_invalid_rate_limit() {
        assert!(ConfigValidator::validate_token_bucket(0, 0).is_err());
        assert!(ConfigValidator::validate_token_bucket(2, 1).is_err());
        assert!(ConfigValidator::validate_refill_rate(0).is_err());
    }

    #[test]
    fn test_valid_per_client() {
        assert!(ConfigValidator::validate_per_client(&per_client()).is_ok());
    }

    #[test]
    fn test_invalid_per_client() {
        let mut config = per_client();
        config.capacity = 0;
        assert!(ConfigValidator::validate_per_client(&config).is_err());

        let mut config = per_client();
        config.limit = 0;
        assert!(ConfigValidator::validate_per_client(&config).is_err());

        let mut config = per_client();
        config.window = Duration::ZERO;
        assert!(ConfigValidator::validate_per_client(&config).is_err());

        let mut config = per_client();
        config.client_ttl = Duration::from_millis(500);
        assert!(ConfigValidator::validate_per_client(&config).is_err());
    }

    #[test]
    fn test_shortener_minimums() {
        let config = ShortenerConfig::new(10, Duration::from_secs(1800), 4);
        assert!(ConfigValidator::validate_shortener(&config).is_ok());

        let config = ShortenerConfig::new(9, Duration::from_secs(1800), 4);
        assert!(ConfigValidator::validate_shortener(&config).is_err());

        let config = ShortenerConfig::new(10, Duration::from_secs(60), 4);
        assert!(ConfigValidator::validate_shortener(&config).is_err());

        let config = ShortenerConfig::new(10, Duration::from_secs(1), 4)
            .with_minimums(1, Duration::from_secs(1));
        assert!(ConfigValidator::validate_shortener(&config).is_ok());
    }

    #[test]
    fn test_shortener_code_space() {
        let config = ShortenerConfig::new(100, Duration::from_secs(1800), 1);
        assert!(ConfigValidator::validate_shortener(&config).is_err());

        let config = ShortenerConfig::new(100, Duration::from_secs(1800), 2);
        assert!(ConfigValidator::validate_shortener(&config).is_ok());

        let config = ShortenerConfig::new(100, Duration::from_secs(1800), 0);
        assert!(ConfigValidator::validate_shortener(&config).is_err());
    }
}
