//! Tracing setup and masking helpers for sensitive payment data

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_tracing(config: &LoggingConfig) {
    let level = config.level.to_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", level)));

    let json = config.format == LogFormat::Json;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    // A subscriber may already be installed (tests, embedding); keep the first one.
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}

/// Keep only the last four digits of a card number.
pub fn mask_card_number(card_number: &str) -> String {
    let digits: Vec<char> = card_number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 4 {
        return "****".to_string();
    }
    let last_four: String = digits[digits.len() - 4..].iter().collect();
    format!("****{}", last_four)
}

/// Mask a secret or token, keeping a short prefix for correlation.
pub fn mask_secret(secret: &str) -> String {
    if secret.len() <= 8 {
        return "********".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}********", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_numbers_keep_last_four() {
        assert_eq!(mask_card_number("4242 4242 4242 4242"), "****4242");
        assert_eq!(mask_card_number("4111111111111111"), "****1111");
        assert_eq!(mask_card_number("123"), "****");
    }

    #[test]
    fn secrets_keep_short_prefix() {
        assert_eq!(mask_secret("skey_test_5abcdef"), "skey********");
        assert_eq!(mask_secret("short"), "********");
    }
}
