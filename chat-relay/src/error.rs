use thiserror::Error;

/// Errors raised while turning command-line input into relay settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid UTC offset '{value}': {reason}")]
    InvalidUtcOffset { value: String, reason: &'static str },
}
