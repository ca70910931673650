use semsync::auth::CredentialClass;
use semsync::provider::RateUsage;
use serde::Serialize;

use crate::commands::shared::{CommandResult, OutputFormat, Session, format_duration};
use crate::config::Config;

/// Rate limit information for display.
#[derive(Debug, Clone, Serialize, tabled::Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Credential")]
    pub class: String,
    #[tabled(rename = "Limit")]
    pub limit: u32,
    #[tabled(rename = "Used")]
    pub used: u32,
    #[tabled(rename = "Remaining")]
    pub remaining: u32,
    #[tabled(rename = "Usage %")]
    pub usage_percent: String,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
}

impl From<&RateUsage> for RateLimitDisplay {
    fn from(usage: &RateUsage) -> Self {
        let usage_percent = if usage.limit > 0 {
            (f64::from(usage.used) / f64::from(usage.limit)) * 100.0
        } else {
            0.0
        };
        let reset_in = usage.reset_at.signed_duration_since(chrono::Utc::now());

        Self {
            class: usage.class.to_string(),
            limit: usage.limit,
            used: usage.used,
            remaining: usage.remaining,
            usage_percent: format!("{usage_percent:.1}%"),
            reset_at: usage.reset_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            reset_in: format_duration(reset_in),
        }
    }
}

/// Show the call budget of every credential class.
///
/// The provider is pinged first so a budget the remote reports in its
/// response headers is taken into account.
pub(crate) async fn handle_limits(config: &Config, output: OutputFormat) -> CommandResult {
    let session = Session::open(config)?;
    let provider = session.engine.provider();
    if !provider.is_available().await {
        tracing::warn!(provider = %provider.name(), "Provider unreachable, showing local counters only");
    }

    let items = CredentialClass::ALL
        .iter()
        .map(|class| RateLimitDisplay::from(&session.limiter.usage(*class)))
        .collect();
    output.print(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_from_usage() {
        let usage = RateUsage {
            class: CredentialClass::OAuth,
            used: 45,
            limit: 4_500,
            remaining: 4_455,
            reset_at: chrono::Utc::now() + chrono::Duration::minutes(30),
        };

        let display = RateLimitDisplay::from(&usage);
        assert_eq!(display.class, "oauth");
        assert_eq!(display.usage_percent, "1.0%");
        assert!(display.reset_in.ends_with('m'));
    }

    #[test]
    fn test_display_with_zero_limit() {
        let usage = RateUsage {
            class: CredentialClass::Installation,
            used: 0,
            limit: 0,
            remaining: 0,
            reset_at: chrono::Utc::now(),
        };
        let display = RateLimitDisplay::from(&usage);
        assert_eq!(display.usage_percent, "0.0%");
        assert_eq!(display.reset_in, "now");
    }
}
