use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::Clock;
use governor::state::keyed::HashMapStateStore;
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::auth::CredentialClass;
use crate::http::{HttpHeaders, header_get};

/// Default call budgets.
///
/// Quotas sit below the real remote limits so that other tools sharing a
/// credential do not push it over.
pub mod rate_limits {
    /// GitHub: 5000 requests/hour for user tokens, we budget 4500.
    pub const PERSONAL_TOKEN_HOURLY_QUOTA: u32 = 4_500;
    /// OAuth user-to-server tokens share the user's 5000/hour.
    pub const OAUTH_HOURLY_QUOTA: u32 = 4_500;
    /// Installation tokens start at 5000/hour.
    pub const INSTALLATION_HOURLY_QUOTA: u32 = 4_500;
    /// Minimum spacing between two calls on one credential class.
    pub const MIN_CALL_SPACING_MS: u64 = 250;
    /// Length of the budget window.
    pub const WINDOW_SECS: u64 = 3_600;
    /// Remaining-calls threshold below which a warning is logged.
    pub const LOW_WATER_MARK: u32 = 100;
}

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub personal_token_quota: u32,
    pub oauth_quota: u32,
    pub installation_quota: u32,
    pub min_spacing_ms: u64,
    pub window_secs: u64,
    pub low_water_mark: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            personal_token_quota: rate_limits::PERSONAL_TOKEN_HOURLY_QUOTA,
            oauth_quota: rate_limits::OAUTH_HOURLY_QUOTA,
            installation_quota: rate_limits::INSTALLATION_HOURLY_QUOTA,
            min_spacing_ms: rate_limits::MIN_CALL_SPACING_MS,
            window_secs: rate_limits::WINDOW_SECS,
            low_water_mark: rate_limits::LOW_WATER_MARK,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn quota_for(&self, class: CredentialClass) -> u32 {
        match class {
            CredentialClass::PersonalToken => self.personal_token_quota,
            CredentialClass::OAuth => self.oauth_quota,
            CredentialClass::Installation => self.installation_quota,
        }
    }

    fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Snapshot of one credential class's budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateUsage {
    pub class: CredentialClass,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Budget reported by a remote in its `x-ratelimit-*` response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Extract rate limit info from `x-ratelimit-*` headers (GitHub and Gitea use the same names).
#[must_use]
pub fn parse_rate_limit_headers(headers: &HttpHeaders) -> Option<RateLimitInfo> {
    let limit = header_get(headers, "x-ratelimit-limit")?.parse::<u32>().ok()?;
    let remaining = header_get(headers, "x-ratelimit-remaining")?
        .parse::<u32>()
        .ok()?;
    let reset_epoch = header_get(headers, "x-ratelimit-reset")?.parse::<i64>().ok()?;
    let reset_at = DateTime::from_timestamp(reset_epoch, 0).unwrap_or_else(Utc::now);
    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
    })
}

#[derive(Debug)]
struct Budget {
    used: u32,
    window_start: Instant,
    /// Set when the remote reports its own budget as exhausted.
    blocked_until: Option<Instant>,
    warned: bool,
}

impl Budget {
    fn new(now: Instant) -> Self {
        Self {
            used: 0,
            window_start: now,
            blocked_until: None,
            warned: false,
        }
    }
}

/// Governor clock that reads tokio's clock, so paused test time drives the
/// spacing limiter as well as the window counter.
#[derive(Debug, Clone)]
struct TokioClock {
    origin: Instant,
    reference: std::time::Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            reference: std::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        self.reference + self.origin.elapsed()
    }
}

type SpacingLimiter = GovernorRateLimiter<
    CredentialClass,
    HashMapStateStore<CredentialClass>,
    TokioClock,
    governor::middleware::NoOpMiddleware<std::time::Instant>,
>;

struct Inner {
    config: RateLimitConfig,
    budgets: Mutex<HashMap<CredentialClass, Budget>>,
    /// `None` when the minimum spacing is zero.
    spacing: Option<SpacingLimiter>,
    clock: TokioClock,
}

/// Call budget shared by every backend that uses the same credential class.
///
/// Construct one instance per process and hand clones to each backend; clones
/// share state, which is what keeps several sync sessions on one credential
/// inside a single budget. State is memory-only.
///
/// # Example
///
/// ```ignore
/// use semsync::provider::RateLimiter;
/// use semsync::auth::CredentialClass;
///
/// let limiter = RateLimiter::default();
/// limiter.admit(CredentialClass::PersonalToken).await;
/// let response = transport.send(request).await;
/// limiter.record(CredentialClass::PersonalToken);
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let clock = TokioClock::new();
        let spacing = Quota::with_period(config.min_spacing())
            .map(|quota| GovernorRateLimiter::hashmap_with_clock(quota, clock.clone()));
        Self {
            inner: Arc::new(Inner {
                config,
                budgets: Mutex::new(HashMap::new()),
                spacing,
                clock,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.inner.config
    }

    fn with_budget<T>(&self, class: CredentialClass, f: impl FnOnce(&mut Budget, Instant) -> T) -> T {
        let mut budgets = self
            .inner
            .budgets
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let budget = budgets.entry(class).or_insert_with(|| Budget::new(now));

        // Lazy window reset: the first access after the window elapsed starts a new one.
        if now.duration_since(budget.window_start) >= self.inner.config.window() {
            budget.used = 0;
            budget.window_start = now;
            budget.warned = false;
        }

        f(budget, now)
    }

    /// Wait until a call on `class` may proceed.
    ///
    /// Suspends until the window resets when the quota is used up, then for the
    /// remainder of the minimum spacing. Admission takes its slot out of the
    /// window budget before returning, so calls still in flight count against
    /// the quota.
    pub async fn admit(&self, class: CredentialClass) {
        self.reserve(class).await;
        self.wait_for_spacing(class).await;
    }

    async fn reserve(&self, class: CredentialClass) {
        let quota = self.inner.config.quota_for(class);
        let window = self.inner.config.window();

        loop {
            let wait = self.with_budget(class, |budget, now| {
                if let Some(until) = budget.blocked_until
                    && until > now
                {
                    return Some(until - now);
                }
                budget.blocked_until = None;

                if budget.used >= quota {
                    return Some((budget.window_start + window).saturating_duration_since(now));
                }

                budget.used += 1;
                None
            });

            match wait {
                None => return,
                Some(delay) => {
                    tracing::debug!(
                        class = %class,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limiter delaying call"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn wait_for_spacing(&self, class: CredentialClass) {
        let Some(spacing) = &self.inner.spacing else {
            return;
        };
        while let Err(not_until) = spacing.check_key(&class) {
            let delay = not_until.wait_time_from(self.inner.clock.now());
            tracing::trace!(
                class = %class,
                delay_ms = delay.as_millis() as u64,
                "Waiting for call spacing"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Register that an admitted call on `class` completed.
    ///
    /// The slot itself was taken by [`RateLimiter::admit`]; this only warns once
    /// per window when the remaining budget drops to the low-water mark.
    pub fn record(&self, class: CredentialClass) {
        let quota = self.inner.config.quota_for(class);
        let low_water = self.inner.config.low_water_mark;

        self.with_budget(class, |budget, _now| {
            let remaining = quota.saturating_sub(budget.used);
            if remaining <= low_water && !budget.warned {
                budget.warned = true;
                tracing::warn!(
                    class = %class,
                    remaining,
                    limit = quota,
                    "API call budget running low"
                );
            }
        });
    }

    /// Apply a remote-reported budget.
    ///
    /// When the remote says nothing is left, admission is suspended until its
    /// reset time regardless of the local count.
    pub fn observe_remote(&self, class: CredentialClass, remaining: u32, reset_at: DateTime<Utc>) {
        if remaining > 0 {
            return;
        }
        let delay = (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.with_budget(class, |budget, now| {
            budget.blocked_until = Some(now + delay);
        });
        tracing::warn!(
            class = %class,
            reset_at = %reset_at,
            "Remote reports call budget exhausted"
        );
    }

    /// Apply the budget reported in a response's headers, if any.
    pub fn observe_headers(&self, class: CredentialClass, headers: &HttpHeaders) {
        if let Some(info) = parse_rate_limit_headers(headers) {
            self.observe_remote(class, info.remaining, info.reset_at);
        }
    }

    /// Current usage for `class`.
    #[must_use]
    pub fn usage(&self, class: CredentialClass) -> RateUsage {
        let limit = self.inner.config.quota_for(class);
        let window = self.inner.config.window();

        self.with_budget(class, |budget, now| {
            let until_reset = (budget.window_start + window).saturating_duration_since(now);
            let reset_at = Utc::now()
                + chrono::Duration::from_std(until_reset).unwrap_or_else(|_| chrono::Duration::zero());
            RateUsage {
                class,
                used: budget.used,
                limit,
                remaining: limit.saturating_sub(budget.used),
                reset_at,
            }
        })
    }
}
