//! # Per-Client Rate Limiting
//!
//! Sliding-window admission control keyed by client IP address. Each key
//! owns an ordered queue of admission timestamps inside the trailing window.
//! Prune, count and record happen under one mutex, so concurrent requests
//! from the same client can never both take the last slot.
//!
//! Single-instance and in-memory: running N replicas multiplies the
//! effective limit by N.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use stockroom_core::SharedClock;
use thiserror::Error;

use crate::error::AppError;
use crate::middleware::metrics::ApiMetrics;

/// Key used when the transport does not report a peer address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Failure to parse a `"<count>/<unit>"` rate limit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitSpecError {
    #[error("rate limit '{0}' must have the form <count>/<unit>, e.g. 100/minute")]
    Malformed(String),

    #[error("rate limit count must be a positive integer, got '{0}'")]
    InvalidCount(String),
}

/// Admission budget: at most `limit` requests per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub limit: usize,
    pub window_secs: i64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window_secs: 60,
        }
    }
}

impl fmt::Display for RateLimitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.limit, self.window_secs)
    }
}

/// Units starting with `min` mean a minute, `hour` an hour, and anything
/// else a second.
impl FromStr for RateLimitConfig {
    type Err = RateLimitSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, unit) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| RateLimitSpecError::Malformed(s.to_string()))?;

        let limit: usize = count
            .trim()
            .parse()
            .map_err(|_| RateLimitSpecError::InvalidCount(count.trim().to_string()))?;
        if limit == 0 {
            return Err(RateLimitSpecError::InvalidCount(count.trim().to_string()));
        }

        let unit = unit.trim().to_ascii_lowercase();
        if unit.is_empty() {
            return Err(RateLimitSpecError::Malformed(s.to_string()));
        }
        let window_secs = if unit.starts_with("min") {
            60
        } else if unit.starts_with("hour") {
            3600
        } else {
            1
        };

        Ok(Self { limit, window_secs })
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { remaining: usize },
    Rejected { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: SharedClock,
    excluded: Arc<HashSet<String>>,
    windows: Arc<Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>>,
}

impl RateLimiter {
    pub fn new(
        config: RateLimitConfig,
        excluded: impl IntoIterator<Item = String>,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            clock,
            excluded: Arc::new(excluded.into_iter().collect()),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Whether `path` bypasses the limiter entirely.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.contains(path)
    }

    /// Admit or reject one request from `key` at the current instant.
    pub fn check(&self, key: &str) -> Admission {
        let now = self.clock.now();
        let window = self.config.window();
        let cutoff = now - window;

        let mut windows = self.windows.lock();
        let admitted = windows.entry(key.to_string()).or_default();
        while admitted.front().is_some_and(|ts| *ts < cutoff) {
            admitted.pop_front();
        }

        if admitted.len() >= self.config.limit {
            let oldest = admitted.front().copied().unwrap_or(now);
            let wait = (oldest + window - now).num_seconds() + 1;
            return Admission::Rejected {
                retry_after_secs: wait.max(1) as u64,
            };
        }

        admitted.push_back(now);
        Admission::Admitted {
            remaining: self.config.limit - admitted.len(),
        }
    }

    /// Drop keys whose window holds no timestamp inside the trailing
    /// window. Returns the number of keys removed.
    pub fn sweep(&self) -> usize {
        let cutoff = self.clock.now() - self.config.window();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, seen| seen.back().is_some_and(|ts| *ts >= cutoff));
        before - windows.len()
    }

    /// Number of client keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

/// Client key for a request: the peer IP, or [`UNKNOWN_CLIENT`].
pub fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Middleware that enforces per-client rate limits.
///
/// Runs before authentication. Excluded paths are checked first and never
/// touch limiter state.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let Some(limiter) = request.extensions().get::<RateLimiter>().cloned() else {
        return next.run(request).await;
    };

    if limiter.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    let key = client_key(&request);
    match limiter.check(&key) {
        Admission::Admitted { .. } => next.run(request).await,
        Admission::Rejected { retry_after_secs } => {
            tracing::warn!(
                client = %key,
                path = %request.uri().path(),
                limit = limiter.config().limit,
                window_secs = limiter.config().window_secs,
                "rate limit exceeded"
            );
            if let Some(metrics) = request.extensions().get::<ApiMetrics>() {
                metrics.record_rate_limited();
            }
            AppError::RateLimited { retry_after_secs }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use stockroom_core::ManualClock;
    use tower::ServiceExt;

    fn limiter(limit: usize, window_secs: i64, clock: &ManualClock) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig { limit, window_secs },
            ["/health".to_string()],
            clock.shared(),
        )
    }

    #[test]
    fn parse_units() {
        let cases = [
            ("100/minute", 100, 60),
            ("5/min", 5, 60),
            ("10/hour", 10, 3600),
            ("2/hours", 2, 3600),
            ("7/second", 7, 1),
            ("3/day", 3, 1),
            (" 8 / Minute ", 8, 60),
        ];
        for (raw, limit, window_secs) in cases {
            assert_eq!(
                raw.parse::<RateLimitConfig>().unwrap(),
                RateLimitConfig { limit, window_secs },
                "{raw}"
            );
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!(
            "100".parse::<RateLimitConfig>(),
            Err(RateLimitSpecError::Malformed(_))
        ));
        assert!(matches!(
            "100/".parse::<RateLimitConfig>(),
            Err(RateLimitSpecError::Malformed(_))
        ));
        assert!(matches!(
            "abc/minute".parse::<RateLimitConfig>(),
            Err(RateLimitSpecError::InvalidCount(_))
        ));
        assert!(matches!(
            "0/minute".parse::<RateLimitConfig>(),
            Err(RateLimitSpecError::InvalidCount(_))
        ));
        assert!("-1/minute".parse::<RateLimitConfig>().is_err());
    }

    #[test]
    fn fourth_request_in_window_is_rejected() {
        let clock = ManualClock::at_epoch();
        let rl = limiter(3, 60, &clock);

        assert_eq!(rl.check("a"), Admission::Admitted { remaining: 2 });
        clock.advance(Duration::milliseconds(300));
        assert_eq!(rl.check("a"), Admission::Admitted { remaining: 1 });
        clock.advance(Duration::milliseconds(300));
        assert_eq!(rl.check("a"), Admission::Admitted { remaining: 0 });
        assert!(!rl.check("a").is_admitted());
    }

    #[test]
    fn admitted_again_after_window_passes() {
        let clock = ManualClock::at_epoch();
        let rl = limiter(3, 60, &clock);
        for _ in 0..3 {
            assert!(rl.check("a").is_admitted());
        }
        assert!(!rl.check("a").is_admitted());

        // Exactly one window later the first timestamps are still inside.
        clock.advance(Duration::seconds(60));
        assert!(!rl.check("a").is_admitted());

        clock.advance(Duration::seconds(1));
        assert!(rl.check("a").is_admitted());
    }

    #[test]
    fn rejected_requests_do_not_consume_slots() {
        let clock = ManualClock::at_epoch();
        let rl = limiter(1, 10, &clock);
        assert!(rl.check("a").is_admitted());
        for _ in 0..50 {
            clock.advance(Duration::milliseconds(100));
            assert!(!rl.check("a").is_admitted());
        }
        clock.advance(Duration::seconds(6));
        assert!(rl.check("a").is_admitted());
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let clock = ManualClock::at_epoch();
        let rl = limiter(2, 60, &clock);
        assert!(rl.check("10.0.0.1").is_admitted());
        assert!(rl.check("10.0.0.1").is_admitted());
        assert!(!rl.check("10.0.0.1").is_admitted());

        assert!(rl.check("10.0.0.2").is_admitted());
        assert!(rl.check("10.0.0.2").is_admitted());
    }

    #[test]
    fn retry_after_points_past_oldest_timestamp() {
        let clock = ManualClock::at_epoch();
        let rl = limiter(1, 60, &clock);
        assert!(rl.check("a").is_admitted());
        clock.advance(Duration::seconds(20));
        assert_eq!(
            rl.check("a"),
            Admission::Rejected {
                retry_after_secs: 41
            }
        );
    }

    #[test]
    fn sweep_removes_idle_keys_only() {
        let clock = ManualClock::at_epoch();
        let rl = limiter(5, 60, &clock);
        rl.check("idle");
        clock.advance(Duration::seconds(45));
        rl.check("busy");
        assert_eq!(rl.tracked_keys(), 2);

        clock.advance(Duration::seconds(30));
        assert_eq!(rl.sweep(), 1);
        assert_eq!(rl.tracked_keys(), 1);
        assert!(rl.check("busy").is_admitted());
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        let clock = ManualClock::at_epoch();
        let rl = limiter(25, 60, &clock);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| rl.check("shared").is_admitted())
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
    }

    fn app(rl: RateLimiter) -> Router {
        Router::new()
            .route("/items", get(|| async { "ok" }))
            .route("/health", get(|| async { "ok" }))
            .layer(from_fn(rate_limit_middleware))
            .layer(axum::Extension(rl))
    }

    fn from_ip(uri: &str, ip: [u8; 4]) -> Request {
        let mut req = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        req
    }

    #[tokio::test]
    async fn middleware_rejects_with_429() {
        let clock = ManualClock::at_epoch();
        let app = app(limiter(1, 60, &clock));

        let ok = app
            .clone()
            .oneshot(from_ip("/items", [10, 0, 0, 1]))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let limited = app
            .clone()
            .oneshot(from_ip("/items", [10, 0, 0, 1]))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key("retry-after"));

        let other = app.oneshot(from_ip("/items", [10, 0, 0, 2])).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn excluded_paths_bypass_and_leave_no_state() {
        let clock = ManualClock::at_epoch();
        let rl = limiter(1, 60, &clock);
        let app = app(rl.clone());
        for _ in 0..5 {
            let resp = app
                .clone()
                .oneshot(from_ip("/health", [10, 0, 0, 1]))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        assert_eq!(rl.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn missing_peer_address_shares_unknown_key() {
        let clock = ManualClock::at_epoch();
        let rl = limiter(1, 60, &clock);
        let app = app(rl.clone());
        let req = || {
            axum::http::Request::builder()
                .uri("/items")
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(
            app.clone().oneshot(req()).await.unwrap().status(),
            StatusCode::OK
        );
        assert_eq!(
            app.oneshot(req()).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert!(!rl.check(UNKNOWN_CLIENT).is_admitted());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use stockroom_core::ManualClock;

    proptest! {
        /// Traffic from other clients never changes what one client is admitted.
        #[test]
        fn keys_are_isolated(
            limit in 1usize..6,
            noise in proptest::collection::vec(0u8..4, 0..40),
        ) {
            let clock = ManualClock::at_epoch();
            let rl = RateLimiter::new(
                RateLimitConfig { limit, window_secs: 60 },
                Vec::new(),
                clock.shared(),
            );
            for n in &noise {
                rl.check(&format!("noise-{n}"));
            }
            let admitted = (0..limit + 3).filter(|_| rl.check("target").is_admitted()).count();
            prop_assert_eq!(admitted, limit);
        }
    }
}
