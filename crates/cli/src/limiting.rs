//! Admission rate limiting
//!
//! Fixed counting windows keyed by caller. A caller's window opens on its
//! first request and admits `limit` requests until it has lasted `window`;
//! the next request after that opens a fresh window.

use axum::http::HeaderMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A caller went over its allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    /// Seconds until the caller's window closes
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: RwLock<HashMap<String, Window>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            limit,
            window,
        }
    }

    /// Count one request from `caller`, rejecting it once the window is full
    pub async fn check(&self, caller: &str) -> Result<(), RateLimitExceeded> {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let entry = windows.entry(caller.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.count = 0;
            entry.started = now;
        }

        if entry.count >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(RateLimitExceeded {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop windows that have closed; returns how many were dropped
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < self.window);
        before - windows.len()
    }

    pub async fn tracked_callers(&self) -> usize {
        self.windows.read().await.len()
    }
}

/// Key a request by its caller: the first `X-Forwarded-For` address when the
/// proxy is trusted, else the peer address
pub fn caller_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());
        if let Some(first) = forwarded {
            return first.to_string();
        }
    }
    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_limit_within_window() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(limiter.check("127.0.0.1").await.is_ok());
        }
        let rejected = limiter.check("127.0.0.1").await.unwrap_err();
        assert!(rejected.retry_after_secs >= 1 && rejected.retry_after_secs <= 60);

        assert!(limiter.check("192.168.1.1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reopens() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        assert!(limiter.check("a").await.is_ok());
        assert!(limiter.check("a").await.is_ok());
        assert!(limiter.check("a").await.is_err());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.check("a").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_closed_windows() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        limiter.check("old").await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        limiter.check("new").await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(limiter.sweep().await, 1);
        assert_eq!(limiter.tracked_callers().await, 1);
    }

    #[test]
    fn test_caller_key() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );

        assert_eq!(caller_key(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(caller_key(&headers, Some(peer), false), "10.0.0.9");
        assert_eq!(caller_key(&HeaderMap::new(), Some(peer), true), "10.0.0.9");
        assert_eq!(caller_key(&HeaderMap::new(), None, false), "unknown");
    }
}
