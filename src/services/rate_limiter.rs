//! In-memory rate limiters
//!
//! - Login: 5 failed attempts per account per 15 minutes, 10 requests per IP
//!   per minute
//! - Contact form: 5 submissions per IP per 10 minutes
//!
//! State lives in process memory and is pruned by `cleanup`, which the
//! server calls from a background task.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Sliding-window counter keyed by `K`
pub struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    hits: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash + Clone> SlidingWindow<K> {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `key` has reached the limit within the current window
    pub async fn is_limited(&self, key: &K) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        match hits.get_mut(key) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= self.limit
            }
            None => false,
        }
    }

    pub async fn record(&self, key: K) {
        self.hits.write().await.entry(key).or_default().push(Utc::now());
    }

    /// Record a hit unless the key is already limited. Returns `false` when limited.
    pub async fn try_acquire(&self, key: K) -> bool {
        let now = Utc::now();
        let cutoff = now - self.window;
        let mut hits = self.hits.write().await;
        let times = hits.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        if times.len() >= self.limit {
            return false;
        }
        times.push(now);
        true
    }

    pub async fn clear(&self, key: &K) {
        self.hits.write().await.remove(key);
    }

    /// Drop expired hits and empty keys
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        self.hits.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    /// Failed attempts by lowercased email
    accounts: SlidingWindow<String>,
    /// Login requests by client IP
    ips: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            accounts: SlidingWindow::new(5, Duration::minutes(15)),
            ips: SlidingWindow::new(10, Duration::minutes(1)),
        }
    }

    pub async fn is_account_limited(&self, email: &str) -> bool {
        self.accounts.is_limited(&email.trim().to_lowercase()).await
    }

    pub async fn record_failed_attempt(&self, email: &str) {
        self.accounts.record(email.trim().to_lowercase()).await;
    }

    /// Forget failed attempts after a successful login
    pub async fn clear_account(&self, email: &str) {
        self.accounts.clear(&email.trim().to_lowercase()).await;
    }

    /// Count a login request from `ip`; `false` if the IP is over its limit
    pub async fn check_ip(&self, ip: IpAddr) -> bool {
        self.ips.try_acquire(ip).await
    }

    pub async fn cleanup(&self) {
        self.accounts.cleanup().await;
        self.ips.cleanup().await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Contact form rate limiter
pub struct ContactRateLimiter {
    ips: SlidingWindow<IpAddr>,
}

impl ContactRateLimiter {
    pub fn new() -> Self {
        Self {
            ips: SlidingWindow::new(5, Duration::minutes(10)),
        }
    }

    /// Count a submission from `ip`; `false` if the IP is over its limit
    pub async fn check(&self, ip: IpAddr) -> bool {
        self.ips.try_acquire(ip).await
    }

    pub async fn cleanup(&self) {
        self.ips.cleanup().await;
    }
}

impl Default for ContactRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_account_rate_limit() {
        let limiter = LoginRateLimiter::new();

        for _ in 0..4 {
            limiter.record_failed_attempt("ada@example.com").await;
            assert!(!limiter.is_account_limited("ada@example.com").await);
        }
        limiter.record_failed_attempt("ada@example.com").await;
        assert!(limiter.is_account_limited("ada@example.com").await);

        limiter.clear_account("ada@example.com").await;
        assert!(!limiter.is_account_limited("ada@example.com").await);
    }

    #[tokio::test]
    async fn test_account_key_is_case_insensitive() {
        let limiter = LoginRateLimiter::new();
        for email in ["Ada@Example.com", "ada@example.com", "ADA@EXAMPLE.COM", " ada@example.com", "ada@example.COM"] {
            limiter.record_failed_attempt(email).await;
        }
        assert!(limiter.is_account_limited("ada@example.com").await);
    }

    #[tokio::test]
    async fn test_ip_rate_limit() {
        let limiter = LoginRateLimiter::new();
        let ip = IpAddr::from_str("127.0.0.1").unwrap();

        for _ in 0..10 {
            assert!(limiter.check_ip(ip).await);
        }
        assert!(!limiter.check_ip(ip).await);

        let other = IpAddr::from_str("10.0.0.1").unwrap();
        assert!(limiter.check_ip(other).await);
    }

    #[tokio::test]
    async fn test_contact_limit() {
        let limiter = ContactRateLimiter::new();
        let ip = IpAddr::from_str("192.168.1.5").unwrap();
        for _ in 0..5 {
            assert!(limiter.check(ip).await);
        }
        assert!(!limiter.check(ip).await);
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired_entries() {
        let window: SlidingWindow<u8> = SlidingWindow::new(1, Duration::milliseconds(-1));
        window.record(1).await;
        window.cleanup().await;
        assert!(window.hits.read().await.is_empty());
    }
}
