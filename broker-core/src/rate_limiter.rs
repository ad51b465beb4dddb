//! Per-client sliding-window rate limiter, keyed `(clientId, endpointClass)`.
//!
//! One `Mutex`-guarded bucket per key stored in a `DashMap`, so a burst of
//! concurrent requests from the same client serializes only on its own
//! bucket.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::constants::{RATE_LIMIT_DEFAULT_MAX, RATE_LIMIT_DISCOVERY_MAX, RATE_LIMIT_WINDOW};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Default,
    Discovery,
}

#[derive(Debug, Clone, Copy)]
pub struct LimiterConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl LimiterConfig {
    pub fn for_class(class: EndpointClass) -> Self {
        match class {
            EndpointClass::Default => Self {
                max_requests: RATE_LIMIT_DEFAULT_MAX,
                window: RATE_LIMIT_WINDOW,
            },
            EndpointClass::Discovery => Self {
                max_requests: RATE_LIMIT_DISCOVERY_MAX,
                window: RATE_LIMIT_WINDOW,
            },
        }
    }
}

pub enum Decision {
    Allowed,
    Denied { retry_after: Duration },
}

struct Bucket {
    timestamps: VecDeque<Instant>,
}

pub struct RateLimiter {
    buckets: DashMap<(String, EndpointClass), Arc<Mutex<Bucket>>>,
    default_config: LimiterConfig,
    discovery_config: LimiterConfig,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            default_config: LimiterConfig::for_class(EndpointClass::Default),
            discovery_config: LimiterConfig::for_class(EndpointClass::Discovery),
        }
    }

    pub fn with_configs(default_config: LimiterConfig, discovery_config: LimiterConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            default_config,
            discovery_config,
        }
    }

    fn config_for(&self, class: EndpointClass) -> LimiterConfig {
        match class {
            EndpointClass::Default => self.default_config,
            EndpointClass::Discovery => self.discovery_config,
        }
    }

    fn bucket_for(&self, client_id: &str, class: EndpointClass) -> Arc<Mutex<Bucket>> {
        self.buckets
            .entry((client_id.to_string(), class))
            .or_insert_with(|| {
                Arc::new(Mutex::new(Bucket {
                    timestamps: VecDeque::new(),
                }))
            })
            .clone()
    }

    /// Check and, if allowed, record one request for `client_id` under
    /// `class`. Strictly-less-than at the expiry boundary: a timestamp
    /// exactly `window` old is dropped.
    pub async fn check(&self, client_id: &str, class: EndpointClass) -> Decision {
        let config = self.config_for(class);
        let bucket_handle = self.bucket_for(client_id, class);
        let mut bucket = bucket_handle.lock().await;

        let now = Instant::now();
        while let Some(&front) = bucket.timestamps.front() {
            if now.duration_since(front) >= config.window {
                bucket.timestamps.pop_front();
            } else {
                break;
            }
        }

        if (bucket.timestamps.len() as u32) < config.max_requests {
            bucket.timestamps.push_back(now);
            Decision::Allowed
        } else {
            let oldest = *bucket.timestamps.front().unwrap();
            let retry_after = (oldest + config.window).saturating_duration_since(now);
            Decision::Denied { retry_after }
        }
    }

    /// Drop any bucket with no recorded timestamps left, per §3's
    /// "pruned when empty" lifecycle note. Call periodically, not per
    /// request.
    pub async fn prune_empty(&self) {
        let handles: Vec<_> = self
            .buckets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut to_remove = Vec::new();
        for (key, handle) in handles {
            if handle.lock().await.timestamps.is_empty() {
                to_remove.push(key);
            }
        }
        for key in to_remove {
            self.buckets.remove(&key);
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_allows_exactly_max_then_denies() {
        let limiter = RateLimiter::with_configs(
            LimiterConfig {
                max_requests: 3,
                window: Duration::from_secs(60),
            },
            LimiterConfig::for_class(EndpointClass::Discovery),
        );

        for _ in 0..3 {
            assert!(matches!(
                limiter.check("client_1", EndpointClass::Default).await,
                Decision::Allowed
            ));
        }
        match limiter.check("client_1", EndpointClass::Default).await {
            Decision::Denied { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60));
                assert!(retry_after > Duration::ZERO);
            }
            Decision::Allowed => panic!("fourth request should be denied"),
        }
    }

    #[tokio::test]
    async fn endpoint_override_applies_independently() {
        let limiter = RateLimiter::new();
        for _ in 0..30 {
            assert!(matches!(
                limiter.check("client_1", EndpointClass::Default).await,
                Decision::Allowed
            ));
        }
        assert!(matches!(
            limiter.check("client_1", EndpointClass::Default).await,
            Decision::Denied { .. }
        ));
        // A different endpoint class for the same client has its own budget.
        assert!(matches!(
            limiter.check("client_1", EndpointClass::Discovery).await,
            Decision::Allowed
        ));
    }

    #[tokio::test]
    async fn window_expiry_readmits_after_full_window_elapses() {
        tokio::time::pause();
        let limiter = RateLimiter::with_configs(
            LimiterConfig {
                max_requests: 1,
                window: Duration::from_millis(60_000),
            },
            LimiterConfig::for_class(EndpointClass::Discovery),
        );

        assert!(matches!(
            limiter.check("client_1", EndpointClass::Default).await,
            Decision::Allowed
        ));
        assert!(matches!(
            limiter.check("client_1", EndpointClass::Default).await,
            Decision::Denied { .. }
        ));

        tokio::time::advance(Duration::from_millis(60_001)).await;
        assert!(matches!(
            limiter.check("client_1", EndpointClass::Default).await,
            Decision::Allowed
        ));
    }

    #[tokio::test]
    async fn concurrent_burst_from_same_client_allows_exactly_max() {
        let limiter = Arc::new(RateLimiter::with_configs(
            LimiterConfig {
                max_requests: 5,
                window: Duration::from_secs(60),
            },
            LimiterConfig::for_class(EndpointClass::Discovery),
        ));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                matches!(
                    limiter.check("burst_client", EndpointClass::Default).await,
                    Decision::Allowed
                )
            }));
        }
        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }
}
