//! Connection admission and packet flood protection.

use crate::config::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub mod rate_limiter;

pub use rate_limiter::RateLimiter;

/// Central security manager for the world server
#[derive(Debug)]
pub struct SecurityManager {
    config: SecurityConfig,
    rate_limiter: RateLimiter,
    connection_tracker: Arc<RwLock<HashMap<IpAddr, ConnectionInfo>>>,
}

#[derive(Debug, Clone)]
struct ConnectionInfo {
    count: u32,
    last_seen: Instant,
}

impl SecurityManager {
    /// Creates a new security manager with the given configuration
    pub fn new(config: SecurityConfig) -> Self {
        let rate_limiter = RateLimiter::per_second(config.max_packets_per_second);

        Self {
            config,
            rate_limiter,
            connection_tracker: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validates an incoming socket. Instance sockets count against the same
    /// per-IP cap as realm sockets.
    pub async fn validate_connection(&self, ip: IpAddr) -> Result<(), SecurityError> {
        if self.config.banned_ips.contains(&ip) {
            return Err(SecurityError::BannedIp(ip));
        }

        if self.config.enable_ddos_protection {
            let mut tracker = self.connection_tracker.write().await;
            let info = tracker.entry(ip).or_insert(ConnectionInfo {
                count: 0,
                last_seen: Instant::now(),
            });

            if info.count >= self.config.max_connections_per_ip {
                return Err(SecurityError::TooManyConnections(ip));
            }

            info.count += 1;
            info.last_seen = Instant::now();
        }

        Ok(())
    }

    /// Applies packet rate limiting to one inbound frame
    pub async fn validate_packet(&self, ip: IpAddr) -> Result<(), SecurityError> {
        if self.config.enable_rate_limiting && !self.rate_limiter.check_rate_limit(ip).await {
            return Err(SecurityError::RateLimitExceeded(ip));
        }
        Ok(())
    }

    /// Registers a socket disconnect
    pub async fn on_disconnect(&self, ip: IpAddr) {
        if self.config.enable_ddos_protection {
            let mut tracker = self.connection_tracker.write().await;
            if let Some(info) = tracker.get_mut(&ip) {
                info.count = info.count.saturating_sub(1);
                if info.count == 0 {
                    tracker.remove(&ip);
                }
            }
        }
    }

    /// Cleans up stale connection tracking data and idle rate buckets
    pub async fn cleanup_stale_connections(&self) {
        self.rate_limiter.cleanup_old_entries().await;
        if !self.config.enable_ddos_protection {
            return;
        }

        let mut tracker = self.connection_tracker.write().await;
        let cutoff = Instant::now() - Duration::from_secs(300); // 5 minutes
        tracker.retain(|_, info| info.count > 0 || info.last_seen > cutoff);
    }

    /// Gets current security statistics
    pub async fn get_stats(&self) -> SecurityStats {
        let connection_count = if self.config.enable_ddos_protection {
            self.connection_tracker.read().await.len()
        } else {
            0
        };

        SecurityStats {
            tracked_ips: connection_count,
            rate_limited_packets: self.rate_limiter.blocked_count(),
            banned_ips: self.config.banned_ips.len(),
        }
    }
}

/// Security-related statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityStats {
    pub tracked_ips: usize,
    pub rate_limited_packets: u64,
    pub banned_ips: usize,
}

/// Security-related errors
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("IP address {0} is banned")]
    BannedIp(IpAddr),

    #[error("Too many connections from IP {0}")]
    TooManyConnections(IpAddr),

    #[error("Rate limit exceeded for IP {0}")]
    RateLimitExceeded(IpAddr),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    #[tokio::test]
    async fn per_ip_cap_is_released_on_disconnect() {
        let security = SecurityManager::new(SecurityConfig {
            max_connections_per_ip: 2,
            ..SecurityConfig::default()
        });

        security.validate_connection(IP).await.unwrap();
        security.validate_connection(IP).await.unwrap();
        assert!(matches!(
            security.validate_connection(IP).await,
            Err(SecurityError::TooManyConnections(_))
        ));

        security.on_disconnect(IP).await;
        security.validate_connection(IP).await.unwrap();
        assert_eq!(security.get_stats().await.tracked_ips, 1);
    }

    #[tokio::test]
    async fn banned_ips_are_rejected() {
        let security = SecurityManager::new(SecurityConfig {
            banned_ips: vec![IP],
            ..SecurityConfig::default()
        });
        assert!(matches!(
            security.validate_connection(IP).await,
            Err(SecurityError::BannedIp(_))
        ));
    }

    #[tokio::test]
    async fn packet_floods_are_cut_off() {
        let security = SecurityManager::new(SecurityConfig {
            max_packets_per_second: 3,
            ..SecurityConfig::default()
        });
        for _ in 0..3 {
            security.validate_packet(IP).await.unwrap();
        }
        assert!(security.validate_packet(IP).await.is_err());
        assert_eq!(security.get_stats().await.rate_limited_packets, 1);
    }
}
