//! Per-IP concurrent connection limit.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use tracing::warn;

/// Caps how many live connections a single IP may hold.
pub struct ConnectionLimiter {
    max_per_ip: u32,
    live: Mutex<HashMap<IpAddr, u32>>,
}

impl ConnectionLimiter {
    pub fn new(max_per_ip: u32) -> Self {
        Self {
            max_per_ip,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve a slot for `ip`. Returns false when the IP is at its limit.
    pub fn try_acquire(&self, ip: IpAddr) -> bool {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        let count = live.entry(ip).or_insert(0);
        if *count >= self.max_per_ip {
            warn!(%ip, count = *count, limit = self.max_per_ip,
                "Rejecting connection: too many from IP");
            return false;
        }
        *count += 1;
        true
    }

    /// Return a slot taken by [`try_acquire`](Self::try_acquire).
    pub fn release(&self, ip: IpAddr) {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = live.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                live.remove(&ip);
            }
        }
    }

    pub fn live(&self, ip: IpAddr) -> u32 {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.get(&ip).copied().unwrap_or(0)
    }
}
