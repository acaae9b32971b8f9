//! Websocket session configuration.

use std::time::Duration;

/// Timing and sizing for one websocket connection.
#[derive(Debug, Clone)]
pub struct WsOptions {
    /// Largest accepted incoming message, in bytes.
    pub max_message_size: usize,
    /// Interval between server-sent pings.
    pub ping_period: Duration,
    /// How long to wait for any frame before the read side gives up.
    /// Must exceed `ping_period` so pongs arrive in time.
    pub pong_wait: Duration,
    /// Per-frame write budget before the connection is considered dead.
    pub write_wait: Duration,
}

impl Default for WsOptions {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            max_message_size: 1 << 22,
            ping_period: pong_wait * 9 / 10,
            pong_wait,
            write_wait: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WsOptions::default();
        assert_eq!(options.max_message_size, 4 * 1024 * 1024);
        assert_eq!(options.pong_wait, Duration::from_secs(60));
        assert_eq!(options.ping_period, Duration::from_secs(54));
        assert!(options.ping_period < options.pong_wait);
    }
}
