//! Per-socket bookkeeping for the connection table.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub connected_at: DateTime<Utc>,
    pub last_request_at: Option<DateTime<Utc>>,
    pub requests_handled: u64,
}

impl ClientConnection {
    pub fn new() -> Self {
        Self {
            connected_at: Utc::now(),
            last_request_at: None,
            requests_handled: 0,
        }
    }

    /// Record one inbound request.
    pub fn record_request(&mut self) {
        self.last_request_at = Some(Utc::now());
        self.requests_handled += 1;
    }
}

impl Default for ClientConnection {
    fn default() -> Self {
        Self::new()
    }
}
