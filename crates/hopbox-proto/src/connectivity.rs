//! `ConnectivityState` — owned exclusively by the connectivity monitor (§4.3).

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Connected,
    Disconnected,
}

/// Emitted by the monitor on every state change (§4.3, §8 property 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityEvent {
    pub state: ConnectivityState,
    pub since: DateTime<Utc>,
    /// Populated only on a `Disconnected -> Connected` transition: how long the
    /// outage lasted.
    pub outage: Option<chrono::Duration>,
}
