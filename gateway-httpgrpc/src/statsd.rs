use gateway_statsd::{CounterMetric, TimerMetric};

/// Counter metrics of the bridge client.
pub enum BridgeCounters {
    /// Number of calls made to the backend.
    ///
    /// This metric is tagged with:
    /// - `outcome`: `ok` for regular responses, `embedded` for responses recovered from an RPC
    ///   error, `timeout`, `invalid_response`, or the name of the RPC status code.
    Requests,
}

impl CounterMetric for BridgeCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::Requests => "bridge.requests",
        }
    }
}

/// Timer metrics of the bridge client.
pub enum BridgeTimers {
    /// Time from sending a call to the backend until its outcome is known.
    ///
    /// This metric is tagged with:
    /// - `outcome`: see [`BridgeCounters::Requests`].
    RequestDuration,
}

impl TimerMetric for BridgeTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::RequestDuration => "bridge.requests.duration",
        }
    }
}
