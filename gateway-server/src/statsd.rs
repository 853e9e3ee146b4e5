use gateway_statsd::{CounterMetric, DistributionMetric, TimerMetric};

/// Counter metrics used by the gateway server.
pub enum GatewayCounters {
    /// Number of handled HTTP requests.
    ///
    /// This metric is tagged with:
    /// - `route`: the matched route, or `forward` for passthrough requests.
    /// - `status`: the status code of the response.
    Requests,
    /// Number of fields skipped because their value is not numeric.
    InfluxFieldsSkipped,
    /// Number of line protocol batches rejected before they were forwarded.
    ///
    /// This metric is tagged with:
    /// - `reason`: a short name of the failure, such as `parse` or `precision`.
    InfluxRejected,
}

impl CounterMetric for GatewayCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::InfluxFieldsSkipped => "influx.fields.skipped",
            Self::InfluxRejected => "influx.rejected",
        }
    }
}

/// Timer metrics used by the gateway server.
pub enum GatewayTimers {
    /// Total time spent handling an HTTP request, including the backend call.
    ///
    /// This metric is tagged with:
    /// - `route`: see [`GatewayCounters::Requests`].
    RequestsDuration,
}

impl TimerMetric for GatewayTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::RequestsDuration => "requests.duration",
        }
    }
}

/// Distribution metrics used by the gateway server.
pub enum GatewayDistributions {
    /// Number of series in a converted line protocol batch.
    InfluxBatchSeries,
    /// Size of an encoded remote write payload in bytes.
    InfluxBatchBytes,
}

impl DistributionMetric for GatewayDistributions {
    fn name(&self) -> &'static str {
        match self {
            Self::InfluxBatchSeries => "influx.batch.series",
            Self::InfluxBatchBytes => "influx.batch.bytes",
        }
    }
}
