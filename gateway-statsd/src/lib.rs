//! StatsD metrics for the gateway, built on cadence.
//!
//! Every metric is declared as a variant of an enum that implements one of the metric traits
//! ([`CounterMetric`], [`TimerMetric`], [`DistributionMetric`] or [`GaugeMetric`]). The traits
//! only provide a type safe metric name, so that a counter cannot accidentally be reported as a
//! timer.
//!
//! Metrics can be emitted before a client is configured. Until [`init`] or [`set_client`] is
//! called, the [`metric!`] macro does nothing.
//!
//! ```no_run
//! # use std::collections::BTreeMap;
//! gateway_statsd::init(gateway_statsd::MetricsClientConfig {
//!     prefix: "influx_gateway",
//!     host: "127.0.0.1:8125",
//!     default_tags: BTreeMap::new(),
//!     sample_rate: 1.0,
//! })
//! .ok();
//! ```
//!
//! Recording a metric:
//!
//! ```
//! use gateway_statsd::{CounterMetric, metric};
//!
//! struct Rejected;
//!
//! impl CounterMetric for Rejected {
//!     fn name(&self) -> &'static str {
//!         "influx.rejected"
//!     }
//! }
//!
//! metric!(counter(Rejected) += 1, reason = "parse");
//! ```
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::{ToSocketAddrs, UdpSocket};
use std::ops::Deref;
use std::sync::Arc;

use cadence::{
    BufferedUdpMetricSink, Metric, MetricBuilder, MetricError, QueuingMetricSink, StatsdClient,
};
use parking_lot::RwLock;
use rand::Rng;
use rand::distr::StandardUniform;

/// Maximum number of metric events that can be queued before they are dropped.
const METRICS_MAX_QUEUE_SIZE: usize = 100_000;

/// Configured statsd client together with the tags it applies.
#[derive(Debug)]
pub struct MetricsClient {
    /// The raw statsd client.
    pub statsd_client: StatsdClient,
    /// Default tags to apply to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Global sample rate between `0.0` and `1.0`.
    pub sample_rate: f64,
}

/// Parameters for [`init`].
#[derive(Debug)]
pub struct MetricsClientConfig<'a, A> {
    /// Prefix prepended to all metric names.
    pub prefix: &'a str,
    /// Address of the statsd server.
    pub host: A,
    /// Tags that are added to all metrics.
    pub default_tags: BTreeMap<String, String>,
    /// Sample rate for all metrics, between `0.0` (none) and `1.0` (all).
    pub sample_rate: f64,
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd_client
    }
}

impl MetricsClient {
    /// Sends a metric with the default tags of this client.
    #[inline(always)]
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        if !Self::should_send(self.sample_rate) {
            return;
        }

        for (k, v) in &self.default_tags {
            metric = metric.with_tag(k, v);
        }

        if self.sample_rate < 1.0 {
            metric = metric.with_sampling_rate(self.sample_rate);
        }

        if let Err(error) = metric.try_send() {
            gateway_log::error!(
                error = &error as &dyn std::error::Error,
                maximum_capacity = METRICS_MAX_QUEUE_SIZE,
                "error sending a metric",
            );
        }
    }

    fn should_send(sample_rate: f64) -> bool {
        if sample_rate <= 0.0 {
            false
        } else if sample_rate >= 1.0 {
            true
        } else {
            let sample: f64 = rand::rng().sample(StandardUniform);
            sample <= sample_rate
        }
    }
}

static METRICS_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    static CURRENT_CLIENT: RefCell<Option<Arc<MetricsClient>>> = METRICS_CLIENT.read().clone().into();
}

#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

/// The metrics prelude that is necessary to use the client.
pub mod prelude {
    pub use cadence::prelude::*;
}

/// Sets a new global statsd client.
pub fn set_client(client: MetricsClient) {
    *METRICS_CLIENT.write() = Some(Arc::new(client));
    CURRENT_CLIENT.with(|cell| cell.replace(METRICS_CLIENT.read().clone()));
}

/// Disables the global client.
pub fn disable() {
    *METRICS_CLIENT.write() = None;
}

/// Installs a capturing client on the current thread for the duration of `f`.
///
/// Returns all metrics emitted by `f` in their statsd line format.
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let test_client = MetricsClient {
        statsd_client: StatsdClient::from_sink("", sink),
        default_tags: BTreeMap::new(),
        sample_rate: 1.0,
    };

    CURRENT_CLIENT.with(|cell| {
        let old_client = cell.replace(Some(Arc::new(test_client)));
        f();
        cell.replace(old_client);
    });

    rx.iter()
        .map(|line| String::from_utf8_lossy(&line).into_owned())
        .collect()
}

/// Configures the global client to report to a statsd server over UDP.
///
/// Metrics are buffered and sent from a background thread. Fails if the host cannot be resolved
/// or the local socket cannot be bound.
pub fn init<A: ToSocketAddrs>(config: MetricsClientConfig<'_, A>) -> Result<(), MetricError> {
    let addr = config
        .host
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| MetricError::from((cadence::ErrorKind::InvalidInput, "no statsd address")))?;

    gateway_log::info!("reporting metrics to statsd at {addr}");
    let sample_rate = config.sample_rate.clamp(0.0, 1.0);
    if sample_rate == 0.0 {
        gateway_log::debug!("metrics sample rate is 0, no metrics will be reported");
    }

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;
    let udp_sink = BufferedUdpMetricSink::from(addr, socket)?;
    let queuing_sink = QueuingMetricSink::with_capacity(udp_sink, METRICS_MAX_QUEUE_SIZE);

    set_client(MetricsClient {
        statsd_client: StatsdClient::from_sink(config.prefix, queuing_sink),
        default_tags: config.default_tags,
        sample_rate,
    });

    Ok(())
}

/// Invokes a callback with the current statsd client.
///
/// If statsd is not configured the callback is not invoked. Prefer the [`metric!`] macro.
#[inline(always)]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    CURRENT_CLIENT.with(|client| {
        if let Some(client) = client.borrow().as_deref() {
            f(client)
        } else {
            R::default()
        }
    })
}

/// A metric for capturing timings in milliseconds.
///
/// ```
/// use std::time::Instant;
/// use gateway_statsd::{TimerMetric, metric};
///
/// struct Handle;
///
/// impl TimerMetric for Handle {
///     fn name(&self) -> &'static str {
///         "handle"
///     }
/// }
///
/// let start = Instant::now();
/// metric!(timer(Handle) = start.elapsed(), route = "write");
///
/// metric!(timer(Handle), {
///     // timed block
/// });
/// ```
pub trait TimerMetric {
    /// Returns the timer metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing counters.
pub trait CounterMetric {
    /// Returns the counter metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing distributions of values, such as sizes.
pub trait DistributionMetric {
    /// Returns the distribution metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing gauges.
pub trait GaugeMetric {
    /// Returns the gauge metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// Emits a metric.
///
/// See [crate-level documentation](self) for examples.
#[macro_export]
macro_rules! metric {
    // counter increment
    (counter($id:expr) += $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        match $value {
            value if value != 0 => {
                $crate::with_client(|client| {
                    use $crate::_pred::*;
                    client.send_metric(
                        client.count_with_tags(&$crate::CounterMetric::name(&$id), value)
                        $(.with_tag(stringify!($($k).*), $v))*
                    )
                })
            },
            _ => {},
        };
    };

    // gauge set
    (gauge($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.gauge_with_tags(&$crate::GaugeMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // distribution
    (distribution($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.distribution_with_tags(&$crate::DistributionMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // timer value
    (timer($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                // Reported in milliseconds rather than cadence's default nanoseconds.
                client.distribution_with_tags(&$crate::TimerMetric::name(&$id), $value.as_nanos() as f64 / 1e6)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // timed block
    (timer($id:expr), $($($k:ident).* = $v:expr,)* $block:block) => {{
        let now = std::time::Instant::now();
        let rv = {$block};
        $crate::metric!(timer($id) = now.elapsed() $(, $($k).* = $v)*);
        rv
    }};
}
