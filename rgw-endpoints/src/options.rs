use std::time::Duration;

use clap::Parser;

/// Configuration for an endpoint collection.
#[derive(Clone, Debug, Parser)]
pub struct EndpointOptions {
    /// Seconds between keep-alive passes.
    ///
    /// Values of 0 and 1 degenerate to a one-second cycle.
    #[clap(long, env = "RGW_LB_KEEP_ALIVE_INTERVAL", default_value = "5")]
    pub keep_alive_interval: u64,

    /// Per-request timeout for probe and fleet-listing calls, in seconds.
    #[clap(
        long,
        env = "RGW_LB_PROBE_TIMEOUT",
        default_value = "30",
        value_parser = parse_secs,
    )]
    pub probe_timeout: Duration,

    /// Timeout for establishing new upstream connections, in seconds.
    #[clap(
        long,
        env = "RGW_LB_CONNECT_TIMEOUT",
        default_value = "30",
        value_parser = parse_secs,
    )]
    pub connect_timeout: Duration,

    /// Timeout for an endpoint to start answering once a request has been
    /// written, in seconds.
    #[clap(
        long,
        env = "RGW_LB_RESPONSE_HEADER_TIMEOUT",
        default_value = "20",
        value_parser = parse_secs,
    )]
    pub response_header_timeout: Duration,

    /// Maximum idle connections retained per endpoint host.
    #[clap(long, env = "RGW_LB_MAX_IDLE_PER_HOST", default_value = "500")]
    pub max_idle_per_host: usize,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self::parse_from(std::iter::empty::<String>())
    }
}

fn parse_secs(value: &str) -> Result<Duration, std::num::ParseIntError> {
    Ok(Duration::from_secs(value.parse()?))
}
