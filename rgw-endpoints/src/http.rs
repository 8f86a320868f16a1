use crate::{error::Error, options::EndpointOptions};

/// Build the shared per-collection HTTP client.
///
/// Connections are pooled and reused across probes and fleet pulls. Request
/// deadlines are set per call on the request builder; the client itself is
/// never reconfigured after construction. The response-header timeout is
/// applied as the client's read timeout, which bounds every socket read
/// including the wait for a response to start.
pub(crate) fn build_http_client(options: &EndpointOptions) -> Result<reqwest::Client, Error> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(options.max_idle_per_host)
        .pool_idle_timeout(None)
        .connect_timeout(options.connect_timeout)
        .read_timeout(options.response_header_timeout)
        .build()?;
    Ok(client)
}
