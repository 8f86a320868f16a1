//! Server-driven fleet refresh, blacklist probing, and the keep-alive loop.
//!
//! All network I/O here runs without the collection mutex; only the final
//! install of a pulled fleet (and the snapshots taken before probing) touch
//! the lock.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use tokio::time::sleep;

use crate::{collection::PoolCore, endpoint::Endpoint, error::Error};

/// Sentinel object path used for liveness probes. The object is not expected
/// to exist; any authoritative answer (200, 403, 404) proves the gateway is
/// up.
pub(crate) const PROBE_KEY: &str =
    "lbsdkprobeblacklistbucket20200320/lbsdkprobeblacklistkey20200320";

const LAST_EPOCH_HEADER: &str = "Last-Epoch";

/// One `<Rgw>` entry of the fleet listing.
#[derive(Debug, Deserialize)]
pub(crate) struct Rgw {
    #[serde(rename = "Ip", default)]
    pub(crate) ip: String,
    #[serde(rename = "Port", default)]
    pub(crate) port: String,
}

/// Body of the `GET /?rgw` fleet listing.
#[derive(Debug, Deserialize)]
pub(crate) struct RgwInfo {
    #[serde(rename = "Rgw", default)]
    pub(crate) rgw_configuration: Vec<Rgw>,
}

pub(crate) struct FleetListing {
    pub(crate) info: RgwInfo,
    pub(crate) epoch: i64,
}

/// Synthesize endpoints from a fleet listing, skipping entries with an empty
/// ip or an unparsable address.
pub(crate) fn parse_from_rgw_info(info: &RgwInfo) -> Vec<Endpoint> {
    let mut endpoints = Vec::with_capacity(info.rgw_configuration.len());
    for rgw in &info.rgw_configuration {
        if rgw.ip.is_empty() {
            tracing::warn!("fleet entry with empty ip, skipping");
            continue;
        }
        match Endpoint::parse(&format!("{}:{}", rgw.ip, rgw.port)) {
            Ok(endpoint) => endpoints.push(endpoint),
            Err(err) => {
                tracing::warn!(ip = %rgw.ip, port = %rgw.port, %err, "unparsable fleet entry, skipping");
            }
        }
    }
    endpoints
}

impl PoolCore {
    /// Pull the authoritative fleet listing from one endpoint.
    ///
    /// Requires a 200 answer carrying exactly one integer `Last-Epoch`
    /// header and a non-empty XML body.
    pub(crate) async fn fetch_rgw_info(&self, url: &str) -> Result<FleetListing, Error> {
        let request_url = format!("{url}/?rgw");
        let response = self
            .http
            .get(&request_url)
            .timeout(self.options.probe_timeout)
            .send()
            .await?
            .error_for_status()?;

        let epoch: i64 = {
            let mut values = response.headers().get_all(LAST_EPOCH_HEADER).iter();
            match (values.next(), values.next()) {
                (Some(value), None) => value
                    .to_str()
                    .ok()
                    .and_then(|value| value.trim().parse().ok())
                    .ok_or_else(|| {
                        Error::Protocol(format!("malformed {LAST_EPOCH_HEADER} header"))
                    })?,
                _ => {
                    return Err(Error::Protocol(format!(
                        "expected exactly one {LAST_EPOCH_HEADER} header"
                    )))
                }
            }
        };

        let body = response.text().await?;
        let info: RgwInfo = quick_xml::de::from_str(&body)
            .map_err(|err| Error::Parse(format!("malformed fleet listing: {err}")))?;
        if info.rgw_configuration.is_empty() {
            return Err(Error::Protocol("RgwConfiguration is empty".to_owned()));
        }

        Ok(FleetListing { info, epoch })
    }

    /// Pull the fleet from `url` and install it.
    ///
    /// Without `force_update`, a listing whose epoch is not newer than the
    /// one already installed is treated as success without mutation. Any
    /// failure along the way yields `false`.
    pub(crate) async fn update_endpoints_by_endpoint(&self, url: &str, force_update: bool) -> bool {
        let listing = match self.fetch_rgw_info(url).await {
            Ok(listing) => listing,
            Err(err) => {
                tracing::debug!(url, %err, "fleet pull failed");
                return false;
            }
        };

        if !force_update && listing.epoch <= self.last_epoch() {
            // The server has nothing newer; the installed fleet stands.
            return true;
        }

        let endpoints = parse_from_rgw_info(&listing.info);
        if endpoints.is_empty() {
            tracing::warn!(url, "fleet listing contained no usable endpoints");
            return false;
        }
        match self.update_whole_collection(endpoints, listing.epoch) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(url, %err, "failed to install pulled fleet");
                false
            }
        }
    }

    /// Ask each live ring member in turn for the fleet; first success wins.
    ///
    /// The candidates are snapshotted under the lock, so concurrent demotion
    /// cannot derail the walk.
    pub(crate) async fn update_endpoint_by_api(&self) -> bool {
        let candidates: Vec<String> = {
            let inner = self.inner.lock();
            let valid_min = inner.valid_min_id;
            inner
                .ring
                .iter()
                .filter(|endpoint| endpoint.id() >= valid_min && !endpoint.is_blacklisted())
                .map(|endpoint| endpoint.url().to_owned())
                .collect()
        };

        for url in candidates {
            if self.update_endpoints_by_endpoint(&url, false).await {
                return true;
            }
        }
        false
    }

    /// Ask each seed (skipping blacklisted ones) for the fleet, forcing the
    /// install regardless of epoch; first success wins.
    pub(crate) async fn update_endpoint_from_seed(&self) -> bool {
        for seed in self.seeds() {
            if self.inner.lock().blacklist.contains_key(&seed.url) {
                continue;
            }
            if self.update_endpoints_by_endpoint(&seed.url, true).await {
                return true;
            }
        }
        false
    }

    /// Whether the gateway at `url` answers at all. 200, 403 and 404 all
    /// count as alive; the probe object does not have to exist.
    pub(crate) async fn probe_endpoint(&self, url: &str) -> bool {
        let request_url = format!("{url}/{PROBE_KEY}");
        let response = match self
            .http
            .get(&request_url)
            .timeout(self.options.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(url, %err, "probe failed");
                return false;
            }
        };

        let status = response.status();
        let alive = matches!(status.as_u16(), 200 | 403 | 404);
        // Drain the body so the connection goes back to the pool.
        let _ = response.bytes().await;
        if !alive {
            tracing::debug!(url, %status, "probe answered with a dead status");
        }
        alive
    }

    /// Probe every current-generation blacklist entry and rehabilitate the
    /// ones that answer; stale entries are purged without probing. Returns
    /// whether anything was rehabilitated.
    pub(crate) async fn probe_blacklist(&self) -> bool {
        let candidates: Vec<String> = {
            let mut inner = self.inner.lock();
            let valid_min = inner.valid_min_id;
            let mut candidates = Vec::with_capacity(inner.blacklist.len());
            let mut stale = Vec::new();
            for (url, endpoint) in &inner.blacklist {
                if endpoint.id() >= valid_min {
                    candidates.push(url.clone());
                } else {
                    stale.push(url.clone());
                }
            }
            for url in stale {
                inner.blacklist.remove(&url);
            }
            candidates
        };

        let mut recovered = false;
        for url in candidates {
            if self.probe_endpoint(&url).await {
                recovered |= self.rm_endpoint_from_blacklist(&url);
            }
        }
        recovered
    }

    /// Probe the seed snapshot and promote every seed that answers, skipping
    /// seeds that are currently blacklisted. Returns whether anything was
    /// promoted.
    pub(crate) async fn probe_endpoint_from_seed(&self) -> bool {
        let mut promoted = false;
        for seed in self.seeds() {
            if self.inner.lock().blacklist.contains_key(&seed.url) {
                continue;
            }
            if self.probe_endpoint(&seed.url).await {
                // Always a fresh record; seed descriptors are shared, ring
                // records are not.
                let endpoint = Endpoint::from_descriptor(seed);
                promoted |= self.insert_to_endpoint_head(&endpoint);
            }
        }
        promoted
    }

    /// One keep-alive pass: pull the fleet from a live member, probe the
    /// blacklist when the pull fails, and fall back to the seeds when the
    /// ring is empty.
    async fn refresh_cycle(&self) {
        let updated = self.update_endpoint_by_api().await;
        if !updated {
            self.probe_blacklist().await;
        }
        if self.num_active() == 0 {
            if !self.update_endpoint_from_seed().await {
                self.probe_endpoint_from_seed().await;
            }
        }
    }

    /// The keep-alive loop: a refresh pass per interval, woken early
    /// whenever demotion drains the ring. A cycle that runs under the drain
    /// signal stays on a one-second retry cadence until the ring has members
    /// again, skipping the long sleep.
    pub(crate) async fn keep_alive(self: Arc<Self>) {
        let interval = self.options.keep_alive_interval;
        let before = Duration::from_secs(1);
        let after = Duration::from_secs(interval.saturating_sub(1));

        loop {
            // Every cycle starts with its own short sleep; only a signal
            // observed here makes this cycle an expedited one.
            let signalled = self.sleep_or_drained(before).await;

            self.refresh_cycle().await;

            if signalled {
                while self.num_active() == 0 {
                    sleep(Duration::from_secs(1)).await;
                    self.refresh_cycle().await;
                }
                tracing::info!(
                    num_active = self.num_active(),
                    "ring repopulated after drain"
                );
            }

            // A drain signal during the long sleep only ends it early; the
            // next cycle observes its own signal.
            self.sleep_or_drained(after).await;
        }
    }

    /// Sleep for `duration`, returning early (and `true`) when the drain
    /// signal fires. A signal sent while nobody was sleeping is remembered
    /// and consumed by the next call.
    async fn sleep_or_drained(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return false;
        }
        tokio::select! {
            _ = sleep(duration) => false,
            _ = self.drained.notified() => true,
        }
    }
}
