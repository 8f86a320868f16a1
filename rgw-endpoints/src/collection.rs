use std::{collections::HashMap, fs, path::Path, sync::Arc};

use parking_lot::Mutex;
use rand::Rng;
use tokio::{sync::Notify, task::JoinHandle};
use tracing::Instrument;

use crate::{
    endpoint::{parse_endpoint, Endpoint, EndpointDescriptor, MIN_ENDPOINT_LENGTH},
    error::Error,
    http::build_http_client,
    options::EndpointOptions,
    ring::Ring,
};

/// Mutable view of the fleet, guarded by the collection mutex: the sorted
/// ring of selectable endpoints, the blacklist of demoted ones, the seed
/// snapshot, and the generation/epoch counters.
#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) ring: Ring,
    /// Canonical URL to demoted endpoint. An endpoint is in at most one of
    /// ring and blacklist at any moment.
    pub(crate) blacklist: HashMap<String, Endpoint>,
    /// Descriptors loaded from the seed file; never mutated after load.
    /// Promotions always build a fresh record from a descriptor.
    pub(crate) seeds: Vec<EndpointDescriptor>,
    /// Current generation stamp. Endpoints with a lower stamp are stale.
    pub(crate) valid_min_id: u64,
    /// Server-reported fleet version of the last install; -1 until the first
    /// server-driven refresh.
    pub(crate) last_epoch: i64,
}

/// State shared between the public collection handle and its keep-alive
/// task.
#[derive(Debug)]
pub(crate) struct PoolCore {
    pub(crate) inner: Mutex<Inner>,
    /// Woken when demotion drains the ring. A stored permit coalesces
    /// repeated signals, so senders never block.
    pub(crate) drained: Notify,
    pub(crate) http: reqwest::Client,
    pub(crate) options: EndpointOptions,
}

impl PoolCore {
    pub(crate) fn num_active(&self) -> usize {
        self.inner.lock().ring.len()
    }

    pub(crate) fn last_epoch(&self) -> i64 {
        self.inner.lock().last_epoch
    }

    pub(crate) fn valid_min_id(&self) -> u64 {
        self.inner.lock().valid_min_id
    }

    pub(crate) fn is_active(&self, url: &str) -> bool {
        self.inner.lock().ring.contains_url(url)
    }

    pub(crate) fn seeds(&self) -> Vec<EndpointDescriptor> {
        self.inner.lock().seeds.clone()
    }

    /// Load endpoints from a file, one per line, and install them as the
    /// whole fleet. Blank lines, `#` comments and lines shorter than
    /// [`MIN_ENDPOINT_LENGTH`] are skipped. When `is_seed` is set the parsed
    /// descriptors are retained as the fallback seed snapshot.
    pub(crate) fn read_endpoints_from_file(&self, path: &Path, is_seed: bool) -> Result<(), Error> {
        let content = fs::read_to_string(path)?;

        let mut descriptors = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.len() < MIN_ENDPOINT_LENGTH {
                continue;
            }
            descriptors.push(parse_endpoint(line)?);
        }

        let endpoints = descriptors
            .iter()
            .cloned()
            .map(Endpoint::from_descriptor)
            .collect();
        let epoch = self.last_epoch();
        self.update_whole_collection(endpoints, epoch)?;

        if is_seed {
            self.inner.lock().seeds = descriptors;
        }
        Ok(())
    }

    /// Atomically replace the fleet with `endpoints`, stamped into a fresh
    /// generation, and record `epoch`. The blacklist is emptied: a new
    /// generation invalidates all prior state.
    pub(crate) fn update_whole_collection(
        &self,
        endpoints: Vec<Endpoint>,
        epoch: i64,
    ) -> Result<(), Error> {
        if endpoints.is_empty() {
            return Err(Error::EmptyFleet);
        }

        let count = endpoints.len();
        let mut inner = self.inner.lock();

        // Publishing the bumped generation stamp is the linearization point:
        // from here on, every endpoint of the previous fleet reads as stale
        // no matter which container still references it.
        inner.valid_min_id += 1;
        let id = inner.valid_min_id;

        inner.ring.clear();
        for endpoint in endpoints {
            endpoint.stamp(id);
            let slot = inner.ring.insert_sorted(endpoint.clone());
            endpoint.set_slot(Some(slot));
        }
        inner.last_epoch = epoch;
        inner.blacklist.clear();

        tracing::info!(num_active = count, valid_min_id = id, epoch, "installed endpoint fleet");
        Ok(())
    }

    /// Pick a random live endpoint, or `None` when the ring is empty.
    pub(crate) fn get_rand_endpoint(&self, retry_count: usize) -> Option<Endpoint> {
        let inner = self.inner.lock();
        self.rand_endpoint_locked(&inner, retry_count)
    }

    /// Selection under an already-held lock: land `retry_count` hops from the
    /// head (a uniform draw when zero), then skip forward over stale or
    /// blacklisted nodes. Falls back to the head itself when a full cycle
    /// finds nothing valid.
    pub(crate) fn rand_endpoint_locked(
        &self,
        inner: &Inner,
        retry_count: usize,
    ) -> Option<Endpoint> {
        let head = inner.ring.head_slot()?;
        let len = inner.ring.len();

        let hops = if retry_count == 0 {
            rand::thread_rng().gen_range(0..len)
        } else {
            retry_count % len
        };

        let mut slot = head;
        for _ in 0..hops {
            slot = inner.ring.next_slot(slot)?;
        }
        if let Some(endpoint) = inner
            .ring
            .iter_from(slot)
            .find(|endpoint| endpoint.id() >= inner.valid_min_id && !endpoint.is_blacklisted())
        {
            return Some(endpoint.clone());
        }

        // Nothing valid reachable; hand back the head as a last resort.
        inner.ring.get(head).cloned()
    }

    /// First valid successor of `current`, for sequential retry after a
    /// transient failure. Falls back to a random pick when `current` is no
    /// longer a live ring member or has no valid successor.
    pub(crate) fn get_next_endpoint(&self, current: &Endpoint) -> Option<Endpoint> {
        let inner = self.inner.lock();

        if current.id() < inner.valid_min_id || current.is_blacklisted() {
            return self.rand_endpoint_locked(&inner, 0);
        }
        let Some(slot) = current.slot() else {
            return self.rand_endpoint_locked(&inner, 0);
        };
        // The slot may have been recycled by a fleet replacement while the
        // caller held on to this endpoint; trust it only if it still holds
        // this exact record.
        if !inner.ring.holds(slot, current) {
            return self.rand_endpoint_locked(&inner, 0);
        }

        let successor = inner.ring.next_slot(slot)?;
        if let Some(endpoint) = inner
            .ring
            .iter_from(successor)
            .find(|endpoint| endpoint.id() >= inner.valid_min_id && !endpoint.is_blacklisted())
        {
            return Some(endpoint.clone());
        }
        self.rand_endpoint_locked(&inner, 0)
    }

    /// Demote a failed endpoint and hand back a replacement.
    ///
    /// Idempotent on already-blacklisted handles. The endpoint is unlinked
    /// from the ring (when it is still a member), flagged, and recorded in
    /// the blacklist if it belongs to the current generation; stale records
    /// are dropped. Draining the ring wakes the keep-alive loop.
    pub(crate) fn add_endpoint_to_blacklist(&self, endpoint: &Endpoint) -> Option<Endpoint> {
        let mut inner = self.inner.lock();

        if endpoint.is_blacklisted() {
            tracing::debug!(%endpoint, "endpoint already blacklisted");
            return self.rand_endpoint_locked(&inner, 0);
        }

        if let Some(slot) = endpoint.slot() {
            if inner.ring.holds(slot, endpoint) {
                inner.ring.unlink(slot);
                if inner.ring.is_empty() {
                    tracing::warn!("endpoint ring drained, waking keep-alive loop");
                    self.drained.notify_one();
                }
            }
        }
        endpoint.set_slot(None);
        endpoint.set_blacklisted(true);

        if endpoint.id() >= inner.valid_min_id {
            tracing::info!(%endpoint, "endpoint added to blacklist");
            inner
                .blacklist
                .insert(endpoint.url().to_owned(), endpoint.clone());
        }

        self.rand_endpoint_locked(&inner, 0)
    }

    /// Rehabilitate a blacklisted endpoint by canonical URL. Returns whether
    /// it was reinserted into the ring; stale entries are dropped silently.
    pub(crate) fn rm_endpoint_from_blacklist(&self, url: &str) -> bool {
        let mut inner = self.inner.lock();

        let Some(endpoint) = inner.blacklist.get(url).cloned() else {
            return false;
        };
        if !endpoint.is_blacklisted() {
            return false;
        }

        inner.blacklist.remove(url);
        endpoint.set_blacklisted(false);

        if endpoint.id() >= inner.valid_min_id {
            let slot = inner.ring.insert_sorted(endpoint.clone());
            endpoint.set_slot(Some(slot));
            tracing::info!(%endpoint, "endpoint removed from blacklist");
            true
        } else {
            tracing::debug!(%endpoint, "stale blacklist entry dropped");
            false
        }
    }

    /// Insert a fresh endpoint into the ring, stamped with the current
    /// generation. Refused when its URL is blacklisted or already live.
    pub(crate) fn insert_to_endpoint_head(&self, endpoint: &Endpoint) -> bool {
        let mut inner = self.inner.lock();

        if endpoint.is_blacklisted() || inner.blacklist.contains_key(endpoint.url()) {
            return false;
        }
        if inner.ring.contains_url(endpoint.url()) {
            return false;
        }

        endpoint.set_id(inner.valid_min_id);
        let slot = inner.ring.insert_sorted(endpoint.clone());
        endpoint.set_slot(Some(slot));
        tracing::info!(%endpoint, "endpoint promoted into ring");
        true
    }
}

/// Background task handle; the task is aborted when the collection is
/// dropped.
#[derive(Debug, Default)]
struct UpdateTask(Mutex<Option<JoinHandle<()>>>);

impl Drop for UpdateTask {
    fn drop(&mut self) {
        if let Some(task) = self.0.get_mut().take() {
            task.abort();
        }
    }
}

/// A client-side pool of RGW endpoints with health-aware failover.
///
/// Callers pick an endpoint with [`get_rand_endpoint`](Self::get_rand_endpoint)
/// or [`get_next_endpoint`](Self::get_next_endpoint), issue their request, and
/// report failures with
/// [`add_endpoint_to_blacklist`](Self::add_endpoint_to_blacklist), which hands
/// back a replacement. A background keep-alive task pulls the authoritative
/// fleet from a live endpoint, probes blacklisted ones, and falls back to the
/// seed file when every endpoint has been demoted.
///
/// An endpoint returned by a selector is valid at the moment of return; it
/// may be demoted by another task before or during the caller's request,
/// which is why demotion is idempotent.
#[derive(Debug)]
pub struct EndpointCollection {
    pub(crate) core: Arc<PoolCore>,
    update_task: UpdateTask,
}

impl EndpointCollection {
    /// Read the seed file at `path` and build a collection from it.
    ///
    /// The keep-alive task is not started here; call
    /// [`spawn_tasks`](Self::spawn_tasks) from within a tokio runtime (the
    /// global registry does this when it constructs a collection).
    pub fn new(path: impl AsRef<Path>, options: EndpointOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::Config("endpoint path is empty".to_owned()));
        }

        let http = build_http_client(&options)?;
        let core = Arc::new(PoolCore {
            inner: Mutex::new(Inner {
                last_epoch: -1,
                ..Default::default()
            }),
            drained: Notify::new(),
            http,
            options,
        });
        core.read_endpoints_from_file(path, true)?;

        Ok(Self {
            core,
            update_task: UpdateTask::default(),
        })
    }

    /// Start the keep-alive task which keeps the collection fresh. A no-op
    /// when the task is already running.
    pub fn spawn_tasks(&self) {
        let mut task = self.update_task.0.lock();
        if task.is_none() {
            let core = Arc::clone(&self.core);
            let span = tracing::warn_span!("endpoint keep-alive");
            *task = Some(tokio::spawn(core.keep_alive().instrument(span)));
        }
    }

    /// Stop the keep-alive task. The collection remains usable but stops
    /// refreshing until [`spawn_tasks`](Self::spawn_tasks) is called again.
    pub fn shut_down_tasks(&self) {
        if let Some(task) = self.update_task.0.lock().take() {
            task.abort();
        }
    }

    /// Pick a uniformly random live endpoint; `None` when the ring is empty.
    ///
    /// A non-zero `retry_count` lands that many hops from the head instead of
    /// drawing randomly.
    pub fn get_rand_endpoint(&self, retry_count: usize) -> Option<Endpoint> {
        self.core.get_rand_endpoint(retry_count)
    }

    /// First valid successor of `current`, for sequential retry. Falls back
    /// to a random pick when `current` is stale, blacklisted, or unlinked.
    pub fn get_next_endpoint(&self, current: &Endpoint) -> Option<Endpoint> {
        self.core.get_next_endpoint(current)
    }

    /// Demote a failed endpoint; returns a random replacement, or `None`
    /// when the demotion drained the ring.
    pub fn add_endpoint_to_blacklist(&self, endpoint: &Endpoint) -> Option<Endpoint> {
        self.core.add_endpoint_to_blacklist(endpoint)
    }

    /// Rehabilitate a blacklisted endpoint by canonical URL.
    pub fn rm_endpoint_from_blacklist(&self, url: &str) -> bool {
        self.core.rm_endpoint_from_blacklist(url)
    }

    /// Insert a fresh endpoint into the ring; refused for blacklisted or
    /// already-live URLs.
    pub fn insert_to_endpoint_head(&self, endpoint: &Endpoint) -> bool {
        self.core.insert_to_endpoint_head(endpoint)
    }

    /// Replace the whole fleet with `endpoints` at server epoch `epoch`.
    pub fn update_whole_collection(
        &self,
        endpoints: Vec<Endpoint>,
        epoch: i64,
    ) -> Result<(), Error> {
        self.core.update_whole_collection(endpoints, epoch)
    }

    /// Re-read an endpoint file and install its contents as the fleet.
    pub fn read_endpoints_from_file(
        &self,
        path: impl AsRef<Path>,
        is_seed: bool,
    ) -> Result<(), Error> {
        self.core.read_endpoints_from_file(path.as_ref(), is_seed)
    }

    /// Number of endpoints currently selectable.
    pub fn num_active(&self) -> usize {
        self.core.num_active()
    }

    /// Server-reported epoch of the current fleet; -1 before the first
    /// server-driven refresh.
    pub fn last_epoch(&self) -> i64 {
        self.core.last_epoch()
    }

    /// Current generation stamp.
    pub fn valid_min_id(&self) -> u64 {
        self.core.valid_min_id()
    }

    /// Whether an endpoint with this canonical URL is live in the ring.
    pub fn is_active(&self, url: &str) -> bool {
        self.core.is_active(url)
    }

    /// Snapshot of the seed descriptors loaded at construction.
    pub fn seeds(&self) -> Vec<EndpointDescriptor> {
        self.core.seeds()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::test_utils::{seed_file, setup_test};

    fn three_endpoint_collection() -> (NamedTempFile, EndpointCollection) {
        let file = seed_file(&[
            "http://abc1.test:8080",
            "http://abc2.test:8080",
            "http://abc3.test:8080",
            "#comment",
        ]);
        let collection =
            EndpointCollection::new(file.path(), EndpointOptions::default()).expect("seed load");
        (file, collection)
    }

    #[test]
    fn test_seed_load() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        assert_eq!(collection.num_active(), 3);
        assert_eq!(collection.last_epoch(), -1);
        assert_eq!(collection.valid_min_id(), 1);
        assert_eq!(collection.seeds().len(), 3);
        for url in [
            "http://abc1.test:8080",
            "http://abc2.test:8080",
            "http://abc3.test:8080",
        ] {
            assert!(collection.is_active(url), "{url} missing from ring");
        }
    }

    #[test]
    fn test_seed_load_skips_noise_lines() {
        setup_test();
        let file = seed_file(&["", "# all noise", "ab", "http://abc1.test:8080", "   "]);
        let collection =
            EndpointCollection::new(file.path(), EndpointOptions::default()).unwrap();
        assert_eq!(collection.num_active(), 1);
        assert_eq!(collection.seeds().len(), 1);
    }

    #[test]
    fn test_constructor_rejects_empty_path() {
        assert!(matches!(
            EndpointCollection::new("", EndpointOptions::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_constructor_rejects_missing_file() {
        assert!(matches!(
            EndpointCollection::new("./does_not_exist_3434", EndpointOptions::default()),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_constructor_rejects_malformed_seed() {
        let file = seed_file(&["http://abc1.test:8080", "abc2.test:notaport"]);
        assert!(matches!(
            EndpointCollection::new(file.path(), EndpointOptions::default()),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_update_whole_collection_replaces_fleet() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        let replacements = vec![
            Endpoint::parse("http://abc4.test:8080").unwrap(),
            Endpoint::parse("http://abc5.test:8080").unwrap(),
        ];
        collection
            .update_whole_collection(replacements.clone(), 34)
            .unwrap();

        assert_eq!(collection.valid_min_id(), 2);
        assert_eq!(collection.last_epoch(), 34);
        assert_eq!(collection.num_active(), 2);
        for url in [
            "http://abc1.test:8080",
            "http://abc2.test:8080",
            "http://abc3.test:8080",
        ] {
            assert!(!collection.is_active(url), "{url} should be gone");
        }
        for endpoint in &replacements {
            assert!(collection.is_active(endpoint.url()));
            assert_eq!(endpoint.id(), 2);
        }
        assert!(collection.core.inner.lock().blacklist.is_empty());
    }

    #[test]
    fn test_update_whole_collection_rejects_empty_fleet() {
        let (_file, collection) = three_endpoint_collection();
        assert!(matches!(
            collection.update_whole_collection(Vec::new(), 5),
            Err(Error::EmptyFleet)
        ));
        // Nothing changed.
        assert_eq!(collection.num_active(), 3);
        assert_eq!(collection.valid_min_id(), 1);
    }

    #[test]
    fn test_get_rand_endpoint_returns_valid_member() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();
        for _ in 0..32 {
            let endpoint = collection.get_rand_endpoint(0).expect("ring is non-empty");
            assert!(collection.is_active(endpoint.url()));
            assert!(!endpoint.is_blacklisted());
            assert!(endpoint.id() >= collection.valid_min_id());
        }
    }

    #[test]
    fn test_get_rand_endpoint_empty_ring() {
        let (_file, collection) = three_endpoint_collection();
        collection.core.inner.lock().ring.clear();
        assert!(collection.get_rand_endpoint(0).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blacklist_drain_and_recovery() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        let first = collection.get_rand_endpoint(0).unwrap();
        let second = collection
            .add_endpoint_to_blacklist(&first)
            .expect("two endpoints remain");
        assert!(first.is_blacklisted());
        assert!(!collection.is_active(first.url()));
        assert_eq!(collection.num_active(), 2);

        let third = collection
            .add_endpoint_to_blacklist(&second)
            .expect("one endpoint remains");
        assert_eq!(collection.num_active(), 1);

        // Demoting the last member drains the ring and signals the
        // keep-alive loop.
        assert!(collection.add_endpoint_to_blacklist(&third).is_none());
        assert_eq!(collection.num_active(), 0);
        tokio::time::timeout(Duration::from_millis(100), collection.core.drained.notified())
            .await
            .expect("drain signal fired");

        // Rehabilitate in reverse order.
        for (expected_active, endpoint) in [&third, &second, &first].into_iter().enumerate() {
            assert!(collection.rm_endpoint_from_blacklist(endpoint.url()));
            assert_eq!(collection.num_active(), expected_active + 1);
            assert!(collection.is_active(endpoint.url()));
            assert!(!endpoint.is_blacklisted());
        }
    }

    #[test]
    fn test_add_endpoint_to_blacklist_is_idempotent() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        let endpoint = collection.get_rand_endpoint(0).unwrap();
        collection.add_endpoint_to_blacklist(&endpoint);
        assert_eq!(collection.num_active(), 2);

        // A second demotion of the same handle must not mutate anything.
        let replacement = collection.add_endpoint_to_blacklist(&endpoint);
        assert!(replacement.is_some());
        assert_eq!(collection.num_active(), 2);
        assert_eq!(collection.core.inner.lock().blacklist.len(), 1);
    }

    #[test]
    fn test_blacklist_foreign_endpoint_leaves_count_alone() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        // A handle that was never part of this ring: flagged but the active
        // count is untouched, and its stale stamp keeps it out of the map.
        let foreign = Endpoint::parse("http://abc9.test:8080").unwrap();
        let replacement = collection.add_endpoint_to_blacklist(&foreign);
        assert!(replacement.is_some());
        assert!(foreign.is_blacklisted());
        assert_eq!(collection.num_active(), 3);
        assert!(collection.core.inner.lock().blacklist.is_empty());
    }

    #[test]
    fn test_rm_endpoint_from_blacklist_unknown_url() {
        let (_file, collection) = three_endpoint_collection();
        assert!(!collection.rm_endpoint_from_blacklist("http://abc9.test:8080"));
    }

    #[test]
    fn test_rm_endpoint_from_blacklist_drops_stale_entry() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        let endpoint = collection.get_rand_endpoint(0).unwrap();
        collection.add_endpoint_to_blacklist(&endpoint);

        // Manually age the entry below the current generation.
        endpoint.set_id(0);
        assert!(!collection.rm_endpoint_from_blacklist(endpoint.url()));
        assert!(!collection.is_active(endpoint.url()));
        assert!(
            !collection
                .core
                .inner
                .lock()
                .blacklist
                .contains_key(endpoint.url()),
            "stale entry must be purged from the map"
        );
    }

    #[test]
    fn test_get_next_skips_blacklisted_in_place() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        // Flag the first two ring members in place, without unlinking, the
        // way a caller racing a demotion would observe them.
        let (head, second, third) = {
            let inner = collection.core.inner.lock();
            let mut cycle = inner.ring.iter();
            (
                cycle.next().unwrap().clone(),
                cycle.next().unwrap().clone(),
                cycle.next().unwrap().clone(),
            )
        };
        head.set_blacklisted(true);
        second.set_blacklisted(true);

        let next = collection.get_next_endpoint(&head).expect("third is valid");
        assert_eq!(next.url(), third.url());

        let next = collection.get_next_endpoint(&second).expect("third is valid");
        assert_eq!(next.url(), third.url());
    }

    #[test]
    fn test_get_next_of_valid_member_is_successor() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        let (head, second) = {
            let inner = collection.core.inner.lock();
            let mut cycle = inner.ring.iter();
            (cycle.next().unwrap().clone(), cycle.next().unwrap().clone())
        };
        let next = collection.get_next_endpoint(&head).unwrap();
        assert_eq!(next.url(), second.url());
    }

    #[test]
    fn test_get_next_falls_back_for_foreign_endpoint() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        let foreign = Endpoint::parse("http://abc9.test:8080").unwrap();
        let next = collection.get_next_endpoint(&foreign).expect("fallback pick");
        assert!(collection.is_active(next.url()));
    }

    #[test]
    fn test_insert_to_endpoint_head() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        let head = collection.core.inner.lock().ring.iter().next().unwrap().clone();
        collection.add_endpoint_to_blacklist(&head);

        // Blacklisted and already-live endpoints are refused.
        assert!(!collection.insert_to_endpoint_head(&head));
        let live = Endpoint::parse("http://abc2.test:8080").unwrap();
        assert!(!collection.insert_to_endpoint_head(&live));

        let fresh = Endpoint::parse("http://abc9.test:8080").unwrap();
        assert!(collection.insert_to_endpoint_head(&fresh));
        assert_eq!(collection.num_active(), 3);
        assert_eq!(fresh.id(), collection.valid_min_id());
        assert!(collection.is_active(fresh.url()));
    }

    #[test]
    fn test_ring_stays_sorted_through_churn() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        let second = {
            let inner = collection.core.inner.lock();
            let second = inner.ring.iter().nth(1).unwrap().clone();
            second
        };
        collection.add_endpoint_to_blacklist(&second);
        assert!(collection.rm_endpoint_from_blacklist(second.url()));

        let inner = collection.core.inner.lock();
        let keys: Vec<_> = inner.ring.iter().map(|e| e.host_and_port().to_owned()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted, "ring order must survive demote/promote");
        assert_eq!(inner.ring.len(), 3);
    }

    #[test]
    fn test_fleet_replacement_invalidates_blacklist() {
        setup_test();
        let (_file, collection) = three_endpoint_collection();

        let endpoint = collection.get_rand_endpoint(0).unwrap();
        collection.add_endpoint_to_blacklist(&endpoint);

        collection
            .update_whole_collection(
                vec![Endpoint::parse("http://abc4.test:8080").unwrap()],
                7,
            )
            .unwrap();

        // The old entry is gone and a stale rehabilitation attempt is a
        // no-op.
        assert!(collection.core.inner.lock().blacklist.is_empty());
        assert!(!collection.rm_endpoint_from_blacklist(endpoint.url()));
        assert!(!collection.is_active(endpoint.url()));
    }
}
