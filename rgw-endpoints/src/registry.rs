use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::{collection::EndpointCollection, error::Error, options::EndpointOptions};

lazy_static! {
    /// Process-wide registry. SDK entry points resolve their seed path
    /// through this instance so every component of a process shares one
    /// collection (and one keep-alive task) per fleet.
    pub static ref GLOBAL_ENDPOINTS: EndpointRegistry = EndpointRegistry::default();
}

/// Hands out one shared [`EndpointCollection`] per seed-file path.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    collections: Mutex<HashMap<PathBuf, Arc<EndpointCollection>>>,
}

impl EndpointRegistry {
    /// Return the collection registered for `path`, constructing it and
    /// starting its keep-alive task on first use.
    ///
    /// Serialized by the registry mutex, so concurrent lookups of the same
    /// path yield the same instance. Must be called from within a tokio
    /// runtime. A failed construction leaves the path unregistered.
    pub fn find_endpoint_collection(
        &self,
        path: impl AsRef<Path>,
        options: EndpointOptions,
    ) -> Result<Arc<EndpointCollection>, Error> {
        let path = path.as_ref();
        let mut collections = self.collections.lock();
        if let Some(existing) = collections.get(path) {
            return Ok(Arc::clone(existing));
        }

        let collection = Arc::new(EndpointCollection::new(path, options)?);
        collection.spawn_tasks();
        collections.insert(path.to_owned(), Arc::clone(&collection));
        Ok(collection)
    }
}
