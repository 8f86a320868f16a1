//! Client-side RGW endpoint pool with health-aware failover and background
//! fleet refresh.
//!
//! Application code asks an [`EndpointCollection`] for an endpoint, issues
//! its request against it, and reports failures back with
//! [`EndpointCollection::add_endpoint_to_blacklist`], which hands out a
//! replacement. The pool masks individual gateway failures, rediscovers the
//! current fleet from any live member, and rejoins previously-blacklisted
//! gateways once they answer probes again.
//!
//! Collections are usually obtained through the process-wide
//! [`GLOBAL_ENDPOINTS`] registry, which guarantees a single shared pool (and
//! a single keep-alive task) per seed file:
//!
//! ```no_run
//! use rgw_endpoints::{EndpointOptions, GLOBAL_ENDPOINTS};
//!
//! # async fn example() -> Result<(), rgw_endpoints::Error> {
//! let pool = GLOBAL_ENDPOINTS.find_endpoint_collection(
//!     "/etc/rgw/endpoints.conf",
//!     EndpointOptions::default(),
//! )?;
//!
//! let endpoint = pool.get_rand_endpoint(0).expect("fleet is reachable");
//! // ... issue a request against endpoint.url() ...
//! let _replacement = pool.add_endpoint_to_blacklist(&endpoint);
//! # Ok(())
//! # }
//! ```

mod collection;
mod endpoint;
mod error;
mod http;
mod options;
mod refresh;
mod registry;
mod ring;

pub use collection::EndpointCollection;
pub use endpoint::{parse_endpoint, Endpoint, EndpointDescriptor, MIN_ENDPOINT_LENGTH};
pub use error::Error;
pub use options::EndpointOptions;
pub use registry::{EndpointRegistry, GLOBAL_ENDPOINTS};
