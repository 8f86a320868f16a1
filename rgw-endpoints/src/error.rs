use thiserror::Error;

/// Errors surfaced at the collection boundary.
///
/// Constructor errors abort collection creation; everything that goes wrong
/// inside the keep-alive loop is logged and swallowed, observable only through
/// selectors returning nothing.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read endpoint file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse endpoint: {0}")]
    Parse(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("endpoint list is empty")]
    EmptyFleet,
}
