//! Errors raised while talking to a registry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry answered with an unexpected HTTP status.
    #[error("{method} {url} returned status {status}: {message}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        message: String,
    },

    /// The requested manifest or blob does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A manifest could not be parsed.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A response lacked a header the protocol requires.
    #[error("missing {header} header in response from {url}")]
    MissingHeader { header: &'static str, url: String },

    /// The endpoint URL was malformed.
    #[error("invalid registry url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// Transport failure (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
