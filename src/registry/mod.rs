//! The registry-client seam used by the replication handlers.
//!
//! [`Registry`] is the contract; [`HttpRegistry`] implements it against the
//! Docker Registry HTTP API v2.

pub mod error;
pub mod http;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Deserialize;

pub use error::RegistryError;
pub use http::{HttpConnector, HttpRegistry};

pub const MEDIA_TYPE_SCHEMA1: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";
pub const MEDIA_TYPE_SCHEMA2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_OCI: &str = "application/vnd.oci.image.manifest.v1+json";

/// Blob content as it arrives from a registry, chunk by chunk.
pub type BlobStream = BoxStream<'static, Result<Bytes, RegistryError>>;

/// How to authenticate against a registry.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Basic { username: String, password: String },
    /// Shared service secret, sent as the `uisecret` cookie.
    Secret(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::Secret(_) => f.write_str("Secret(<redacted>)"),
        }
    }
}

/// An image manifest as fetched from a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub media_type: String,
    pub payload: Vec<u8>,
    /// The `Docker-Content-Digest` reported by the registry, if any.
    pub digest: Option<String>,
}

#[derive(Deserialize)]
struct Descriptor {
    digest: String,
}

#[derive(Deserialize)]
struct FsLayer {
    #[serde(rename = "blobSum")]
    blob_sum: String,
}

#[derive(Deserialize)]
struct ManifestBody {
    #[serde(rename = "schemaVersion", default)]
    schema_version: u32,
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
    #[serde(rename = "fsLayers", default)]
    fs_layers: Vec<FsLayer>,
}

impl Manifest {
    /// Digests of every blob the manifest references, config first,
    /// without duplicates.
    pub fn blobs(&self) -> Result<Vec<String>, RegistryError> {
        let body: ManifestBody = serde_json::from_slice(&self.payload)
            .map_err(|e| RegistryError::InvalidManifest(e.to_string()))?;

        let digests: Vec<String> = match body.schema_version {
            1 => body.fs_layers.into_iter().map(|l| l.blob_sum).collect(),
            2 => body
                .config
                .into_iter()
                .chain(body.layers)
                .map(|d| d.digest)
                .collect(),
            other => {
                return Err(RegistryError::InvalidManifest(format!(
                    "unsupported schema version {other}"
                )));
            }
        };

        let mut unique = Vec::with_capacity(digests.len());
        for digest in digests {
            if !unique.contains(&digest) {
                unique.push(digest);
            }
        }
        Ok(unique)
    }
}

/// Operations the replication handlers need from a registry.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Checks that the registry is reachable and accepts the credential.
    async fn ping(&self) -> Result<(), RegistryError>;

    /// Every repository the registry holds, from its catalog.
    async fn list_repositories(&self) -> Result<Vec<String>, RegistryError>;

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError>;

    async fn pull_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<Manifest, RegistryError>;

    async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        manifest: &Manifest,
    ) -> Result<(), RegistryError>;

    async fn blob_exists(&self, repository: &str, digest: &str) -> Result<bool, RegistryError>;

    async fn pull_blob(&self, repository: &str, digest: &str) -> Result<BlobStream, RegistryError>;

    /// Uploads `data` under `digest`. The stream is consumed as it is sent.
    async fn push_blob(
        &self,
        repository: &str,
        digest: &str,
        data: BlobStream,
    ) -> Result<(), RegistryError>;

    /// Deletes the manifest `tag` points to.
    async fn delete_tag(&self, repository: &str, tag: &str) -> Result<(), RegistryError>;
}

/// Creates registry clients for endpoints known only at job time.
pub trait RegistryConnector: Send + Sync {
    fn connect(
        &self,
        url: &str,
        credential: Option<Credential>,
    ) -> Result<Arc<dyn Registry>, RegistryError>;
}
