use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, LINK, LOCATION};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use super::{
    BlobStream, Credential, MEDIA_TYPE_OCI, MEDIA_TYPE_SCHEMA1, MEDIA_TYPE_SCHEMA2, Manifest,
    Registry, RegistryConnector, RegistryError,
};

const DIGEST_HEADER: &str = "Docker-Content-Digest";
const CATALOG_PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct Catalog {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

/// Client for one registry endpoint speaking the Docker Registry HTTP API v2.
///
/// The endpoint may carry a path prefix (`https://host/mirror`); API paths
/// are resolved below it.
pub struct HttpRegistry {
    // Always ends with `/` so relative joins keep the prefix.
    base_url: Url,
    credential: Option<Credential>,
    client: Client,
}

impl HttpRegistry {
    pub fn new(url: &str, credential: Option<Credential>) -> Result<Self, RegistryError> {
        let mut base_url = Url::parse(url).map_err(|e| RegistryError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        // No whole-request timeout: blob bodies are streamed and may be large.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url,
            credential,
            client,
        })
    }

    /// Resolves an API path such as `v2/<repo>/tags/list` below the base URL.
    fn url(&self, path: &str) -> Result<Url, RegistryError> {
        join(&self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credential {
            Some(Credential::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(Credential::Secret(secret)) => request.header(COOKIE, format!("uisecret={secret}")),
            None => request,
        }
    }

    fn manifest_accept() -> String {
        [MEDIA_TYPE_SCHEMA2, MEDIA_TYPE_OCI, MEDIA_TYPE_SCHEMA1].join(", ")
    }

    async fn send(
        &self,
        method: &'static str,
        request: RequestBuilder,
        url: &Url,
    ) -> Result<Response, RegistryError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(url.to_string()));
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(RegistryError::Status {
            method,
            url: url.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}

fn join(base: &Url, reference: &str) -> Result<Url, RegistryError> {
    base.join(reference).map_err(|e| RegistryError::InvalidUrl {
        url: format!("{base}{reference}"),
        message: e.to_string(),
    })
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The upload URL a blob-upload response points to, resolved against `url`.
fn upload_location(response: &Response, url: &Url) -> Result<Url, RegistryError> {
    let location =
        header_value(response, LOCATION.as_str()).ok_or_else(|| RegistryError::MissingHeader {
            header: "Location",
            url: url.to_string(),
        })?;
    join(url, &location)
}

/// Target of the `rel="next"` entry of a `Link` header.
fn next_link(header: &str) -> Option<&str> {
    header
        .split(',')
        .find(|entry| entry.contains("rel=\"next\""))
        .and_then(|entry| {
            let start = entry.find('<')? + 1;
            let end = entry.find('>')?;
            entry.get(start..end)
        })
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn ping(&self) -> Result<(), RegistryError> {
        let url = self.url("v2/")?;
        self.send("GET", self.client.get(url.clone()), &url).await?;
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<String>, RegistryError> {
        let mut url = self.url(&format!("v2/_catalog?n={CATALOG_PAGE_SIZE}"))?;
        let mut repositories = Vec::new();
        loop {
            let response = self.send("GET", self.client.get(url.clone()), &url).await?;
            let next = header_value(&response, LINK.as_str())
                .and_then(|link| next_link(&link).map(str::to_string));
            let page: Catalog = response.json().await?;
            repositories.extend(page.repositories.unwrap_or_default());
            match next {
                Some(next) => url = join(&url, &next)?,
                None => break,
            }
        }
        Ok(repositories)
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        let url = self.url(&format!("v2/{repository}/tags/list"))?;
        let response = self.send("GET", self.client.get(url.clone()), &url).await?;
        let list: TagList = response.json().await?;
        Ok(list.tags.unwrap_or_default())
    }

    async fn pull_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<Manifest, RegistryError> {
        let url = self.url(&format!("v2/{repository}/manifests/{reference}"))?;
        let request = self
            .client
            .get(url.clone())
            .header(ACCEPT, Self::manifest_accept());
        let response = self.send("GET", request, &url).await?;

        let media_type = header_value(&response, CONTENT_TYPE.as_str())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_string())
            .unwrap_or_else(|| MEDIA_TYPE_SCHEMA1.to_string());
        let digest = header_value(&response, DIGEST_HEADER);
        let payload = response.bytes().await?.to_vec();
        Ok(Manifest {
            media_type,
            payload,
            digest,
        })
    }

    async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        manifest: &Manifest,
    ) -> Result<(), RegistryError> {
        let url = self.url(&format!("v2/{repository}/manifests/{reference}"))?;
        let request = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, manifest.media_type.as_str())
            .body(manifest.payload.clone());
        self.send("PUT", request, &url).await?;
        Ok(())
    }

    async fn blob_exists(&self, repository: &str, digest: &str) -> Result<bool, RegistryError> {
        let url = self.url(&format!("v2/{repository}/blobs/{digest}"))?;
        match self.send("HEAD", self.client.head(url.clone()), &url).await {
            Ok(_) => Ok(true),
            Err(RegistryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pull_blob(&self, repository: &str, digest: &str) -> Result<BlobStream, RegistryError> {
        let url = self.url(&format!("v2/{repository}/blobs/{digest}"))?;
        let response = self.send("GET", self.client.get(url.clone()), &url).await?;
        Ok(response.bytes_stream().map_err(RegistryError::from).boxed())
    }

    /// Chunked upload: open a session, stream the body in one `PATCH`, then
    /// commit it under `digest`.
    async fn push_blob(
        &self,
        repository: &str,
        digest: &str,
        data: BlobStream,
    ) -> Result<(), RegistryError> {
        let url = self.url(&format!("v2/{repository}/blobs/uploads/"))?;
        let response = self.send("POST", self.client.post(url.clone()), &url).await?;
        let upload = upload_location(&response, &url)?;

        let request = self
            .client
            .patch(upload.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(data));
        let response = self.send("PATCH", request, &upload).await?;
        let mut commit = upload_location(&response, &upload)?;

        commit.query_pairs_mut().append_pair("digest", digest);
        self.send("PUT", self.client.put(commit.clone()), &commit)
            .await?;
        Ok(())
    }

    async fn delete_tag(&self, repository: &str, tag: &str) -> Result<(), RegistryError> {
        let url = self.url(&format!("v2/{repository}/manifests/{tag}"))?;
        let request = self
            .client
            .head(url.clone())
            .header(ACCEPT, Self::manifest_accept());
        let response = self.send("HEAD", request, &url).await?;
        let digest =
            header_value(&response, DIGEST_HEADER).ok_or_else(|| RegistryError::MissingHeader {
                header: DIGEST_HEADER,
                url: url.to_string(),
            })?;

        let url = self.url(&format!("v2/{repository}/manifests/{digest}"))?;
        self.send("DELETE", self.client.delete(url.clone()), &url)
            .await?;
        Ok(())
    }
}

/// Connects to registries over HTTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl RegistryConnector for HttpConnector {
    fn connect(
        &self,
        url: &str,
        credential: Option<Credential>,
    ) -> Result<Arc<dyn Registry>, RegistryError> {
        Ok(Arc::new(HttpRegistry::new(url, credential)?))
    }
}
