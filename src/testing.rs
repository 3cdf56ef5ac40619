//! In-memory registry fakes and a seeded store for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use tokio::sync::Notify;

use crate::registry::{
    BlobStream, Credential, MEDIA_TYPE_SCHEMA2, Manifest, Registry, RegistryConnector,
    RegistryError,
};
use crate::services::Services;
use crate::store::{JobStore, MemoryStore, NewJob, RepPolicy, RepProject, RepTarget};

pub const SOURCE_URL: &str = "http://source.local";
pub const TARGET_URL: &str = "http://target.remote";

type Hook = Box<dyn Fn() + Send + Sync>;

/// A blob stream yielding `data` as a single chunk.
pub fn blob_stream(data: Vec<u8>) -> BlobStream {
    futures::stream::iter([Ok(Bytes::from(data))]).boxed()
}

/// Drains a blob stream into memory.
pub async fn read_blob(stream: BlobStream) -> Result<Vec<u8>, RegistryError> {
    let chunks: Vec<Bytes> = stream.try_collect().await?;
    Ok(chunks.concat())
}

#[derive(Default)]
struct Contents {
    manifests: BTreeMap<(String, String), Manifest>,
    blobs: HashMap<String, Vec<u8>>,
    ping_fails: bool,
}

/// Registry backed by maps. Every call is recorded as a short string.
#[derive(Default)]
pub struct FakeRegistry {
    contents: Mutex<Contents>,
    calls: Mutex<Vec<String>>,
    pull_blob_hook: Mutex<Option<Hook>>,
    pull_blob_gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FakeRegistry {
    /// Adds a schema 2 image whose config blob is derived from the tag.
    pub fn add_image(&self, repository: &str, tag: &str, layers: &[&str]) {
        let config = format!("sha256:config-{tag}");
        let layer_json: Vec<serde_json::Value> = layers
            .iter()
            .map(|digest| serde_json::json!({"mediaType": "layer", "size": 1, "digest": digest}))
            .collect();
        let payload = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_SCHEMA2,
            "config": {"mediaType": "config", "size": 1, "digest": &config},
            "layers": layer_json,
        });

        let mut contents = self.contents.lock().unwrap();
        contents.blobs.insert(config.clone(), config.into_bytes());
        for digest in layers {
            contents
                .blobs
                .insert(digest.to_string(), digest.as_bytes().to_vec());
        }
        contents.manifests.insert(
            (repository.to_string(), tag.to_string()),
            Manifest {
                media_type: MEDIA_TYPE_SCHEMA2.to_string(),
                payload: serde_json::to_vec(&payload).unwrap(),
                digest: Some(format!("sha256:manifest-{tag}")),
            },
        );
    }

    pub fn has_manifest(&self, repository: &str, tag: &str) -> bool {
        self.contents
            .lock()
            .unwrap()
            .manifests
            .contains_key(&(repository.to_string(), tag.to_string()))
    }

    pub fn fail_ping(&self) {
        self.contents.lock().unwrap().ping_fails = true;
    }

    /// Runs `hook` at the start of every `pull_blob`.
    pub fn on_pull_blob(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.pull_blob_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Makes the next `pull_blob` notify `reached`, then wait for `release`.
    pub fn gate_pull_blob(&self, reached: Arc<Notify>, release: Arc<Notify>) {
        *self.pull_blob_gate.lock().unwrap() = Some((reached, release));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn ping(&self) -> Result<(), RegistryError> {
        self.record("ping".into());
        if self.contents.lock().unwrap().ping_fails {
            return Err(RegistryError::Status {
                method: "GET",
                url: "/v2/".into(),
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<String>, RegistryError> {
        self.record("list_repositories".into());
        let mut repositories: Vec<String> = self
            .contents
            .lock()
            .unwrap()
            .manifests
            .keys()
            .map(|(repo, _)| repo.clone())
            .collect();
        repositories.dedup();
        Ok(repositories)
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        self.record(format!("list_tags {repository}"));
        Ok(self
            .contents
            .lock()
            .unwrap()
            .manifests
            .keys()
            .filter(|(repo, _)| repo == repository)
            .map(|(_, tag)| tag.clone())
            .collect())
    }

    async fn pull_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<Manifest, RegistryError> {
        self.record(format!("pull_manifest {repository}:{reference}"));
        self.contents
            .lock()
            .unwrap()
            .manifests
            .get(&(repository.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("{repository}:{reference}")))
    }

    async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        manifest: &Manifest,
    ) -> Result<(), RegistryError> {
        self.record(format!("push_manifest {repository}:{reference}"));
        self.contents.lock().unwrap().manifests.insert(
            (repository.to_string(), reference.to_string()),
            manifest.clone(),
        );
        Ok(())
    }

    async fn blob_exists(&self, _repository: &str, digest: &str) -> Result<bool, RegistryError> {
        Ok(self.contents.lock().unwrap().blobs.contains_key(digest))
    }

    async fn pull_blob(&self, _repository: &str, digest: &str) -> Result<BlobStream, RegistryError> {
        self.record(format!("pull_blob {digest}"));
        {
            let hook = self.pull_blob_hook.lock().unwrap();
            if let Some(hook) = hook.as_ref() {
                hook();
            }
        }
        let gate = self.pull_blob_gate.lock().unwrap().take();
        if let Some((reached, release)) = gate {
            reached.notify_one();
            release.notified().await;
        }
        self.contents
            .lock()
            .unwrap()
            .blobs
            .get(digest)
            .cloned()
            .map(blob_stream)
            .ok_or_else(|| RegistryError::NotFound(digest.to_string()))
    }

    async fn push_blob(
        &self,
        _repository: &str,
        digest: &str,
        data: BlobStream,
    ) -> Result<(), RegistryError> {
        self.record(format!("push_blob {digest}"));
        let data = read_blob(data).await?;
        self.contents
            .lock()
            .unwrap()
            .blobs
            .insert(digest.to_string(), data);
        Ok(())
    }

    async fn delete_tag(&self, repository: &str, tag: &str) -> Result<(), RegistryError> {
        self.record(format!("delete {repository}:{tag}"));
        self.contents
            .lock()
            .unwrap()
            .manifests
            .remove(&(repository.to_string(), tag.to_string()))
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(format!("{repository}:{tag}")))
    }
}

/// Hands out fixed [`FakeRegistry`] instances by URL.
#[derive(Default)]
pub struct FakeConnector {
    registries: HashMap<String, Arc<FakeRegistry>>,
    connections: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn with(mut self, url: &str, registry: Arc<FakeRegistry>) -> Self {
        self.registries.insert(url.to_string(), registry);
        self
    }

    pub fn connections(&self) -> Vec<String> {
        self.connections.lock().unwrap().clone()
    }
}

impl RegistryConnector for FakeConnector {
    fn connect(
        &self,
        url: &str,
        _credential: Option<Credential>,
    ) -> Result<Arc<dyn Registry>, RegistryError> {
        self.connections.lock().unwrap().push(url.to_string());
        match self.registries.get(url) {
            Some(registry) => Ok(Arc::clone(registry) as Arc<dyn Registry>),
            None => Err(RegistryError::InvalidUrl {
                url: url.to_string(),
                message: "unknown fake registry".into(),
            }),
        }
    }
}

/// A store holding one enabled policy (id 1) of project 1 (`library`)
/// pointing at target 1, wired to a fake source and target registry.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub source: Arc<FakeRegistry>,
    pub target: Arc<FakeRegistry>,
    pub connector: Arc<FakeConnector>,
    pub services: Arc<Services>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.insert_target(RepTarget {
            id: 1,
            name: "remote".into(),
            url: TARGET_URL.into(),
            username: "admin".into(),
            password: "secret".into(),
        });
        store.insert_project(RepProject {
            id: 1,
            name: "library".into(),
        });
        store.insert_policy(RepPolicy {
            id: 1,
            name: "nightly".into(),
            project_id: 1,
            target_id: 1,
            enabled: true,
        });

        let source = Arc::new(FakeRegistry::default());
        let target = Arc::new(FakeRegistry::default());
        let connector = Arc::new(
            FakeConnector::default()
                .with(SOURCE_URL, Arc::clone(&source))
                .with(TARGET_URL, Arc::clone(&target)),
        );
        let services = Arc::new(
            Services::new(store.clone(), connector.clone())
                .with_source(SOURCE_URL, Some(Credential::Secret("ui-secret".into()))),
        );
        Self {
            store,
            source,
            target,
            connector,
            services,
        }
    }

    pub fn services_with(&self, f: impl FnOnce(Services) -> Services) -> Services {
        f(Services::clone(&self.services))
    }

    pub fn disable_policy(&self) {
        self.store.insert_policy(RepPolicy {
            id: 1,
            name: "nightly".into(),
            project_id: 1,
            target_id: 1,
            enabled: false,
        });
    }

    pub async fn add_job(&self, operation: &str, tags: &[&str]) -> i64 {
        self.store
            .add_job(NewJob {
                policy_id: 1,
                repository: "library/alpine".into(),
                operation: operation.into(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            })
            .await
            .unwrap()
    }
}
