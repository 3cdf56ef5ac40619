use std::path::PathBuf;
use std::sync::Arc;

use crate::crypto::{Decryptor, PlainText};
use crate::registry::{Credential, RegistryConnector};
use crate::store::JobStore;

/// Collaborators a machine needs to load and run a job.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn JobStore>,
    pub decryptor: Arc<dyn Decryptor>,
    pub connector: Arc<dyn RegistryConnector>,
    /// Registry the images are replicated from.
    pub source_url: String,
    pub source_credential: Option<Credential>,
    /// Directory for per-job logs. `None` keeps job logs in tracing only.
    pub log_dir: Option<PathBuf>,
}

impl Services {
    pub fn new(store: Arc<dyn JobStore>, connector: Arc<dyn RegistryConnector>) -> Self {
        Self {
            store,
            decryptor: Arc::new(PlainText),
            connector,
            source_url: String::new(),
            source_credential: None,
            log_dir: None,
        }
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn with_source(mut self, url: impl Into<String>, credential: Option<Credential>) -> Self {
        self.source_url = url.into();
        self.source_credential = credential;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}
