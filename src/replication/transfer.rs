//! Handlers for the `transfer` graph:
//! check → pull manifest → transfer blobs → push manifest, once per tag.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};

use super::session::{PulledManifest, Session};
use crate::error::HandlerError;
use crate::state_machine::{Next, State, StateHandler};

/// Makes sure the target answers and settles the tag list.
pub struct Checker {
    session: Arc<Session>,
}

impl Checker {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl StateHandler for Checker {
    async fn enter(&self) -> Result<Next, HandlerError> {
        let session = &self.session;
        session.log.line("checking target registry").await;
        session.target.ping().await?;

        if !session.has_tags() {
            let tags = session.source.list_tags(&session.repository).await?;
            session
                .log
                .line(format!(
                    "no tags given, replicating all {} tags of {}",
                    tags.len(),
                    session.repository
                ))
                .await;
            session.set_tags(tags);
        }
        Ok(Next::Continue)
    }
}

/// Pulls the manifest of the next tag, or finishes when none are left.
pub struct ManifestPuller {
    session: Arc<Session>,
}

impl ManifestPuller {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl StateHandler for ManifestPuller {
    async fn enter(&self) -> Result<Next, HandlerError> {
        let session = &self.session;
        let Some(tag) = session.next_tag() else {
            session.log.line("no more tags to replicate").await;
            return Ok(Next::Goto(State::Finished));
        };

        session
            .log
            .line(format!("pulling manifest of {}:{tag}", session.repository))
            .await;
        let manifest = session
            .source
            .pull_manifest(&session.repository, &tag)
            .await?;
        let blobs = manifest.blobs()?;
        session
            .log
            .line(format!(
                "manifest of {}:{tag} references {} blobs",
                session.repository,
                blobs.len()
            ))
            .await;
        session.set_current(PulledManifest {
            tag,
            manifest,
            blobs,
        });
        Ok(Next::Goto(State::TransferBlob))
    }
}

/// Copies the blobs of the pulled manifest that the target lacks.
pub struct BlobTransfer {
    session: Arc<Session>,
}

impl BlobTransfer {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl StateHandler for BlobTransfer {
    async fn enter(&self) -> Result<Next, HandlerError> {
        let session = &self.session;
        let pulled = session
            .current()
            .ok_or_else(|| HandlerError::Protocol("no manifest pulled before blob transfer".into()))?;

        let mut copied = 0;
        for digest in &pulled.blobs {
            if session.target.blob_exists(&session.repository, digest).await? {
                session
                    .log
                    .line(format!("blob {digest} already exists on target"))
                    .await;
                continue;
            }
            let size = Arc::new(AtomicU64::new(0));
            let counter = Arc::clone(&size);
            let data = session
                .source
                .pull_blob(&session.repository, digest)
                .await?
                .inspect_ok(move |chunk| {
                    counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                })
                .boxed();
            session
                .target
                .push_blob(&session.repository, digest, data)
                .await?;
            let size = size.load(Ordering::Relaxed);
            session
                .log
                .line(format!("blob {digest} ({size} bytes) transferred"))
                .await;
            copied += 1;
        }
        session
            .log
            .line(format!(
                "{copied} of {} blobs of tag {} transferred",
                pulled.blobs.len(),
                pulled.tag
            ))
            .await;
        Ok(Next::Continue)
    }
}

/// Writes the pulled manifest to the target, then loops back for the next tag.
pub struct ManifestPusher {
    session: Arc<Session>,
}

impl ManifestPusher {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl StateHandler for ManifestPusher {
    async fn enter(&self) -> Result<Next, HandlerError> {
        let session = &self.session;
        let pulled = session
            .take_current()
            .ok_or_else(|| HandlerError::Protocol("no manifest pulled before push".into()))?;

        session
            .target
            .push_manifest(&session.repository, &pulled.tag, &pulled.manifest)
            .await?;
        session
            .log
            .line(format!(
                "manifest of {}:{} pushed, {} tags remaining",
                session.repository,
                pulled.tag,
                session.remaining()
            ))
            .await;
        Ok(Next::Continue)
    }
}
