use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::joblog::JobLog;
use crate::registry::Registry;
use crate::state_machine::{Next, State, StateHandler};

/// Removes tags of a repository from the target. With no tags given, every
/// tag the target has for the repository is removed.
pub struct Deleter {
    repository: String,
    tags: Vec<String>,
    target: Arc<dyn Registry>,
    log: JobLog,
}

impl Deleter {
    pub fn new(
        repository: String,
        tags: Vec<String>,
        target: Arc<dyn Registry>,
        log: JobLog,
    ) -> Self {
        Self {
            repository,
            tags,
            target,
            log,
        }
    }
}

#[async_trait]
impl StateHandler for Deleter {
    async fn enter(&self) -> Result<Next, HandlerError> {
        let tags = if self.tags.is_empty() {
            self.target.list_tags(&self.repository).await?
        } else {
            self.tags.clone()
        };

        for tag in &tags {
            self.target.delete_tag(&self.repository, tag).await?;
            self.log
                .line(format!("deleted {}:{tag} on target", self.repository))
                .await;
        }
        self.log
            .line(format!("{} tags of {} deleted", tags.len(), self.repository))
            .await;
        Ok(Next::Goto(State::Finished))
    }
}
