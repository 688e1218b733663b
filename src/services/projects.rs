// services/projects.rs - Project update flow

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::db::entity_queries::{self, WriteSource};
use crate::models::Project;
use crate::queue::{OperationKind, OperationMetadata, OperationQueue};
use crate::Result;

pub struct ProjectService {
    pool: SqlitePool,
    queue: Arc<OperationQueue>,
}

impl ProjectService {
    pub fn new(pool: SqlitePool, queue: Arc<OperationQueue>) -> Self {
        Self { pool, queue }
    }

    pub async fn update_project(&self, mut project: Project) -> Result<Project> {
        project.last_updated = Utc::now();

        entity_queries::save_project(&self.pool, &project, WriteSource::LocalEdit).await?;

        self.queue
            .add(
                OperationKind::UpdateProject {
                    project: project.clone(),
                },
                Some(OperationMetadata {
                    version: Some(project.version + 1),
                    ..Default::default()
                }),
            )
            .await?;

        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextManager;
    use crate::db::Database;
    use crate::testutil::{sample_project, set_context};

    #[tokio::test]
    async fn update_saves_dirty_row_and_queues() {
        let db = Database::in_memory().await.unwrap();
        let context = Arc::new(ContextManager::new(db.pool.clone()));
        set_context(&context, "user-1", "acct-1").await;
        let queue = Arc::new(OperationQueue::new(db.pool.clone(), context));
        let service = ProjectService::new(db.pool.clone(), queue.clone());

        let mut project = sample_project("proj-1", "acct-1");
        project.budget = Some(12_000.0);

        let updated = service.update_project(project).await.unwrap();

        let stored = entity_queries::get_project(&db.pool, &updated.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.budget, Some(12_000.0));
        assert!(stored.last_synced_at.is_none());

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind.op_type(), "UPDATE_PROJECT");
        assert_eq!(pending[0].version, updated.version + 1);
    }
}
