use async_trait::async_trait;

use crate::error::ServiceError;
use crate::models::{Actor, ActorRecord, ClassGroup, Course, KnowledgeTrail, RankingSnapshot};

/// Remote catalog and records calls the ranking view depends on.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_actor(&self, actor_id: i64) -> Result<Actor, ServiceError>;

    async fn list_courses(&self) -> Result<Vec<Course>, ServiceError>;

    async fn list_classes(&self) -> Result<Vec<ClassGroup>, ServiceError>;

    async fn get_actor_record(&self, actor_id: i64) -> Result<ActorRecord, ServiceError>;

    /// Trails of a class that have at least one ranked activity.
    async fn list_ranked_trails(&self, class_id: i64) -> Result<Vec<KnowledgeTrail>, ServiceError>;

    async fn get_ranking(
        &self,
        class_id: i64,
        trail_ids: &[i64],
    ) -> Result<Vec<RankingSnapshot>, ServiceError>;
}
