use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, QuerySelect};
use std::sync::Arc;

use crate::{
    auth::{CurrentUser, Permission},
    entities::activity_log,
    errors::ServiceError,
};

const MAX_LIMIT: u64 = 500;

/// Read access to the activity log written by the event processor
#[derive(Clone)]
pub struct ActivityLogService {
    db: Arc<DatabaseConnection>,
}

impl ActivityLogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        actor: &CurrentUser,
        limit: u64,
    ) -> Result<Vec<activity_log::Model>, ServiceError> {
        actor.require(Permission::ViewLogs)?;

        Ok(activity_log::Entity::find()
            .order_by_desc(activity_log::Column::Timestamp)
            .limit(limit.clamp(1, MAX_LIMIT))
            .all(&*self.db)
            .await?)
    }
}
