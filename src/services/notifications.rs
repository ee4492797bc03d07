use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    entities::notification,
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Read side of notifications plus the read-flag updates
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    pub async fn list(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<notification::Model>, ServiceError> {
        let mut query = notification::Entity::find()
            .filter(notification::Column::RecipientId.eq(recipient_id))
            .order_by_desc(notification::Column::CreatedAt);
        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }
        Ok(query.all(&*self.db).await?)
    }

    /// Reconciliation feed for clients that missed live pushes
    pub async fn list_unread(&self, recipient_id: Uuid) -> Result<Vec<notification::Model>, ServiceError> {
        self.list(recipient_id, true).await
    }

    pub async fn unread_count(&self, recipient_id: Uuid) -> Result<u64, ServiceError> {
        Ok(notification::Entity::find()
            .filter(notification::Column::RecipientId.eq(recipient_id))
            .filter(notification::Column::IsRead.eq(false))
            .count(&*self.db)
            .await?)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        actor: &CurrentUser,
    ) -> Result<notification::Model, ServiceError> {
        let found = notification::Entity::find_by_id(notification_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Notification", notification_id))?;

        if found.recipient_id != actor.id {
            return Err(ServiceError::PermissionDenied(
                "notification belongs to another user".to_string(),
            ));
        }
        if found.is_read {
            return Ok(found);
        }

        let mut active: notification::ActiveModel = found.into();
        active.is_read = Set(true);
        Ok(active.update(&*self.db).await?)
    }

    /// Flags every unread notification of `actor` as read and returns how
    /// many changed
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn mark_all_read(&self, actor: &CurrentUser) -> Result<u64, ServiceError> {
        let result = notification::Entity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .filter(notification::Column::RecipientId.eq(actor.id))
            .filter(notification::Column::IsRead.eq(false))
            .exec(&*self.db)
            .await?;

        info!(count = result.rows_affected, "notifications marked as read");
        if result.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::NotificationsMarkedRead {
                    user_id: actor.id,
                    count: result.rows_affected,
                })
                .await;
        }
        Ok(result.rows_affected)
    }
}
