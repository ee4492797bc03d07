use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{CurrentUser, Permission, Role},
    entities::item::{self, ItemStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{EntityKind, NotificationDispatcher, NotificationType, Transition},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateItemInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub category: String,
    #[validate(range(min = 0))]
    pub quantity: i32,
    pub expiration_date: Option<NaiveDate>,
}

/// Catalog maintenance
#[derive(Clone)]
pub struct ItemService {
    db: Arc<DatabaseConnection>,
    dispatcher: NotificationDispatcher,
    event_sender: EventSender,
}

impl ItemService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        dispatcher: NotificationDispatcher,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            dispatcher,
            event_sender,
        }
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn create_item(
        &self,
        input: CreateItemInput,
        actor: &CurrentUser,
    ) -> Result<item::Model, ServiceError> {
        actor.require(Permission::ManageStock)?;
        input.validate()?;

        let created = item::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            category: Set(input.category.trim().to_string()),
            quantity: Set(input.quantity),
            status: Set(ItemStatus::Available),
            expiration_date: Set(input.expiration_date),
            assigned_to: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await?;

        info!(item_id = %created.id, "item created");
        self.event_sender
            .send_or_log(Event::ItemCreated {
                item_id: created.id,
                actor_id: actor.id,
            })
            .await;
        Ok(created)
    }

    pub async fn get_item(&self, item_id: Uuid) -> Result<item::Model, ServiceError> {
        item::Entity::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", item_id))
    }

    pub async fn list_items(&self, include_deleted: bool) -> Result<Vec<item::Model>, ServiceError> {
        let mut query = item::Entity::find().order_by_asc(item::Column::Name);
        if !include_deleted {
            query = query.filter(item::Column::Status.ne(ItemStatus::Deleted));
        }
        Ok(query.all(&*self.db).await?)
    }

    /// Soft-deletes an item. Deletions by logistics officers are reported to
    /// system admins.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn delete_item(&self, item_id: Uuid, actor: &CurrentUser) -> Result<item::Model, ServiceError> {
        actor.require(Permission::ManageStock)?;

        let txn = self.db.begin().await?;
        let found = item::Entity::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", item_id))?;
        if found.is_deleted() {
            txn.commit().await?;
            return Ok(found);
        }

        let name = found.name.clone();
        let mut active: item::ActiveModel = found.into();
        active.status = Set(ItemStatus::Deleted);
        let deleted = active.update(&txn).await?;

        let notifications = if actor.role == Role::LogisticsOfficer {
            let message = format!("Item '{}' was deleted by a logistics officer", name);
            self.dispatcher
                .fan_out(
                    &txn,
                    EntityKind::Item,
                    Transition::Deleted,
                    None,
                    NotificationType::ItemDeleted,
                    &message,
                    None,
                )
                .await?
        } else {
            Vec::new()
        };

        txn.commit().await?;
        info!(item_id = %item_id, "item deleted");

        self.dispatcher.publish_all(&notifications).await;
        self.event_sender
            .send_or_log(Event::ItemDeleted {
                item_id,
                actor_id: actor.id,
            })
            .await;
        Ok(deleted)
    }
}
