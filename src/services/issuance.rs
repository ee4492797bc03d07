use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{CurrentUser, Permission},
    entities::{damaged_item, issued_item, item, user},
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{EntityKind, NotificationDispatcher, NotificationType, Transition},
    services::serial_numbers::SerialNumberAllocator,
};

/// Largest number of units a single request or issuance may mint
pub const MAX_ISSUE_QUANTITY: i32 = 1000;

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Mints serial-numbered units and applies damage to them.
///
/// `Item.quantity` is total stock: issuing never touches it, damage removes
/// one unit from it.
#[derive(Clone)]
pub struct IssuanceService {
    db: Arc<DatabaseConnection>,
    serials: SerialNumberAllocator,
    dispatcher: NotificationDispatcher,
    event_sender: EventSender,
}

impl IssuanceService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        serials: SerialNumberAllocator,
        dispatcher: NotificationDispatcher,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            serials,
            dispatcher,
            event_sender,
        }
    }

    /// Creates `quantity` issued units of `item` for `requester` inside `txn`.
    ///
    /// Each insert runs in its own savepoint so that a serial taken by a
    /// concurrent writer only costs a retry, not the whole transaction.
    #[instrument(skip(self, txn, item, requester), fields(item_id = %item.id, requester_id = %requester.id))]
    pub async fn issue_within(
        &self,
        txn: &DatabaseTransaction,
        item: &item::Model,
        requester: &user::Model,
        quantity: i32,
        request_id: Option<Uuid>,
    ) -> Result<Vec<issued_item::Model>, ServiceError> {
        if !(1..=MAX_ISSUE_QUANTITY).contains(&quantity) {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be between 1 and {}, got {}",
                MAX_ISSUE_QUANTITY, quantity
            )));
        }

        let mut minted = Vec::new();
        for _ in 0..quantity {
            minted.push(self.mint_one(txn, item, requester, request_id).await?);
        }

        info!(
            count = minted.len(),
            "issued units of {} to {}", item.name, requester.username
        );
        Ok(minted)
    }

    async fn mint_one(
        &self,
        txn: &DatabaseTransaction,
        item: &item::Model,
        requester: &user::Model,
        request_id: Option<Uuid>,
    ) -> Result<issued_item::Model, ServiceError> {
        for _ in 0..self.serials.max_attempts() {
            let serial = self
                .serials
                .generate_serial(txn, requester.unit.as_deref(), &item.category, &item.name)
                .await?;

            let now = Utc::now();
            let unit = issued_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                item_id: Set(item.id),
                request_id: Set(request_id),
                assigned_to: Set(Some(requester.id)),
                assigned_at: Set(now),
                serial_number: Set(serial.clone()),
                expiration_date: Set(item.expiration_date),
                created_at: Set(now),
            };

            let savepoint = txn.begin().await?;
            match unit.insert(&savepoint).await {
                Ok(model) => {
                    savepoint.commit().await?;
                    return Ok(model);
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(serial = %serial, "serial taken concurrently, retrying");
                    savepoint.rollback().await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Conflict(format!(
            "could not store a unique serial for item {}",
            item.id
        )))
    }

    /// Stand-alone issuance outside the request flow
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn issue(
        &self,
        item_id: Uuid,
        requester_id: Uuid,
        quantity: i32,
        actor: &CurrentUser,
    ) -> Result<Vec<issued_item::Model>, ServiceError> {
        actor.require(Permission::IssueItems)?;

        let txn = self.db.begin().await?;
        let item = item::Entity::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", item_id))?;
        let requester = user::Entity::find_by_id(requester_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", requester_id))?;

        let minted = self
            .issue_within(&txn, &item, &requester, quantity, None)
            .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ItemsIssued {
                request_id: None,
                actor_id: actor.id,
                serial_numbers: minted.iter().map(|m| m.serial_number.clone()).collect(),
            })
            .await;

        Ok(minted)
    }

    /// Applies the one-time effects of damage to an issued unit inside `txn`:
    /// stock drops by one (not below zero), the unit is unassigned and a
    /// `DamagedItem` is recorded.
    pub async fn apply_damage(
        &self,
        txn: &DatabaseTransaction,
        issued: issued_item::Model,
        repair_request_id: Option<Uuid>,
        actor: &CurrentUser,
        notes: Option<String>,
    ) -> Result<damaged_item::Model, ServiceError> {
        let existing = damaged_item::Entity::find()
            .filter(damaged_item::Column::IssuedItemId.eq(issued.id))
            .one(txn)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "issued item {} is already marked as damaged",
                issued.serial_number
            )));
        }

        if item::Entity::find_by_id(issued.item_id).one(txn).await?.is_none() {
            return Err(ServiceError::not_found("Item", issued.item_id));
        }
        // Decrement in SQL so concurrent damage markings each take one unit;
        // stock already at zero matches no row and stays there.
        item::Entity::update_many()
            .col_expr(item::Column::Quantity, Expr::col(item::Column::Quantity).sub(1))
            .col_expr(item::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(item::Column::Id.eq(issued.item_id))
            .filter(item::Column::Quantity.gt(0))
            .exec(txn)
            .await?;

        let issued_id = issued.id;
        let mut unit: issued_item::ActiveModel = issued.into();
        unit.assigned_to = Set(None);
        unit.update(txn).await?;

        let record = damaged_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            issued_item_id: Set(issued_id),
            repair_request_id: Set(repair_request_id),
            marked_by: Set(actor.id),
            notes: Set(notes),
            marked_at: Set(Utc::now()),
        };

        record.insert(txn).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict(format!("issued item {} is already marked as damaged", issued_id))
            } else {
                ServiceError::DatabaseError(e)
            }
        })
    }

    /// Marks an issued unit as damaged without a repair request
    #[instrument(skip(self, actor, notes), fields(actor_id = %actor.id))]
    pub async fn mark_damaged(
        &self,
        issued_item_id: Uuid,
        actor: &CurrentUser,
        notes: Option<String>,
    ) -> Result<damaged_item::Model, ServiceError> {
        actor.require(Permission::ManageRepairs)?;

        let txn = self.db.begin().await?;
        let issued = issued_item::Entity::find_by_id(issued_item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Issued item", issued_item_id))?;
        let holder = issued.assigned_to;
        let serial = issued.serial_number.clone();

        let damaged = self.apply_damage(&txn, issued, None, actor, notes).await?;

        let message = format!(
            "Item {} has been marked as damaged. Please submit a new request for a replacement.",
            serial
        );
        let notifications = self
            .dispatcher
            .fan_out(
                &txn,
                EntityKind::IssuedItem,
                Transition::Damaged,
                holder,
                NotificationType::ItemDamaged,
                &message,
                None,
            )
            .await?;

        txn.commit().await?;
        info!(serial = %serial, "issued item marked as damaged");

        self.dispatcher.publish_all(&notifications).await;
        self.event_sender
            .send_or_log(Event::ItemDamaged {
                issued_item_id,
                repair_request_id: None,
                actor_id: actor.id,
            })
            .await;

        Ok(damaged)
    }

    pub async fn get(&self, id: Uuid) -> Result<issued_item::Model, ServiceError> {
        issued_item::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Issued item", id))
    }

    /// Issued units visible to `actor`: their own, or everything for roles
    /// that issue or report on stock
    pub async fn list_for(
        &self,
        actor: &CurrentUser,
        assigned_to: Option<Uuid>,
    ) -> Result<Vec<issued_item::Model>, ServiceError> {
        let sees_all = actor.can(Permission::IssueItems) || actor.can(Permission::ViewReports);
        let holder = if sees_all { assigned_to } else { Some(actor.id) };

        let mut query = issued_item::Entity::find().order_by_desc(issued_item::Column::AssignedAt);
        if let Some(holder) = holder {
            query = query.filter(issued_item::Column::AssignedTo.eq(holder));
        }
        Ok(query.all(&*self.db).await?)
    }

    pub async fn find_damage(
        &self,
        issued_item_id: Uuid,
    ) -> Result<Option<damaged_item::Model>, ServiceError> {
        Ok(damaged_item::Entity::find()
            .filter(damaged_item::Column::IssuedItemId.eq(issued_item_id))
            .one(&*self.db)
            .await?)
    }
}
