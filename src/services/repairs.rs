use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{CurrentUser, Permission},
    entities::{
        damaged_item, issued_item,
        repair_request::{self, RepairStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{EntityKind, NotificationDispatcher, NotificationType, Transition},
    services::issuance::IssuanceService,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitRepairInput {
    pub issued_item_id: Uuid,
    #[validate(length(min = 1, max = 2000, message = "description is required"))]
    pub description: String,
    pub image: Option<String>,
}

/// `pending -> repair-in-process -> repaired`, and `damaged` from either
/// non-terminal state
pub fn is_valid_transition(from: RepairStatus, to: RepairStatus) -> bool {
    use RepairStatus::*;

    match (from, to) {
        (Pending, RepairInProcess) => true,
        (RepairInProcess, Repaired) => true,
        (Pending, Damaged) | (RepairInProcess, Damaged) => true,
        _ => false,
    }
}

fn required_permission(target: RepairStatus) -> Permission {
    match target {
        RepairStatus::Repaired => Permission::CompleteRepairs,
        _ => Permission::ManageRepairs,
    }
}

#[derive(Clone)]
pub struct RepairService {
    db: Arc<DatabaseConnection>,
    issuance: IssuanceService,
    dispatcher: NotificationDispatcher,
    event_sender: EventSender,
}

impl RepairService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        issuance: IssuanceService,
        dispatcher: NotificationDispatcher,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            issuance,
            dispatcher,
            event_sender,
        }
    }

    /// Opens a repair request for a unit the actor currently holds
    #[instrument(skip(self, input, actor), fields(actor_id = %actor.id, issued_item_id = %input.issued_item_id))]
    pub async fn submit(
        &self,
        input: SubmitRepairInput,
        actor: &CurrentUser,
    ) -> Result<repair_request::Model, ServiceError> {
        actor.require(Permission::RequestRepairs)?;
        input.validate()?;
        if input.description.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "description is required".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let unit = issued_item::Entity::find_by_id(input.issued_item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Issued item", input.issued_item_id))?;
        if unit.assigned_to != Some(actor.id) {
            warn!(serial = %unit.serial_number, "repair requested for a unit not held by the actor");
            return Err(ServiceError::PermissionDenied(format!(
                "issued item {} is not assigned to you",
                unit.serial_number
            )));
        }

        let created = repair_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            issued_item_id: Set(unit.id),
            item_id: Set(unit.item_id),
            requester_id: Set(actor.id),
            status: Set(RepairStatus::Pending),
            description: Set(input.description.trim().to_string()),
            image: Set(input.image),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let message = format!(
            "New repair request for {}: {}",
            unit.serial_number, created.description
        );
        let notifications = self
            .dispatcher
            .fan_out(
                &txn,
                EntityKind::Repair,
                Transition::Submitted,
                Some(actor.id),
                NotificationType::RepairSubmitted,
                &message,
                None,
            )
            .await?;

        txn.commit().await?;
        info!(repair_request_id = %created.id, "repair request submitted");

        self.dispatcher.publish_all(&notifications).await;
        self.event_sender
            .send_or_log(Event::RepairRequestSubmitted {
                repair_request_id: created.id,
                issued_item_id: created.issued_item_id,
                requester_id: actor.id,
            })
            .await;

        Ok(created)
    }

    /// Moves a repair request to `new_status`.
    ///
    /// `damaged` happens at most once per repair request: a second attempt is
    /// a conflict and leaves stock, assignment and records untouched.
    #[instrument(skip(self, actor, notes), fields(actor_id = %actor.id))]
    pub async fn update_status(
        &self,
        repair_request_id: Uuid,
        new_status: RepairStatus,
        actor: &CurrentUser,
        notes: Option<String>,
    ) -> Result<repair_request::Model, ServiceError> {
        actor.require(required_permission(new_status))?;

        let txn = self.db.begin().await?;

        let current = repair_request::Entity::find_by_id(repair_request_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Repair request", repair_request_id))?;
        let old_status = current.status;

        if new_status == RepairStatus::Damaged {
            let already_recorded = damaged_item::Entity::find()
                .filter(damaged_item::Column::RepairRequestId.eq(repair_request_id))
                .count(&txn)
                .await?
                > 0;
            if old_status == RepairStatus::Damaged || already_recorded {
                return Err(ServiceError::Conflict(format!(
                    "repair request {} is already marked as damaged",
                    repair_request_id
                )));
            }
        }

        if old_status.is_terminal() || !is_valid_transition(old_status, new_status) {
            error!("Invalid repair transition from {} to {}", old_status, new_status);
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot transition repair request from '{}' to '{}'",
                old_status, new_status
            )));
        }

        let unit = issued_item::Entity::find_by_id(current.issued_item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Issued item", current.issued_item_id))?;
        let serial = unit.serial_number.clone();

        let mut active: repair_request::ActiveModel = current.clone().into();
        active.status = Set(new_status);
        let updated = active.update(&txn).await?;

        let (transition, notification_type, message) = match new_status {
            RepairStatus::Damaged => {
                self.issuance
                    .apply_damage(&txn, unit, Some(repair_request_id), actor, notes)
                    .await?;
                (
                    Transition::Damaged,
                    NotificationType::ItemDamaged,
                    format!(
                        "Item {} could not be repaired and has been marked as damaged. Please submit a new request for a replacement.",
                        serial
                    ),
                )
            }
            RepairStatus::Repaired => (
                Transition::Repaired,
                NotificationType::RepairCompleted,
                format!("Item {} has been repaired and is ready for collection", serial),
            ),
            RepairStatus::RepairInProcess => (
                Transition::InProcess,
                NotificationType::RepairInProcess,
                format!("Repair of item {} is in process", serial),
            ),
            RepairStatus::Pending => {
                return Err(ServiceError::InvalidTransition(
                    "repair requests cannot return to 'pending'".to_string(),
                ))
            }
        };

        let notifications = self
            .dispatcher
            .fan_out(
                &txn,
                EntityKind::Repair,
                transition,
                Some(updated.requester_id),
                notification_type,
                &message,
                None,
            )
            .await?;

        txn.commit().await?;
        info!(
            "Repair request {} status updated from '{}' to '{}'",
            repair_request_id, old_status, new_status
        );

        self.dispatcher.publish_all(&notifications).await;
        self.event_sender
            .send_or_log(Event::RepairStatusChanged {
                repair_request_id,
                actor_id: actor.id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        if new_status == RepairStatus::Damaged {
            self.event_sender
                .send_or_log(Event::ItemDamaged {
                    issued_item_id: updated.issued_item_id,
                    repair_request_id: Some(repair_request_id),
                    actor_id: actor.id,
                })
                .await;
        }

        Ok(updated)
    }

    fn sees_all(actor: &CurrentUser) -> bool {
        actor.can(Permission::ManageRepairs) || actor.can(Permission::ViewReports)
    }

    pub async fn get(
        &self,
        repair_request_id: Uuid,
        actor: &CurrentUser,
    ) -> Result<repair_request::Model, ServiceError> {
        let found = repair_request::Entity::find_by_id(repair_request_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Repair request", repair_request_id))?;

        if found.requester_id != actor.id && !Self::sees_all(actor) {
            return Err(ServiceError::PermissionDenied(
                "repair requests of other users are not visible to this role".to_string(),
            ));
        }
        Ok(found)
    }

    pub async fn list(
        &self,
        actor: &CurrentUser,
        status: Option<RepairStatus>,
    ) -> Result<Vec<repair_request::Model>, ServiceError> {
        let mut query =
            repair_request::Entity::find().order_by_desc(repair_request::Column::CreatedAt);
        if !Self::sees_all(actor) {
            query = query.filter(repair_request::Column::RequesterId.eq(actor.id));
        }
        if let Some(status) = status {
            query = query.filter(repair_request::Column::Status.eq(status));
        }
        Ok(query.all(&*self.db).await?)
    }
}
