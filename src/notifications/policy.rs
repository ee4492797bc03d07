//! Who hears about which lifecycle transition.
//!
//! The fan-out table maps `(EntityKind, Transition)` to recipient selectors.
//! Role selectors are resolved against the `users` table at dispatch time so
//! newly added admins or officers receive notifications without redeploying.

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use std::collections::HashMap;
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::{auth::Role, config::LifecycleConfig, entities::user};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Request,
    Repair,
    IssuedItem,
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
    Submitted,
    Approved,
    Denied,
    Issued,
    Completed,
    InProcess,
    Repaired,
    Damaged,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientSelector {
    /// Every user holding the role
    Role(Role),
    /// The user who raised the request or repair (or held the unit)
    Requester,
    /// A fixed user
    User(Uuid),
}

#[derive(Debug, Clone, Default)]
pub struct FanoutPolicy {
    rules: HashMap<(EntityKind, Transition), Vec<RecipientSelector>>,
}

impl FanoutPolicy {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard routing table
    pub fn standard(lifecycle: &LifecycleConfig) -> Self {
        use EntityKind::*;
        use RecipientSelector::Requester;
        use Transition::*;

        let mut submitted = vec![RecipientSelector::Role(Role::Admin)];
        if lifecycle.notify_system_admins_on_submit {
            submitted.push(RecipientSelector::Role(Role::SystemAdmin));
        }

        Self::empty()
            .with_rule(Request, Submitted, submitted)
            .with_rule(
                Request,
                Approved,
                vec![RecipientSelector::Role(Role::LogisticsOfficer), Requester],
            )
            .with_rule(Request, Denied, vec![Requester])
            .with_rule(Request, Issued, vec![Requester])
            .with_rule(Request, Completed, vec![Requester])
            .with_rule(
                Repair,
                Submitted,
                vec![RecipientSelector::Role(Role::LogisticsOfficer)],
            )
            .with_rule(Repair, InProcess, vec![Requester])
            .with_rule(Repair, Repaired, vec![Requester])
            .with_rule(Repair, Damaged, vec![Requester])
            .with_rule(IssuedItem, Damaged, vec![Requester])
            .with_rule(
                Item,
                Deleted,
                vec![RecipientSelector::Role(Role::SystemAdmin)],
            )
    }

    /// Replaces the selectors for one transition
    pub fn with_rule(
        mut self,
        kind: EntityKind,
        transition: Transition,
        selectors: Vec<RecipientSelector>,
    ) -> Self {
        self.rules.insert((kind, transition), selectors);
        self
    }

    pub fn selectors(&self, kind: EntityKind, transition: Transition) -> &[RecipientSelector] {
        self.rules
            .get(&(kind, transition))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolves the recipients of a transition, deduplicated, in selector order.
    /// On `Submitted`, `requester` is the submitter and is left out of role
    /// matches.
    pub async fn resolve<C: ConnectionTrait>(
        &self,
        conn: &C,
        kind: EntityKind,
        transition: Transition,
        requester: Option<Uuid>,
    ) -> Result<Vec<Uuid>, DbErr> {
        let mut recipients: Vec<Uuid> = Vec::new();

        for selector in self.selectors(kind, transition) {
            let ids = match selector {
                RecipientSelector::Requester => requester.into_iter().collect(),
                RecipientSelector::User(id) => vec![*id],
                RecipientSelector::Role(role) => {
                    let mut holders: Vec<Uuid> = user::Entity::find()
                        .select_only()
                        .column(user::Column::Id)
                        .filter(user::Column::Role.eq(*role))
                        .into_tuple::<Uuid>()
                        .all(conn)
                        .await?;
                    // Submitters are never told about their own submission.
                    if transition == Transition::Submitted {
                        holders.retain(|id| Some(*id) != requester);
                    }
                    holders
                }
            };
            for id in ids {
                if !recipients.contains(&id) {
                    recipients.push(id);
                }
            }
        }

        Ok(recipients)
    }
}
