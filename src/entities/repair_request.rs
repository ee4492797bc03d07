use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RepairStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "repair-in-process")]
    RepairInProcess,
    #[sea_orm(string_value = "repaired")]
    Repaired,
    #[sea_orm(string_value = "damaged")]
    Damaged,
}

impl RepairStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Repaired | Self::Damaged)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repair_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub issued_item_id: Uuid,
    pub item_id: Uuid,
    pub requester_id: Uuid,
    pub status: RepairStatus,
    pub description: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::issued_item::Entity",
        from = "Column::IssuedItemId",
        to = "super::issued_item::Column::Id"
    )]
    IssuedItem,
}

impl Related<super::issued_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssuedItem.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if !insert {
            active_model.updated_at = Set(Some(Utc::now()));
        }
        Ok(active_model)
    }
}
