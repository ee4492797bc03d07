use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display, AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ItemStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "in-use")]
    InUse,
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
    #[sea_orm(string_value = "retired")]
    Retired,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

/// Catalog entry. `quantity` is total stock held, not units still available.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub quantity: i32,
    pub status: ItemStatus,
    pub expiration_date: Option<NaiveDate>,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.status == ItemStatus::Deleted
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::issued_item::Entity")]
    IssuedItems,
}

impl Related<super::issued_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssuedItems.def()
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
