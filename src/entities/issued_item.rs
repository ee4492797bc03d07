use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One physical unit handed out against a request. Rows are never deleted;
/// damage clears `assigned_to` and keeps the serial on record.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issued_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub item_id: Uuid,
    pub request_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
    #[sea_orm(unique)]
    pub serial_number: String,
    pub expiration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
    #[sea_orm(has_one = "super::damaged_item::Entity")]
    DamagedItem,
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

impl Related<super::damaged_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DamagedItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
