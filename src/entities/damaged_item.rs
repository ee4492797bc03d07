use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "damaged_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub issued_item_id: Uuid,
    #[sea_orm(unique)]
    pub repair_request_id: Option<Uuid>,
    pub marked_by: Uuid,
    pub notes: Option<String>,
    pub marked_at: DateTime<Utc>,
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

impl ActiveModelBehavior for ActiveModel {}
