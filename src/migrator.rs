use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_catalog_tables::Migration),
            Box::new(m20240601_000002_create_request_tables::Migration),
            Box::new(m20240601_000003_create_repair_tables::Migration),
            Box::new(m20240601_000004_create_notification_tables::Migration),
        ]
    }
}

mod m20240601_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Username).string().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(ColumnDef::new(Users::Unit).string().null())
                        .col(ColumnDef::new(Users::Department).string().null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_role")
                        .table(Users::Table)
                        .col(Users::Role)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Items::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Items::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Items::Name).string().not_null())
                        .col(ColumnDef::new(Items::Category).string().not_null())
                        .col(
                            ColumnDef::new(Items::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Items::Status).string().not_null())
                        .col(ColumnDef::new(Items::ExpirationDate).date().null())
                        .col(ColumnDef::new(Items::AssignedTo).uuid().null())
                        .col(
                            ColumnDef::new(Items::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Items::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Items::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Username,
        Role,
        Unit,
        Department,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Items {
        Table,
        Id,
        Name,
        Category,
        Quantity,
        Status,
        ExpirationDate,
        AssignedTo,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_request_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_request_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Requests::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Requests::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Requests::ItemId).uuid().not_null())
                        .col(ColumnDef::new(Requests::RequesterId).uuid().not_null())
                        .col(ColumnDef::new(Requests::Quantity).integer().not_null())
                        .col(ColumnDef::new(Requests::Status).string().not_null())
                        .col(ColumnDef::new(Requests::RequestType).string().not_null())
                        .col(ColumnDef::new(Requests::Priority).string().not_null())
                        .col(ColumnDef::new(Requests::Purpose).text().null())
                        .col(ColumnDef::new(Requests::IssuedItemId).uuid().null())
                        .col(
                            ColumnDef::new(Requests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Requests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_requests_requester_status")
                        .table(Requests::Table)
                        .col(Requests::RequesterId)
                        .col(Requests::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(IssuedItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IssuedItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(IssuedItems::ItemId).uuid().not_null())
                        .col(ColumnDef::new(IssuedItems::RequestId).uuid().null())
                        .col(ColumnDef::new(IssuedItems::AssignedTo).uuid().null())
                        .col(
                            ColumnDef::new(IssuedItems::AssignedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IssuedItems::SerialNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(IssuedItems::ExpirationDate).date().null())
                        .col(
                            ColumnDef::new(IssuedItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_issued_items_assigned_to")
                        .table(IssuedItems::Table)
                        .col(IssuedItems::AssignedTo)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IssuedItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Requests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Requests {
        Table,
        Id,
        ItemId,
        RequesterId,
        Quantity,
        Status,
        RequestType,
        Priority,
        Purpose,
        IssuedItemId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum IssuedItems {
        Table,
        Id,
        ItemId,
        RequestId,
        AssignedTo,
        AssignedAt,
        SerialNumber,
        ExpirationDate,
        CreatedAt,
    }
}

mod m20240601_000003_create_repair_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_repair_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RepairRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RepairRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RepairRequests::IssuedItemId).uuid().not_null())
                        .col(ColumnDef::new(RepairRequests::ItemId).uuid().not_null())
                        .col(ColumnDef::new(RepairRequests::RequesterId).uuid().not_null())
                        .col(ColumnDef::new(RepairRequests::Status).string().not_null())
                        .col(ColumnDef::new(RepairRequests::Description).text().not_null())
                        .col(ColumnDef::new(RepairRequests::Image).string().null())
                        .col(
                            ColumnDef::new(RepairRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RepairRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Uniqueness on both keys makes damage marking single-shot even under races.
            manager
                .create_table(
                    Table::create()
                        .table(DamagedItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DamagedItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DamagedItems::IssuedItemId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(DamagedItems::RepairRequestId)
                                .uuid()
                                .null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(DamagedItems::MarkedBy).uuid().not_null())
                        .col(ColumnDef::new(DamagedItems::Notes).text().null())
                        .col(
                            ColumnDef::new(DamagedItems::MarkedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DamagedItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RepairRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum RepairRequests {
        Table,
        Id,
        IssuedItemId,
        ItemId,
        RequesterId,
        Status,
        Description,
        Image,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum DamagedItems {
        Table,
        Id,
        IssuedItemId,
        RepairRequestId,
        MarkedBy,
        Notes,
        MarkedAt,
    }
}

mod m20240601_000004_create_notification_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_notification_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::RecipientId).uuid().not_null())
                        .col(ColumnDef::new(Notifications::Message).text().not_null())
                        .col(
                            ColumnDef::new(Notifications::NotificationType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::RequestId).uuid().null())
                        .col(
                            ColumnDef::new(Notifications::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_recipient_read")
                        .table(Notifications::Table)
                        .col(Notifications::RecipientId)
                        .col(Notifications::IsRead)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ActivityLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ActivityLogs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ActivityLogs::UserId).uuid().null())
                        .col(ColumnDef::new(ActivityLogs::Action).string().not_null())
                        .col(ColumnDef::new(ActivityLogs::Details).text().not_null())
                        .col(
                            ColumnDef::new(ActivityLogs::Timestamp)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ActivityLogs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        RecipientId,
        Message,
        NotificationType,
        RequestId,
        IsRead,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ActivityLogs {
        Table,
        Id,
        UserId,
        Action,
        Details,
        Timestamp,
    }
}
