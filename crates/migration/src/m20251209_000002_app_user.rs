use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum AppUser {
    Table,
    Id,
    Email,
    PasswordHash,
    EmployeeDocument,
    Role,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AppUser::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AppUser::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AppUser::Email).string_len(320).not_null())
                    .col(ColumnDef::new(AppUser::PasswordHash).text().not_null())
                    .col(ColumnDef::new(AppUser::EmployeeDocument).string_len(50))
                    .col(
                        ColumnDef::new(AppUser::Role)
                            .string_len(16)
                            .not_null()
                            .default("EMPLOYEE"),
                    )
                    .col(
                        ColumnDef::new(AppUser::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_app_user_email")
                    .table(AppUser::Table)
                    .col(AppUser::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AppUser::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
