use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Department {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum JobPosition {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Employee {
    Table,
    Id,
    Document,
    FirstName,
    LastName,
    BirthDate,
    Address,
    Email,
    Phone,
    JobPositionId,
    SalaryCents,
    HiringDate,
    Status,
    EducationLevel,
    ProfessionalProfile,
    DepartmentId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Department::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Department::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Department::Name).string_len(200).not_null())
                    .to_owned(),
            )
            .await?;

        // Lookup names are unique so concurrent get-or-create calls converge on one row.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_department_name")
                    .table(Department::Table)
                    .col(Department::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobPosition::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobPosition::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobPosition::Name).string_len(200).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_position_name")
                    .table(JobPosition::Table)
                    .col(JobPosition::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Employee::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Employee::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Employee::Document).string_len(50).not_null())
                    .col(ColumnDef::new(Employee::FirstName).string_len(100).not_null())
                    .col(ColumnDef::new(Employee::LastName).string_len(100).not_null())
                    .col(ColumnDef::new(Employee::BirthDate).date().not_null())
                    .col(
                        ColumnDef::new(Employee::Address)
                            .string_len(500)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Employee::Email)
                            .string_len(150)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Employee::Phone)
                            .string_len(50)
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Employee::JobPositionId).integer().not_null())
                    .col(
                        ColumnDef::new(Employee::SalaryCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Employee::HiringDate).date().not_null())
                    .col(
                        ColumnDef::new(Employee::Status)
                            .string_len(16)
                            .not_null()
                            .default("ACTIVE"),
                    )
                    .col(
                        ColumnDef::new(Employee::EducationLevel)
                            .string_len(32)
                            .not_null()
                            .default("HIGH_SCHOOL"),
                    )
                    .col(
                        ColumnDef::new(Employee::ProfessionalProfile)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Employee::DepartmentId).integer().not_null())
                    .col(
                        ColumnDef::new(Employee::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Employee::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_employee_department")
                            .from(Employee::Table, Employee::DepartmentId)
                            .to(Department::Table, Department::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_employee_job_position")
                            .from(Employee::Table, Employee::JobPositionId)
                            .to(JobPosition::Table, JobPosition::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_employee_document")
                    .table(Employee::Table)
                    .col(Employee::Document)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_employee_department")
                    .table(Employee::Table)
                    .col(Employee::DepartmentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Employee::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JobPosition::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Department::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
