use entity::{app_user, department, job_position};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, Set};
use tracing::info;

use crate::{
    accounts::{self, AccountError},
    auth::UserRole,
};

pub const DEFAULT_DEPARTMENTS: [&str; 7] = [
    "Recursos Humanos",
    "Tecnología",
    "Finanzas",
    "Marketing",
    "Ventas",
    "Operaciones",
    "Administración",
];

pub const DEFAULT_JOB_POSITIONS: [&str; 10] = [
    "Director",
    "Gerente",
    "Coordinador",
    "Analista",
    "Asistente",
    "Auxiliar",
    "Desarrollador",
    "Diseñador",
    "Contador",
    "Vendedor",
];

#[derive(Clone, Debug)]
pub struct SeedSettings {
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SeedSummary {
    pub admin_created: bool,
    pub departments: usize,
    pub job_positions: usize,
}

/// Fills an empty database. Tables that already hold rows are left alone.
pub async fn seed(
    db: &DatabaseConnection,
    settings: &SeedSettings,
) -> Result<SeedSummary, AccountError> {
    let mut summary = SeedSummary::default();

    if app_user::Entity::find().count(db).await? == 0 {
        accounts::create_user(
            db,
            &settings.admin_email,
            &settings.admin_password,
            None,
            UserRole::Admin,
        )
        .await?;
        summary.admin_created = true;
    }

    if department::Entity::find().count(db).await? == 0 {
        let rows = DEFAULT_DEPARTMENTS.iter().map(|name| department::ActiveModel {
            name: Set((*name).to_string()),
            ..Default::default()
        });
        department::Entity::insert_many(rows)
            .exec_without_returning(db)
            .await?;
        summary.departments = DEFAULT_DEPARTMENTS.len();
    }

    if job_position::Entity::find().count(db).await? == 0 {
        let rows = DEFAULT_JOB_POSITIONS
            .iter()
            .map(|name| job_position::ActiveModel {
                name: Set((*name).to_string()),
                ..Default::default()
            });
        job_position::Entity::insert_many(rows)
            .exec_without_returning(db)
            .await?;
        summary.job_positions = DEFAULT_JOB_POSITIONS.len();
    }

    info!(
        admin_created = summary.admin_created,
        departments = summary.departments,
        job_positions = summary.job_positions,
        "seed complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    #[tokio::test]
    async fn seeding_twice_does_not_duplicate() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let settings = SeedSettings {
            admin_email: "admin@talentoplus.com".into(),
            admin_password: "Admin123!".into(),
        };

        let first = seed(&db, &settings).await.unwrap();
        assert!(first.admin_created);
        assert_eq!(first.departments, 7);
        assert_eq!(first.job_positions, 10);

        let second = seed(&db, &settings).await.unwrap();
        assert_eq!(second, SeedSummary::default());
        assert_eq!(department::Entity::find().count(&db).await.unwrap(), 7);
        assert_eq!(app_user::Entity::find().count(&db).await.unwrap(), 1);
    }
}
