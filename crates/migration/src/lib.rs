pub use sea_orm_migration::prelude::*;

mod m20251209_000001_hr_core;
mod m20251209_000002_app_user;

pub struct Migrator;
#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251209_000001_hr_core::Migration),
            Box::new(m20251209_000002_app_user::Migration),
        ]
    }
}
