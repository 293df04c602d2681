use async_trait::async_trait;
use entity::{department, employee, job_position};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter,
};
use thiserror::Error;

use crate::employees::{find_by_document, EmployeeDraft};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbErr),
    #[error("{0} row vanished after insert")]
    NotPersisted(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence needed by the import pipeline. Every call commits on its own.
#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn department_by_name(&self, name: &str) -> StoreResult<Option<department::Model>>;

    /// Inserts the department, or returns the existing row if the name is
    /// already taken.
    async fn add_department(&self, name: &str) -> StoreResult<department::Model>;

    async fn job_position_by_name(&self, name: &str) -> StoreResult<Option<job_position::Model>>;

    /// Same contract as [`EmployeeStore::add_department`].
    async fn add_job_position(&self, name: &str) -> StoreResult<job_position::Model>;

    async fn employee_by_document(&self, document: &str) -> StoreResult<Option<employee::Model>>;

    async fn add_employee(&self, draft: EmployeeDraft) -> StoreResult<employee::Model>;

    async fn update_employee(&self, id: i32, draft: EmployeeDraft) -> StoreResult<employee::Model>;
}

#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EmployeeStore for SeaOrmStore {
    async fn department_by_name(&self, name: &str) -> StoreResult<Option<department::Model>> {
        Ok(department::Entity::find()
            .filter(department::Column::Name.eq(name))
            .one(&self.db)
            .await?)
    }

    async fn add_department(&self, name: &str) -> StoreResult<department::Model> {
        let row = department::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        };
        department::Entity::insert(row)
            .on_conflict(
                OnConflict::column(department::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        self.department_by_name(name)
            .await?
            .ok_or(StoreError::NotPersisted("department"))
    }

    async fn job_position_by_name(&self, name: &str) -> StoreResult<Option<job_position::Model>> {
        Ok(job_position::Entity::find()
            .filter(job_position::Column::Name.eq(name))
            .one(&self.db)
            .await?)
    }

    async fn add_job_position(&self, name: &str) -> StoreResult<job_position::Model> {
        let row = job_position::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        };
        job_position::Entity::insert(row)
            .on_conflict(
                OnConflict::column(job_position::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        self.job_position_by_name(name)
            .await?
            .ok_or(StoreError::NotPersisted("job position"))
    }

    async fn employee_by_document(&self, document: &str) -> StoreResult<Option<employee::Model>> {
        Ok(find_by_document(&self.db, document).await?)
    }

    async fn add_employee(&self, draft: EmployeeDraft) -> StoreResult<employee::Model> {
        Ok(draft.into_insert().insert(&self.db).await?)
    }

    async fn update_employee(&self, id: i32, draft: EmployeeDraft) -> StoreResult<employee::Model> {
        Ok(draft.into_update(id).update(&self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, PaginatorTrait};

    async fn store() -> SeaOrmStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        SeaOrmStore::new(db)
    }

    #[tokio::test]
    async fn adding_an_existing_department_returns_the_stored_row() {
        let store = store().await;
        let first = store.add_department("Finanzas").await.unwrap();
        let second = store.add_department("Finanzas").await.unwrap();
        assert_eq!(first.id, second.id);
        let total = department::Entity::find().count(&store.db).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn lookup_names_are_case_sensitive() {
        let store = store().await;
        store.add_job_position("Analista").await.unwrap();
        assert!(store.job_position_by_name("analista").await.unwrap().is_none());
        assert!(store.job_position_by_name("Analista").await.unwrap().is_some());
    }
}
