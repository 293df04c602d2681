use entity::{department, job_position};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, QueryOrder};

pub async fn departments(db: &DatabaseConnection) -> Result<Vec<department::Model>, DbErr> {
    department::Entity::find()
        .order_by_asc(department::Column::Name)
        .all(db)
        .await
}

pub async fn job_positions(db: &DatabaseConnection) -> Result<Vec<job_position::Model>, DbErr> {
    job_position::Entity::find()
        .order_by_asc(job_position::Column::Name)
        .all(db)
        .await
}
