use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "employee")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub document: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Date,
    pub address: String,
    pub email: String,
    pub phone: String,
    #[sea_orm(indexed)]
    pub job_position_id: i32,
    pub salary_cents: i64,
    pub hiring_date: Date,
    pub status: Status,
    pub education_level: EducationLevel,
    pub professional_profile: String,
    #[sea_orm(indexed)]
    pub department_id: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::department::Entity",
        from = "Column::DepartmentId",
        to = "super::department::Column::Id",
        on_delete = "Restrict"
    )]
    Department,
    #[sea_orm(
        belongs_to = "super::job_position::Entity",
        from = "Column::JobPositionId",
        to = "super::job_position::Column::Id",
        on_delete = "Restrict"
    )]
    JobPosition,
}

impl Related<super::department::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Department.def()
    }
}

impl Related<super::job_position::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobPosition.def()
    }
}

#[derive(Copy, Clone, Debug, Default, EnumIter, DeriveActiveEnum, Eq, PartialEq, Hash)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum Status {
    #[default]
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "INACTIVE")]
    Inactive,
    #[sea_orm(string_value = "VACATION")]
    Vacation,
}

#[derive(Copy, Clone, Debug, Default, EnumIter, DeriveActiveEnum, Eq, PartialEq, Hash)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
pub enum EducationLevel {
    #[default]
    #[sea_orm(string_value = "HIGH_SCHOOL")]
    HighSchool,
    #[sea_orm(string_value = "TECHNICAL")]
    Technical,
    #[sea_orm(string_value = "TECHNOLOGIST")]
    Technologist,
    #[sea_orm(string_value = "PROFESSIONAL")]
    Professional,
    #[sea_orm(string_value = "SPECIALIZATION")]
    Specialization,
    #[sea_orm(string_value = "MASTER")]
    Master,
    #[sea_orm(string_value = "DOCTORATE")]
    Doctorate,
}

impl ActiveModelBehavior for ActiveModel {}
