use std::collections::{HashMap, HashSet};

use chrono::{Months, NaiveDate, Utc};
use entity::{department, employee, job_position};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set, Unchanged},
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder,
};
use thiserror::Error;
use tracing::info;

pub const MAX_PAGE_SIZE: u64 = 100;

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid employee: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("employee {0} not found")]
    NotFound(i32),
    #[error("an employee with document {0} already exists")]
    Conflict(String),
    #[error(transparent)]
    Db(#[from] DbErr),
}

/// Every writable employee column. Used for inserts and for full
/// replacement of an existing row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmployeeDraft {
    pub document: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub address: String,
    pub email: String,
    pub phone: String,
    pub job_position_id: i32,
    pub salary_cents: i64,
    pub hiring_date: NaiveDate,
    pub status: employee::Status,
    pub education_level: employee::EducationLevel,
    pub professional_profile: String,
    pub department_id: i32,
}

impl EmployeeDraft {
    pub fn into_insert(self) -> employee::ActiveModel {
        let now = Utc::now();
        let mut active = self.into_columns();
        active.id = NotSet;
        active.created_at = Set(now.into());
        active.updated_at = Set(now.into());
        active
    }

    /// Replaces every column of employee `id` except its identity and
    /// creation time.
    pub fn into_update(self, id: i32) -> employee::ActiveModel {
        let mut active = self.into_columns();
        active.id = Unchanged(id);
        active.created_at = NotSet;
        active.updated_at = Set(Utc::now().into());
        active
    }

    fn into_columns(self) -> employee::ActiveModel {
        employee::ActiveModel {
            id: NotSet,
            document: Set(self.document),
            first_name: Set(self.first_name),
            last_name: Set(self.last_name),
            birth_date: Set(self.birth_date),
            address: Set(self.address),
            email: Set(self.email),
            phone: Set(self.phone),
            job_position_id: Set(self.job_position_id),
            salary_cents: Set(self.salary_cents),
            hiring_date: Set(self.hiring_date),
            status: Set(self.status),
            education_level: Set(self.education_level),
            professional_profile: Set(self.professional_profile),
            department_id: Set(self.department_id),
            created_at: NotSet,
            updated_at: NotSet,
        }
    }
}

/// An employee with its lookup names resolved.
#[derive(Clone, Debug)]
pub struct EmployeeView {
    pub employee: employee::Model,
    pub department_name: Option<String>,
    pub job_position_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

pub fn validate_draft(draft: &EmployeeDraft, today: NaiveDate) -> Result<(), ServiceError> {
    let mut problems = Vec::new();
    check_length(&mut problems, "document", &draft.document, 1, 20);
    check_length(&mut problems, "first name", &draft.first_name, 1, 100);
    check_length(&mut problems, "last name", &draft.last_name, 1, 100);
    check_length(&mut problems, "phone", &draft.phone, 1, 20);
    check_length(&mut problems, "address", &draft.address, 1, 200);
    check_length(&mut problems, "professional profile", &draft.professional_profile, 0, 1000);

    let email = draft.email.trim();
    if email.is_empty() {
        problems.push("email is required".to_string());
    } else if !EMAIL_SHAPE.is_match(email) || email.chars().count() > 100 {
        problems.push("email is not a valid address".to_string());
    }

    let oldest = today.checked_sub_months(Months::new(100 * 12));
    if draft.birth_date >= today {
        problems.push("birth date must be in the past".to_string());
    } else if oldest.is_some_and(|oldest| draft.birth_date <= oldest) {
        problems.push("birth date is more than 100 years ago".to_string());
    }
    if draft.hiring_date > today {
        problems.push("hiring date cannot be in the future".to_string());
    }
    if draft.salary_cents <= 0 {
        problems.push("salary must be greater than zero".to_string());
    }
    if draft.department_id <= 0 {
        problems.push("department is required".to_string());
    }
    if draft.job_position_id <= 0 {
        problems.push("job position is required".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(problems))
    }
}

fn check_length(problems: &mut Vec<String>, field: &str, value: &str, min: usize, max: usize) {
    let len = value.trim().chars().count();
    if len < min {
        problems.push(format!("{field} is required"));
    } else if len > max {
        problems.push(format!("{field} must be at most {max} characters"));
    }
}

pub async fn list_page(
    db: &DatabaseConnection,
    page: u64,
    page_size: u64,
) -> Result<Page<EmployeeView>, ServiceError> {
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let paginator = employee::Entity::find()
        .order_by_asc(employee::Column::Id)
        .paginate(db, page_size);
    let totals = paginator.num_items_and_pages().await?;
    let records = paginator.fetch_page(page - 1).await?;
    Ok(Page {
        items: attach_names(db, records).await?,
        page,
        page_size,
        total_items: totals.number_of_items,
        total_pages: totals.number_of_pages,
    })
}

pub async fn get(db: &DatabaseConnection, id: i32) -> Result<Option<EmployeeView>, ServiceError> {
    let Some(model) = employee::Entity::find_by_id(id).one(db).await? else {
        return Ok(None);
    };
    Ok(attach_names(db, vec![model]).await?.pop())
}

pub async fn get_by_document(
    db: &DatabaseConnection,
    document: &str,
) -> Result<Option<EmployeeView>, ServiceError> {
    let Some(model) = find_by_document(db, document.trim()).await? else {
        return Ok(None);
    };
    Ok(attach_names(db, vec![model]).await?.pop())
}

pub async fn create<C>(db: &C, draft: EmployeeDraft) -> Result<EmployeeView, ServiceError>
where
    C: ConnectionTrait,
{
    validate_draft(&draft, Utc::now().date_naive())?;
    if find_by_document(db, &draft.document).await?.is_some() {
        return Err(ServiceError::Conflict(draft.document));
    }
    let model = draft.into_insert().insert(db).await?;
    info!(employee_id = model.id, document = %model.document, "employee created");
    view_of(db, model).await
}

pub async fn update(
    db: &DatabaseConnection,
    id: i32,
    draft: EmployeeDraft,
) -> Result<EmployeeView, ServiceError> {
    if employee::Entity::find_by_id(id).one(db).await?.is_none() {
        return Err(ServiceError::NotFound(id));
    }
    validate_draft(&draft, Utc::now().date_naive())?;
    if let Some(other) = find_by_document(db, &draft.document).await? {
        if other.id != id {
            return Err(ServiceError::Conflict(draft.document));
        }
    }
    let model = draft.into_update(id).update(db).await?;
    info!(employee_id = id, "employee updated");
    view_of(db, model).await
}

/// Returns whether a row was removed.
pub async fn delete(db: &DatabaseConnection, id: i32) -> Result<bool, ServiceError> {
    let result = employee::Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}

pub(crate) async fn find_by_document<C>(
    db: &C,
    document: &str,
) -> Result<Option<employee::Model>, DbErr>
where
    C: ConnectionTrait,
{
    employee::Entity::find()
        .filter(employee::Column::Document.eq(document))
        .one(db)
        .await
}

async fn view_of<C>(db: &C, model: employee::Model) -> Result<EmployeeView, ServiceError>
where
    C: ConnectionTrait,
{
    let id = model.id;
    attach_names(db, vec![model])
        .await?
        .pop()
        .ok_or(ServiceError::NotFound(id))
}

async fn attach_names<C>(
    db: &C,
    records: Vec<employee::Model>,
) -> Result<Vec<EmployeeView>, DbErr>
where
    C: ConnectionTrait,
{
    if records.is_empty() {
        return Ok(vec![]);
    }
    let department_ids: HashSet<i32> = records.iter().map(|e| e.department_id).collect();
    let job_ids: HashSet<i32> = records.iter().map(|e| e.job_position_id).collect();
    let departments: HashMap<i32, String> = department::Entity::find()
        .filter(department::Column::Id.is_in(department_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|d| (d.id, d.name))
        .collect();
    let jobs: HashMap<i32, String> = job_position::Entity::find()
        .filter(job_position::Column::Id.is_in(job_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|j| (j.id, j.name))
        .collect();
    Ok(records
        .into_iter()
        .map(|employee| EmployeeView {
            department_name: departments.get(&employee.department_id).cloned(),
            job_position_name: jobs.get(&employee.job_position_id).cloned(),
            employee,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity::employee::{EducationLevel, Status};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn draft() -> EmployeeDraft {
        EmployeeDraft {
            document: "1020".into(),
            first_name: "Ana".into(),
            last_name: "Ruiz".into(),
            birth_date: NaiveDate::from_ymd_opt(1990, 2, 14).unwrap(),
            address: "Calle 10 # 4-20".into(),
            email: "ana@example.com".into(),
            phone: "3001234567".into(),
            job_position_id: 1,
            salary_cents: 350_000_000,
            hiring_date: NaiveDate::from_ymd_opt(2020, 1, 15).unwrap(),
            status: Status::Active,
            education_level: EducationLevel::Professional,
            professional_profile: String::new(),
            department_id: 2,
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert!(validate_draft(&draft(), today()).is_ok());
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut bad = draft();
        bad.document = " ".into();
        bad.email = "not-an-email".into();
        bad.birth_date = today();
        bad.hiring_date = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        bad.salary_cents = 0;
        bad.department_id = 0;
        let Err(ServiceError::Validation(problems)) = validate_draft(&bad, today()) else {
            panic!("expected validation error");
        };
        assert_eq!(problems.len(), 6, "{problems:?}");
    }

    #[test]
    fn birth_date_older_than_a_century_is_rejected() {
        let mut old = draft();
        old.birth_date = NaiveDate::from_ymd_opt(1925, 6, 1).unwrap();
        assert!(validate_draft(&old, today()).is_err());
        old.birth_date = NaiveDate::from_ymd_opt(1925, 6, 2).unwrap();
        assert!(validate_draft(&old, today()).is_ok());
    }

    #[test]
    fn update_model_keeps_identity_and_creation_time() {
        let active = draft().into_update(42);
        assert_eq!(active.id, Unchanged(42));
        assert_eq!(active.created_at, NotSet);
        assert_eq!(active.document, Set("1020".to_string()));
        assert!(active.updated_at.is_set());
    }

    #[test]
    fn page_flags_follow_position() {
        let page = Page::<()> {
            items: vec![],
            page: 2,
            page_size: 10,
            total_items: 25,
            total_pages: 3,
        };
        assert!(page.has_previous());
        assert!(page.has_next());
        let last = Page::<()> { page: 3, ..page };
        assert!(!last.has_next());
    }
}
