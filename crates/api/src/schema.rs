use std::sync::Arc;

use async_graphql::{
    Context, EmptySubscription, Enum, Error, ErrorExtensions, InputObject, Object, Schema,
    SimpleObject, ID,
};
use chrono::{DateTime, NaiveDate, Utc};
use entity::{app_user, department, employee, job_position};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, TransactionTrait};
use tracing::{info_span, warn, Instrument};

use crate::{
    accounts::{self, AccountError},
    assistant::{self, Assistant, AssistantError, GroupCount, RecentHire, WorkforceStats},
    auth::{issue_token, AuthConfig, CurrentUser, UserRole, SESSION_COOKIE},
    employees::{self, EmployeeDraft, EmployeeView, Page, ServiceError},
    lookups,
};

pub type HrSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub struct AppSchema(pub HrSchema);

pub fn build_schema(
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthConfig>,
    assistant: Arc<dyn Assistant>,
) -> AppSchema {
    let schema = Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(db)
        .data(auth)
        .data(assistant)
        .finish();
    AppSchema(schema)
}

pub struct QueryRoot;
pub struct MutationRoot;

const DEFAULT_PAGE_SIZE: i32 = 10;

#[Object]
impl QueryRoot {
    async fn hr(&self) -> HrQuery {
        HrQuery
    }
}

#[Object]
impl MutationRoot {
    async fn hr(&self) -> HrMutation {
        HrMutation
    }
}

#[derive(Default)]
pub struct HrQuery;

#[derive(Default)]
pub struct HrMutation;

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "EmployeeStatus")]
pub enum EmployeeStatusValue {
    #[graphql(name = "ACTIVE")]
    Active,
    #[graphql(name = "INACTIVE")]
    Inactive,
    #[graphql(name = "VACATION")]
    Vacation,
}

impl From<employee::Status> for EmployeeStatusValue {
    fn from(value: employee::Status) -> Self {
        match value {
            employee::Status::Active => Self::Active,
            employee::Status::Inactive => Self::Inactive,
            employee::Status::Vacation => Self::Vacation,
        }
    }
}

impl From<EmployeeStatusValue> for employee::Status {
    fn from(value: EmployeeStatusValue) -> Self {
        match value {
            EmployeeStatusValue::Active => Self::Active,
            EmployeeStatusValue::Inactive => Self::Inactive,
            EmployeeStatusValue::Vacation => Self::Vacation,
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "EducationLevel")]
pub enum EducationLevelValue {
    #[graphql(name = "HIGH_SCHOOL")]
    HighSchool,
    #[graphql(name = "TECHNICAL")]
    Technical,
    #[graphql(name = "TECHNOLOGIST")]
    Technologist,
    #[graphql(name = "PROFESSIONAL")]
    Professional,
    #[graphql(name = "SPECIALIZATION")]
    Specialization,
    #[graphql(name = "MASTER")]
    Master,
    #[graphql(name = "DOCTORATE")]
    Doctorate,
}

impl From<employee::EducationLevel> for EducationLevelValue {
    fn from(value: employee::EducationLevel) -> Self {
        use employee::EducationLevel as Level;
        match value {
            Level::HighSchool => Self::HighSchool,
            Level::Technical => Self::Technical,
            Level::Technologist => Self::Technologist,
            Level::Professional => Self::Professional,
            Level::Specialization => Self::Specialization,
            Level::Master => Self::Master,
            Level::Doctorate => Self::Doctorate,
        }
    }
}

impl From<EducationLevelValue> for employee::EducationLevel {
    fn from(value: EducationLevelValue) -> Self {
        match value {
            EducationLevelValue::HighSchool => Self::HighSchool,
            EducationLevelValue::Technical => Self::Technical,
            EducationLevelValue::Technologist => Self::Technologist,
            EducationLevelValue::Professional => Self::Professional,
            EducationLevelValue::Specialization => Self::Specialization,
            EducationLevelValue::Master => Self::Master,
            EducationLevelValue::Doctorate => Self::Doctorate,
        }
    }
}

#[Object]
impl HrQuery {
    /// The signed-in user and, when linked, their employee record.
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<MePayload> {
        let viewer = current_user(ctx)?;
        let db = database(ctx)?;
        let user = app_user::Entity::find_by_id(viewer.user_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("UNAUTHENTICATED", "Login required"))?;
        let employee = match user.employee_document.as_deref() {
            Some(document) => employees::get_by_document(db.as_ref(), document)
                .await
                .map_err(service_error)?
                .map(EmployeeNode::from),
            None => None,
        };
        Ok(MePayload {
            user: UserNode::from(user),
            employee,
        })
    }

    async fn employees(
        &self,
        ctx: &Context<'_>,
        page: Option<i32>,
        page_size: Option<i32>,
    ) -> async_graphql::Result<EmployeePage> {
        require_role(ctx, UserRole::Admin)?;
        let db = database(ctx)?;
        let page = page.unwrap_or(1).max(1) as u64;
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1) as u64;
        let result = employees::list_page(db.as_ref(), page, page_size)
            .await
            .map_err(service_error)?;
        Ok(EmployeePage::from(result))
    }

    async fn employee(&self, ctx: &Context<'_>, id: i32) -> async_graphql::Result<Option<EmployeeNode>> {
        require_role(ctx, UserRole::Admin)?;
        let db = database(ctx)?;
        Ok(employees::get(db.as_ref(), id)
            .await
            .map_err(service_error)?
            .map(EmployeeNode::from))
    }

    async fn employee_by_document(
        &self,
        ctx: &Context<'_>,
        document: String,
    ) -> async_graphql::Result<Option<EmployeeNode>> {
        require_role(ctx, UserRole::Admin)?;
        let db = database(ctx)?;
        Ok(employees::get_by_document(db.as_ref(), &document)
            .await
            .map_err(service_error)?
            .map(EmployeeNode::from))
    }

    async fn departments(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<LookupNode>> {
        let db = database(ctx)?;
        Ok(lookups::departments(db.as_ref())
            .await
            .map_err(db_error)?
            .into_iter()
            .map(LookupNode::from)
            .collect())
    }

    async fn job_positions(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<LookupNode>> {
        let db = database(ctx)?;
        Ok(lookups::job_positions(db.as_ref())
            .await
            .map_err(db_error)?
            .into_iter()
            .map(LookupNode::from)
            .collect())
    }

    async fn dashboard(&self, ctx: &Context<'_>) -> async_graphql::Result<Dashboard> {
        require_role(ctx, UserRole::Admin)?;
        let db = database(ctx)?;
        let stats = assistant::workforce_stats(db.as_ref())
            .await
            .map_err(db_error)?;
        Ok(Dashboard::from(stats))
    }
}

#[Object]
impl HrMutation {
    async fn login(
        &self,
        ctx: &Context<'_>,
        email: String,
        password: String,
    ) -> async_graphql::Result<AuthPayload> {
        let auth = auth_config(ctx)?;
        let db = database(ctx)?;
        let user = accounts::authenticate(db.as_ref(), &email, &password)
            .await
            .map_err(account_error)?;
        let Some(user) = user else {
            return Ok(AuthPayload::failed("Invalid credentials"));
        };
        let (token, expires_at) = issue_token(&CurrentUser::from(&user), &auth)
            .map_err(|_| error_with_code("INTERNAL", "Failed to issue session token"))?;
        append_session_cookie(ctx, &token, auth.session_ttl_minutes);
        Ok(AuthPayload {
            ok: true,
            token: Some(token),
            expires_at: Some(expires_at),
            user: Some(UserNode::from(user)),
            error: None,
        })
    }

    async fn logout(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        append_session_cookie(ctx, "", -1);
        Ok(true)
    }

    /// Creates an employee login whose first password is the document.
    async fn register(
        &self,
        ctx: &Context<'_>,
        email: String,
        document: String,
    ) -> async_graphql::Result<RegisterPayload> {
        let db = database(ctx)?;
        if document.trim().is_empty() {
            return Err(error_with_code("VALIDATION", "Document is required"));
        }
        match accounts::register(db.as_ref(), &email, &document).await {
            Ok(user) => Ok(RegisterPayload {
                ok: true,
                user: Some(UserNode::from(user)),
                error: None,
            }),
            Err(AccountError::Duplicate(_)) => Ok(RegisterPayload {
                ok: false,
                user: None,
                error: Some("User already exists".into()),
            }),
            Err(err) => Err(account_error(err)),
        }
    }

    /// Self-registration: the employee record plus its login.
    async fn register_employee(
        &self,
        ctx: &Context<'_>,
        input: EmployeeInput,
    ) -> async_graphql::Result<EmployeeNode> {
        let db = database(ctx)?;
        let draft = input.into_draft();
        let document = draft.document.clone();
        let email = draft.email.clone();
        let txn = db.begin().await.map_err(db_error)?;
        let view = employees::create(&txn, draft)
            .await
            .map_err(service_error)?;
        if let Err(err) = accounts::register(&txn, &email, &document).await {
            warn!(%document, error = %err, "self-registration rolled back");
            return Err(account_error(err));
        }
        txn.commit().await.map_err(db_error)?;
        Ok(EmployeeNode::from(view))
    }

    async fn create_employee(
        &self,
        ctx: &Context<'_>,
        input: EmployeeInput,
    ) -> async_graphql::Result<EmployeeNode> {
        require_role(ctx, UserRole::Admin)?;
        let db = database(ctx)?;
        let view = employees::create(db.as_ref(), input.into_draft())
            .await
            .map_err(service_error)?;
        Ok(EmployeeNode::from(view))
    }

    async fn update_employee(
        &self,
        ctx: &Context<'_>,
        id: i32,
        input: EmployeeInput,
    ) -> async_graphql::Result<EmployeeNode> {
        require_role(ctx, UserRole::Admin)?;
        let db = database(ctx)?;
        let view = employees::update(db.as_ref(), id, input.into_draft())
            .await
            .map_err(service_error)?;
        Ok(EmployeeNode::from(view))
    }

    async fn delete_employee(&self, ctx: &Context<'_>, id: i32) -> async_graphql::Result<bool> {
        require_role(ctx, UserRole::Admin)?;
        let db = database(ctx)?;
        employees::delete(db.as_ref(), id)
            .await
            .map_err(service_error)
    }

    async fn ask_assistant(&self, ctx: &Context<'_>, question: String) -> async_graphql::Result<String> {
        require_role(ctx, UserRole::Admin)?;
        let db = database(ctx)?;
        let assistant = ctx
            .data::<Arc<dyn Assistant>>()
            .cloned()
            .map_err(|_| error_with_code("INTERNAL", "Missing assistant"))?;
        assistant::ask(assistant.as_ref(), db.as_ref(), &question)
            .instrument(info_span!("ask_assistant"))
            .await
            .map_err(|err| match err {
                AssistantError::EmptyQuestion => error_with_code("VALIDATION", err.to_string()),
                other => error_with_code("INTERNAL", other.to_string()),
            })
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct EmployeeInput {
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
    pub status: Option<EmployeeStatusValue>,
    pub education_level: Option<EducationLevelValue>,
    pub professional_profile: Option<String>,
    pub department_id: i32,
}

impl EmployeeInput {
    fn into_draft(self) -> EmployeeDraft {
        EmployeeDraft {
            document: self.document.trim().to_string(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            birth_date: self.birth_date,
            address: self.address.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            job_position_id: self.job_position_id,
            salary_cents: self.salary_cents,
            hiring_date: self.hiring_date,
            status: self.status.map(Into::into).unwrap_or_default(),
            education_level: self.education_level.map(Into::into).unwrap_or_default(),
            professional_profile: self
                .professional_profile
                .map(|p| p.trim().to_string())
                .unwrap_or_default(),
            department_id: self.department_id,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Employee")]
pub struct EmployeeNode {
    pub id: i32,
    pub document: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub address: String,
    pub email: String,
    pub phone: String,
    pub salary_cents: i64,
    pub hiring_date: NaiveDate,
    pub status: EmployeeStatusValue,
    pub education_level: EducationLevelValue,
    pub professional_profile: String,
    pub department_id: i32,
    pub department_name: Option<String>,
    pub job_position_id: i32,
    pub job_position_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EmployeeView> for EmployeeNode {
    fn from(view: EmployeeView) -> Self {
        let model = view.employee;
        Self {
            id: model.id,
            full_name: format!("{} {}", model.first_name, model.last_name),
            document: model.document,
            first_name: model.first_name,
            last_name: model.last_name,
            birth_date: model.birth_date,
            address: model.address,
            email: model.email,
            phone: model.phone,
            salary_cents: model.salary_cents,
            hiring_date: model.hiring_date,
            status: model.status.into(),
            education_level: model.education_level.into(),
            professional_profile: model.professional_profile,
            department_id: model.department_id,
            department_name: view.department_name,
            job_position_id: model.job_position_id,
            job_position_name: view.job_position_name,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct EmployeePage {
    pub items: Vec<EmployeeNode>,
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl From<Page<EmployeeView>> for EmployeePage {
    fn from(page: Page<EmployeeView>) -> Self {
        Self {
            has_previous: page.has_previous(),
            has_next: page.has_next(),
            page: page.page,
            page_size: page.page_size,
            total_items: page.total_items,
            total_pages: page.total_pages,
            items: page.items.into_iter().map(EmployeeNode::from).collect(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Lookup")]
pub struct LookupNode {
    pub id: i32,
    pub name: String,
}

impl From<department::Model> for LookupNode {
    fn from(model: department::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

impl From<job_position::Model> for LookupNode {
    fn from(model: job_position::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "User")]
pub struct UserNode {
    pub id: ID,
    pub email: String,
    pub role: String,
    pub employee_document: Option<String>,
}

impl From<app_user::Model> for UserNode {
    fn from(model: app_user::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            role: UserRole::from(model.role).as_str().to_string(),
            email: model.email,
            employee_document: model.employee_document,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct MePayload {
    pub user: UserNode,
    pub employee: Option<EmployeeNode>,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct AuthPayload {
    pub ok: bool,
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Option<UserNode>,
    pub error: Option<String>,
}

impl AuthPayload {
    fn failed(message: &str) -> Self {
        Self {
            ok: false,
            token: None,
            expires_at: None,
            user: None,
            error: Some(message.to_string()),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct RegisterPayload {
    pub ok: bool,
    pub user: Option<UserNode>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct GroupCountNode {
    pub label: String,
    pub count: u64,
}

impl From<GroupCount> for GroupCountNode {
    fn from(group: GroupCount) -> Self {
        Self {
            label: group.label,
            count: group.count,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct RecentHireNode {
    pub employee_id: i32,
    pub full_name: String,
    pub hiring_date: NaiveDate,
}

impl From<RecentHire> for RecentHireNode {
    fn from(hire: RecentHire) -> Self {
        Self {
            employee_id: hire.employee_id,
            full_name: hire.full_name,
            hiring_date: hire.hiring_date,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct Dashboard {
    pub total_employees: u64,
    pub active_employees: u64,
    pub inactive_employees: u64,
    pub vacation_employees: u64,
    pub by_department: Vec<GroupCountNode>,
    pub by_job_position: Vec<GroupCountNode>,
    pub by_education: Vec<GroupCountNode>,
    pub recent_hires: Vec<RecentHireNode>,
}

impl From<WorkforceStats> for Dashboard {
    fn from(stats: WorkforceStats) -> Self {
        Self {
            total_employees: stats.total,
            active_employees: stats.active,
            inactive_employees: stats.inactive,
            vacation_employees: stats.vacation,
            by_department: stats.by_department.into_iter().map(Into::into).collect(),
            by_job_position: stats.by_job_position.into_iter().map(Into::into).collect(),
            by_education: stats.by_education.into_iter().map(Into::into).collect(),
            recent_hires: stats.recent_hires.into_iter().map(Into::into).collect(),
        }
    }
}

fn database(ctx: &Context<'_>) -> async_graphql::Result<Arc<DatabaseConnection>> {
    ctx.data::<Arc<DatabaseConnection>>()
        .cloned()
        .map_err(|_| error_with_code("INTERNAL", "Missing database connection"))
}

fn auth_config(ctx: &Context<'_>) -> async_graphql::Result<Arc<AuthConfig>> {
    ctx.data::<Arc<AuthConfig>>()
        .cloned()
        .map_err(|_| error_with_code("INTERNAL", "Missing auth configuration"))
}

fn current_user(ctx: &Context<'_>) -> async_graphql::Result<CurrentUser> {
    ctx.data::<CurrentUser>()
        .cloned()
        .map_err(|_| error_with_code("UNAUTHENTICATED", "Login required"))
}

fn require_role(ctx: &Context<'_>, role: UserRole) -> async_graphql::Result<CurrentUser> {
    let user = current_user(ctx)?;
    if user.has_role(role) {
        Ok(user)
    } else {
        Err(error_with_code("FORBIDDEN", "Insufficient permissions"))
    }
}

fn db_error(err: DbErr) -> Error {
    error_with_code("INTERNAL", format!("Database error: {}", err))
}

fn service_error(err: ServiceError) -> Error {
    match err {
        ServiceError::Validation(_) => error_with_code("VALIDATION", err.to_string()),
        ServiceError::NotFound(_) => error_with_code("NOT_FOUND", err.to_string()),
        ServiceError::Conflict(_) => error_with_code("CONFLICT", err.to_string()),
        ServiceError::Db(db) => db_error(db),
    }
}

fn account_error(err: AccountError) -> Error {
    match err {
        AccountError::InvalidEmail => error_with_code("VALIDATION", err.to_string()),
        AccountError::Duplicate(_) => error_with_code("CONFLICT", err.to_string()),
        AccountError::Auth(_) => error_with_code("INTERNAL", err.to_string()),
        AccountError::Db(db) => db_error(db),
    }
}

fn error_with_code(code: &'static str, message: impl Into<String>) -> Error {
    Error::new(message).extend_with(|_, e| e.set("code", code))
}

fn append_session_cookie(ctx: &Context<'_>, token: &str, ttl_minutes: i64) {
    let cookie = if ttl_minutes < 0 {
        format!("{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE)
    } else {
        format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE,
            token,
            ttl_minutes * 60
        )
    };
    ctx.append_http_header("Set-Cookie", cookie);
}
