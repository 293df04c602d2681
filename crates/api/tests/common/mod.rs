#![allow(dead_code)]

use std::sync::Arc;

use api::{
    accounts,
    assistant::{Assistant, AssistantError},
    auth::{decode_token, AuthConfig, CurrentUser, UserRole},
    schema::{build_schema, AppSchema, HrSchema},
    store::SeaOrmStore,
};
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use sea_orm::{Database, DatabaseConnection, EntityTrait};

pub const ADMIN_EMAIL: &str = "admin@talentoplus.com";
pub const ADMIN_PASSWORD: &str = "Admin123!";

pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub schema: HrSchema,
    pub auth: Arc<AuthConfig>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_assistant(Arc::new(CannedAssistant("Forty-two.".into()))).await
    }

    pub async fn with_assistant(assistant: Arc<dyn Assistant>) -> Self {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&conn, None).await.unwrap();
        let db = Arc::new(conn);
        let auth = Arc::new(AuthConfig {
            jwt_secret: "test-secret".into(),
            issuer: "talentoplus".into(),
            audience: "talentoplus-clients".into(),
            session_ttl_minutes: 15,
        });
        let AppSchema(schema) = build_schema(db.clone(), auth.clone(), assistant);
        Self { db, schema, auth }
    }

    pub fn store(&self) -> SeaOrmStore {
        SeaOrmStore::new(self.db.as_ref().clone())
    }

    pub async fn admin(&self) -> CurrentUser {
        let user = accounts::create_user(
            self.db.as_ref(),
            ADMIN_EMAIL,
            ADMIN_PASSWORD,
            None,
            UserRole::Admin,
        )
        .await
        .unwrap();
        CurrentUser::from(&user)
    }

    /// Resolves a session token the way the HTTP layer does.
    pub async fn viewer(&self, token: &str) -> CurrentUser {
        let claims = decode_token(token, &self.auth).unwrap();
        let user = entity::app_user::Entity::find_by_id(claims.sub)
            .one(self.db.as_ref())
            .await
            .unwrap()
            .unwrap();
        CurrentUser::from(&user)
    }
}

/// Replies with a fixed text and records nothing.
pub struct CannedAssistant(pub String);

#[async_trait]
impl Assistant for CannedAssistant {
    async fn answer(&self, _prompt: &str) -> Result<String, AssistantError> {
        Ok(self.0.clone())
    }
}

pub struct FailingAssistant;

#[async_trait]
impl Assistant for FailingAssistant {
    async fn answer(&self, _prompt: &str) -> Result<String, AssistantError> {
        Err(AssistantError::Api {
            status: 503,
            message: "unavailable".into(),
        })
    }
}

#[derive(Clone, Debug)]
pub enum Cell {
    Text(&'static str),
    Number(f64),
    Date(u16, u8, u8),
    Blank,
}

/// Builds an in-memory `.xlsx` with one sheet: `headers` on row 1, `rows` below.
pub fn workbook(headers: &[&str], rows: &[Vec<Cell>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let sheet = workbook.add_worksheet();
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (offset, row) in rows.iter().enumerate() {
        let r = offset as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            let c = col as u16;
            match cell {
                Cell::Text(text) => {
                    sheet.write_string(r, c, *text).unwrap();
                }
                Cell::Number(value) => {
                    sheet.write_number(r, c, *value).unwrap();
                }
                Cell::Date(y, m, d) => {
                    let date = ExcelDateTime::from_ymd(*y, *m, *d).unwrap();
                    sheet
                        .write_datetime_with_format(r, c, &date, &date_format)
                        .unwrap();
                }
                Cell::Blank => {}
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}
