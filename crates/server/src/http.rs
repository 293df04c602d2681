use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use api::{
    auth::{decode_token, AuthConfig, CurrentUser, UserRole, SESSION_COOKIE},
    import::import_workbook,
    schema::HrSchema,
    store::SeaOrmStore,
};
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{self, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use entity::app_user;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

const ALLOWED_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];

#[derive(Clone)]
pub struct AppState {
    pub schema: HrSchema,
    pub db: Arc<DatabaseConnection>,
    pub auth: Arc<AuthConfig>,
    pub import_max_bytes: usize,
}

pub async fn serve(addr: SocketAddr, state: AppState, cors_origins: &[String]) -> anyhow::Result<()> {
    let router = build_router(state, cors_origins);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, "listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let layer = CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([Method::POST, Method::GET]);
    if allowed.is_empty() {
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer
            .allow_credentials(true)
            .allow_origin(AllowOrigin::list(allowed))
    }
}

pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let import_limit = state.import_max_bytes;
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/graphiql", get(graphiql))
        .route("/graphql", get(graphql_handler).post(graphql_handler))
        .route(
            "/api/employees/import-excel",
            post(import_excel).layer(DefaultBodyLimit::max(import_limit)),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = req.into_inner();
    if let Some(current_user) = authenticate_request(&state, &headers, &jar).await {
        request = request.data(current_user);
    }
    state.schema.execute(request).await.into()
}

async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

#[derive(Debug, Serialize)]
struct ImportResponse {
    message: String,
    count: usize,
}

async fn import_excel(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    mut multipart: Multipart,
) -> HttpResult<Json<ImportResponse>> {
    let user = authenticate_request(&state, &headers, &jar)
        .await
        .ok_or_else(|| HttpError::new(StatusCode::UNAUTHORIZED, "Login required"))?;
    if !user.has_role(UserRole::Admin) {
        return Err(HttpError::new(StatusCode::FORBIDDEN, "Insufficient permissions"));
    }

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| HttpError::new(err.status(), &err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_lowercase();
        if !ALLOWED_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext)) {
            return Err(HttpError::new(
                StatusCode::BAD_REQUEST,
                "Only Excel files (.xlsx, .xls) are allowed",
            ));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|err| HttpError::new(err.status(), &err.body_text()))?;
        upload = Some(bytes);
        break;
    }
    let bytes = upload
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| HttpError::new(StatusCode::BAD_REQUEST, "No file was uploaded"))?;

    let store = SeaOrmStore::new(state.db.as_ref().clone());
    let report = import_workbook(&store, &bytes, Utc::now().date_naive())
        .await
        .map_err(|err| {
            error!(user = %user.email, error = %err, "employee import failed");
            HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "Error importing employees")
                .with_details(err.to_string())
        })?;

    let count = report.processed();
    Ok(Json(ImportResponse {
        message: format!("{} employees were successfully imported", count),
        count,
    }))
}

async fn authenticate_request(
    state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Option<CurrentUser> {
    let token = bearer_token(headers)
        .or_else(|| jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string()))?;
    let claims = match decode_token(&token, &state.auth) {
        Ok(claims) => claims,
        Err(err) => {
            warn!(error = %err, "rejected session token");
            return None;
        }
    };
    let user = app_user::Entity::find_by_id(claims.sub)
        .one(state.db.as_ref())
        .await
        .ok()??;
    Some(CurrentUser::from(&user))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|rest| rest.trim().to_string())
        .filter(|token| !token.is_empty())
}

type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

impl HttpError {
    fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            details: None,
        }
    }

    fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{
        accounts,
        assistant::{AssistantSettings, GeminiAssistant},
        auth::issue_token,
        seed::{seed, SeedSettings},
    };
    use axum::body::Body;
    use http_body_util::BodyExt;
    use migration::{Migrator, MigratorTrait};
    use rust_xlsxwriter::Workbook;
    use sea_orm::Database;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "talentoplus-boundary";

    async fn test_state() -> AppState {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&conn, None).await.unwrap();
        seed(
            &conn,
            &SeedSettings {
                admin_email: "admin@talentoplus.com".into(),
                admin_password: "Admin123!".into(),
            },
        )
        .await
        .unwrap();
        let db = Arc::new(conn);
        let auth = Arc::new(AuthConfig {
            jwt_secret: "test-secret".into(),
            issuer: "talentoplus".into(),
            audience: "talentoplus-clients".into(),
            session_ttl_minutes: 15,
        });
        let assistant = Arc::new(GeminiAssistant::new(AssistantSettings::default()).unwrap());
        let api::schema::AppSchema(schema) =
            api::schema::build_schema(db.clone(), auth.clone(), assistant);
        AppState {
            schema,
            db,
            auth,
            import_max_bytes: 1024 * 1024,
        }
    }

    async fn admin_token(state: &AppState) -> String {
        let admin = app_user::Entity::find()
            .one(state.db.as_ref())
            .await
            .unwrap()
            .unwrap();
        issue_token(&CurrentUser::from(&admin), &state.auth).unwrap().0
    }

    fn sheet() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["Documento", "Nombre", "Apellido", "Salario", "Estado", "Cargo"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_string(1, 0, "123").unwrap();
        sheet.write_string(1, 1, "Ana").unwrap();
        sheet.write_string(1, 2, "Ruiz").unwrap();
        sheet.write_number(1, 3, 3_000_000.0).unwrap();
        sheet.write_string(1, 4, "Activo").unwrap();
        sheet.write_string(1, 5, "Analista").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    fn multipart_body(file_name: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn import_request(token: Option<&str>, file_name: &str, bytes: &[u8]) -> http::Request<Body> {
        let mut builder = http::Request::post("/api/employees/import-excel").header(
            http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(token) = token {
            builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(multipart_body(file_name, bytes))).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let app = build_router(test_state().await, &[]);
        let response = app
            .oneshot(http::Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn import_requires_login() {
        let app = build_router(test_state().await, &[]);
        let response = app
            .oneshot(import_request(None, "staff.xlsx", &sheet()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_import_reports_count() {
        let state = test_state().await;
        let token = admin_token(&state).await;
        let app = build_router(state, &[]);
        let response = app
            .oneshot(import_request(Some(&token), "staff.xlsx", &sheet()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["message"], "1 employees were successfully imported");
    }

    #[tokio::test]
    async fn employee_session_cannot_import() {
        let state = test_state().await;
        let employee = accounts::register(state.db.as_ref(), "luis@example.com", "3040")
            .await
            .unwrap();
        let token = issue_token(&CurrentUser::from(&employee), &state.auth)
            .unwrap()
            .0;
        let app = build_router(state, &[]);
        let response = app
            .oneshot(import_request(Some(&token), "staff.xlsx", &sheet()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn non_excel_upload_is_rejected() {
        let state = test_state().await;
        let token = admin_token(&state).await;
        let app = build_router(state, &[]);
        let response = app
            .oneshot(import_request(Some(&token), "staff.csv", b"a,b\n1,2\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn corrupt_workbook_is_a_server_error_with_details() {
        let state = test_state().await;
        let token = admin_token(&state).await;
        let app = build_router(state, &[]);
        let response = app
            .oneshot(import_request(Some(&token), "staff.xlsx", b"not really a workbook"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Error importing employees");
        assert!(body["details"].is_string());
    }
}
