mod common;

use api::import::{import_workbook, read_candidates, ImportError, DEFAULT_DEPARTMENT};
use chrono::NaiveDate;
use common::{workbook, Cell, TestContext};
use entity::{department, employee, job_position};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

const BASIC_HEADERS: [&str; 5] = ["Documento", "Nombre", "Apellido", "Salario", "Estado"];

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

fn basic_row() -> Vec<Cell> {
    vec![
        Cell::Text("123"),
        Cell::Text("Ana"),
        Cell::Text("Ruiz"),
        Cell::Number(3_000_000.0),
        Cell::Text("Activo"),
    ]
}

fn with_position(mut row: Vec<Cell>, position: &'static str) -> Vec<Cell> {
    row.push(Cell::Text(position));
    row
}

fn headers_with_position() -> Vec<&'static str> {
    let mut headers = BASIC_HEADERS.to_vec();
    headers.push("Cargo");
    headers
}

#[tokio::test]
async fn row_without_job_position_is_not_imported_but_department_exists() {
    let ctx = TestContext::new().await;
    let bytes = workbook(&BASIC_HEADERS, &[basic_row()]);

    let report = import_workbook(&ctx.store(), &bytes, today()).await.unwrap();

    assert_eq!(report.processed(), 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(employee::Entity::find().count(ctx.db.as_ref()).await.unwrap(), 0);
    let general = department::Entity::find()
        .filter(department::Column::Name.eq(DEFAULT_DEPARTMENT))
        .one(ctx.db.as_ref())
        .await
        .unwrap();
    assert!(general.is_some());
}

#[tokio::test]
async fn row_with_job_position_creates_employee() {
    let ctx = TestContext::new().await;
    let headers = headers_with_position();
    let bytes = workbook(&headers, &[with_position(basic_row(), "Analista")]);

    let report = import_workbook(&ctx.store(), &bytes, today()).await.unwrap();
    assert_eq!(report.processed(), 1);
    assert_eq!(report.created, 1);

    let saved = employee::Entity::find()
        .filter(employee::Column::Document.eq("123"))
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.first_name, "Ana");
    assert_eq!(saved.last_name, "Ruiz");
    assert_eq!(saved.salary_cents, 300_000_000);
    assert_eq!(saved.status, employee::Status::Active);
    assert_eq!(saved.hiring_date, today());

    let job = job_position::Entity::find_by_id(saved.job_position_id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.name, "Analista");
    let dept = department::Entity::find_by_id(saved.department_id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dept.name, DEFAULT_DEPARTMENT);
}

#[tokio::test]
async fn reimport_reuses_lookups_and_updates_in_place() {
    let ctx = TestContext::new().await;
    let headers = headers_with_position();
    let bytes = workbook(&headers, &[with_position(basic_row(), "Analista")]);

    import_workbook(&ctx.store(), &bytes, today()).await.unwrap();
    let first = employee::Entity::find()
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();

    let report = import_workbook(&ctx.store(), &bytes, today()).await.unwrap();
    assert_eq!(report.processed(), 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.created, 0);

    let db = ctx.db.as_ref();
    assert_eq!(employee::Entity::find().count(db).await.unwrap(), 1);
    assert_eq!(department::Entity::find().count(db).await.unwrap(), 1);
    assert_eq!(job_position::Entity::find().count(db).await.unwrap(), 1);
    let again = employee::Entity::find().one(db).await.unwrap().unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.created_at, first.created_at);
}

#[tokio::test]
async fn duplicate_document_in_one_file_keeps_the_last_row() {
    let ctx = TestContext::new().await;
    let headers = headers_with_position();
    let second = vec![
        Cell::Text("123"),
        Cell::Text("Beatriz"),
        Cell::Text("Gómez"),
        Cell::Text("4.500.000,50"),
        Cell::Text("Vacaciones"),
        Cell::Text("Gerente"),
    ];
    let bytes = workbook(&headers, &[with_position(basic_row(), "Analista"), second]);

    let report = import_workbook(&ctx.store(), &bytes, today()).await.unwrap();
    assert_eq!(report.processed(), 2);
    assert_eq!((report.created, report.updated), (1, 1));

    let all = employee::Entity::find().all(ctx.db.as_ref()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].first_name, "Beatriz");
    assert_eq!(all[0].salary_cents, 450_000_050);
    assert_eq!(all[0].status, employee::Status::Vacation);
}

#[tokio::test]
async fn new_department_seen_twice_is_created_once() {
    let ctx = TestContext::new().await;
    let headers = ["Cédula", "Nombres", "Apellidos", "Cargo", "Área"];
    let rows = vec![
        vec![
            Cell::Number(501.0),
            Cell::Text("Luis"),
            Cell::Text("Pardo"),
            Cell::Text("Auxiliar"),
            Cell::Text("Logística"),
        ],
        vec![
            Cell::Number(502.0),
            Cell::Text("Marta"),
            Cell::Text("Silva"),
            Cell::Text("Auxiliar"),
            Cell::Text("Logística"),
        ],
    ];
    let bytes = workbook(&headers, &rows);

    let report = import_workbook(&ctx.store(), &bytes, today()).await.unwrap();
    assert_eq!(report.created, 2);

    let logistics = department::Entity::find()
        .filter(department::Column::Name.eq("Logística"))
        .all(ctx.db.as_ref())
        .await
        .unwrap();
    assert_eq!(logistics.len(), 1);
    let documents: Vec<String> = employee::Entity::find()
        .all(ctx.db.as_ref())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.document)
        .collect();
    assert_eq!(documents, vec!["501".to_string(), "502".to_string()]);
}

#[test]
fn typed_cells_and_fallbacks_are_extracted() {
    let headers = [
        "Correo",
        "Nombre",
        "Fecha de Nacimiento",
        "Nivel Educativo",
        "Departamento",
    ];
    let rows = vec![
        vec![
            Cell::Text("ana@example.com"),
            Cell::Text("Ana"),
            Cell::Date(1990, 2, 14),
            Cell::Text("Maestría"),
            Cell::Text("Finanzas"),
        ],
        vec![Cell::Blank, Cell::Blank, Cell::Blank, Cell::Blank, Cell::Blank],
        vec![
            Cell::Blank,
            Cell::Text("Luis"),
            Cell::Text("14/02/1985"),
            Cell::Blank,
            Cell::Blank,
        ],
    ];
    let bytes = workbook(&headers, &rows);

    let candidates = read_candidates(&bytes, today()).unwrap();
    assert_eq!(candidates.len(), 2);

    let ana = &candidates[0];
    assert_eq!(ana.birth_date, NaiveDate::from_ymd_opt(1990, 2, 14).unwrap());
    assert_eq!(ana.education_level, employee::EducationLevel::Master);
    assert_eq!(ana.department_name, "Finanzas");
    assert_eq!(ana.document.len(), 8);
    assert!(ana.document.chars().all(|c| c.is_ascii_digit()));

    let luis = &candidates[1];
    assert_eq!(luis.birth_date, NaiveDate::from_ymd_opt(1985, 2, 14).unwrap());
    assert_eq!(luis.department_name, DEFAULT_DEPARTMENT);
    assert_eq!(luis.document.len(), 8);
}

#[test]
fn unreadable_bytes_are_a_fatal_error() {
    let err = read_candidates(b"definitely not a spreadsheet", today()).unwrap_err();
    assert!(matches!(err, ImportError::Workbook(_)));
}

#[test]
fn sheet_with_only_headers_yields_nothing() {
    let bytes = workbook(&BASIC_HEADERS, &[]);
    assert!(read_candidates(&bytes, today()).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parsing_off_the_async_workers_keeps_results_and_errors() {
    let ctx = TestContext::new().await;
    let headers = headers_with_position();
    let bytes = workbook(&headers, &[with_position(basic_row(), "Analista")]);

    let report = import_workbook(&ctx.store(), &bytes, today()).await.unwrap();
    assert_eq!(report.created, 1);

    let err = import_workbook(&ctx.store(), b"definitely not a spreadsheet", today())
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::Workbook(_)));
}
