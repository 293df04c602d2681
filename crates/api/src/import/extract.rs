use std::{collections::HashMap, fmt};

use calamine::Data;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use entity::employee::{EducationLevel, Status};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::header::{normalize_header, HeaderIndex};

/// Department assigned to rows that do not name one.
pub const DEFAULT_DEPARTMENT: &str = "General";

const DOCUMENT_SPACE: u64 = 100_000_000;

/// One spreadsheet row parsed into an employee record that has not been
/// persisted yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportCandidate {
    pub document: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub address: String,
    pub email: String,
    pub phone: String,
    pub salary_cents: i64,
    pub hiring_date: NaiveDate,
    pub status: Status,
    pub education_level: EducationLevel,
    pub professional_profile: String,
    pub job_position_name: Option<String>,
    pub department_name: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Field {
    Document,
    FirstName,
    LastName,
    BirthDate,
    Address,
    Email,
    Phone,
    Salary,
    HiringDate,
    ProfessionalProfile,
    Status,
    EducationLevel,
    JobPosition,
    Department,
}

impl Field {
    fn label(self) -> &'static str {
        match self {
            Field::Document => "document",
            Field::FirstName => "first name",
            Field::LastName => "last name",
            Field::BirthDate => "birth date",
            Field::Address => "address",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::Salary => "salary",
            Field::HiringDate => "hiring date",
            Field::ProfessionalProfile => "professional profile",
            Field::Status => "status",
            Field::EducationLevel => "education level",
            Field::JobPosition => "job position",
            Field::Department => "department",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("{field} column {column} holds spreadsheet error {kind}")]
    CellError {
        field: Field,
        column: usize,
        kind: String,
    },
}

/// Header variants accepted per field, in priority order.
const FIELD_SYNONYMS: &[(Field, &[&str])] = &[
    (
        Field::Document,
        &["documento", "cedula", "cédula", "identificacion", "identificación", "document"],
    ),
    (
        Field::FirstName,
        &["nombre", "nombres", "primer nombre", "first name", "firstname"],
    ),
    (
        Field::LastName,
        &["apellido", "apellidos", "last name", "lastname"],
    ),
    (
        Field::BirthDate,
        &[
            "fecha de nacimiento",
            "fecha nacimiento",
            "fechanacimiento",
            "nacimiento",
            "birth date",
            "birthdate",
        ],
    ),
    (Field::Address, &["direccion", "dirección", "address"]),
    (
        Field::Email,
        &["correo", "email", "correo electronico", "correo electrónico", "e-mail"],
    ),
    (
        Field::Phone,
        &["telefono", "teléfono", "celular", "phone"],
    ),
    (Field::Salary, &["salario", "sueldo", "salary"]),
    (
        Field::HiringDate,
        &[
            "fecha de contratacion",
            "fecha contratacion",
            "fecha de contratación",
            "fecha contratación",
            "fecha ingreso",
            "fecha de ingreso",
            "fechaingreso",
            "hiring date",
        ],
    ),
    (
        Field::ProfessionalProfile,
        &["perfil profesional", "perfil", "descripcion", "descripción", "profile"],
    ),
    (Field::Status, &["estado", "status"]),
    (
        Field::EducationLevel,
        &[
            "nivel educativo",
            "niveleducativo",
            "educacion",
            "educación",
            "education level",
        ],
    ),
    (
        Field::JobPosition,
        &["cargo", "posicion", "posición", "puesto", "job position"],
    ),
    (
        Field::Department,
        &["departamento", "area", "área", "department"],
    ),
];

const STATUS_SYNONYMS: &[(&str, Status)] = &[
    ("activo", Status::Active),
    ("activa", Status::Active),
    ("active", Status::Active),
    ("inactivo", Status::Inactive),
    ("inactiva", Status::Inactive),
    ("inactive", Status::Inactive),
    ("retirado", Status::Inactive),
    ("vacaciones", Status::Vacation),
    ("en vacaciones", Status::Vacation),
    ("vacation", Status::Vacation),
];

const EDUCATION_SYNONYMS: &[(&str, EducationLevel)] = &[
    ("bachiller", EducationLevel::HighSchool),
    ("secundaria", EducationLevel::HighSchool),
    ("high school", EducationLevel::HighSchool),
    ("técnico", EducationLevel::Technical),
    ("technical", EducationLevel::Technical),
    ("tecnólogo", EducationLevel::Technologist),
    ("technologist", EducationLevel::Technologist),
    ("pregrado", EducationLevel::Professional),
    ("universitario", EducationLevel::Professional),
    ("profesional", EducationLevel::Professional),
    ("professional", EducationLevel::Professional),
    ("especialización", EducationLevel::Specialization),
    ("especialidad", EducationLevel::Specialization),
    ("specialization", EducationLevel::Specialization),
    ("posgrado", EducationLevel::Master),
    ("postgrado", EducationLevel::Master),
    ("maestría", EducationLevel::Master),
    ("magister", EducationLevel::Master),
    ("master", EducationLevel::Master),
    ("doctorado", EducationLevel::Doctorate),
    ("phd", EducationLevel::Doctorate),
    ("doctorate", EducationLevel::Doctorate),
];

static FIELD_KEYS: Lazy<HashMap<Field, Vec<String>>> = Lazy::new(|| {
    FIELD_SYNONYMS
        .iter()
        .map(|(field, synonyms)| {
            let mut keys: Vec<String> = Vec::with_capacity(synonyms.len());
            for synonym in *synonyms {
                let key = normalize_header(synonym);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            (*field, keys)
        })
        .collect()
});

static STATUS_TABLE: Lazy<HashMap<String, Status>> = Lazy::new(|| code_table(STATUS_SYNONYMS));

static EDUCATION_TABLE: Lazy<HashMap<String, EducationLevel>> =
    Lazy::new(|| code_table(EDUCATION_SYNONYMS));

static INVARIANT_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d{1,3}(,\d{3})+|\d+)(\.\d+)?$").expect("valid amount regex"));

static LOCAL_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d{1,3}(\.\d{3})+|\d+)(,\d+)?$").expect("valid amount regex"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

// Day-first before month-first: "03/04/2020" is the 3rd of April.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%d %B %Y",
    "%B %d, %Y",
];

fn code_table<T: Copy>(entries: &[(&str, T)]) -> HashMap<String, T> {
    entries
        .iter()
        .map(|(text, value)| (normalize_header(text), *value))
        .collect()
}

/// Maps free text onto an enum through a folded synonym table; unknown or
/// missing text falls back to the enum's default variant.
fn lookup_code<T: Copy + Default>(table: &HashMap<String, T>, text: Option<&str>) -> T {
    text.map(normalize_header)
        .and_then(|key| table.get(&key).copied())
        .unwrap_or_default()
}

pub fn parse_status(text: Option<&str>) -> Status {
    lookup_code(&STATUS_TABLE, text)
}

pub fn parse_education_level(text: Option<&str>) -> EducationLevel {
    lookup_code(&EDUCATION_TABLE, text)
}

/// Reads typed candidates out of data rows using a header lookup.
pub struct RowExtractor<'h> {
    headers: &'h HeaderIndex,
    today: NaiveDate,
}

impl<'h> RowExtractor<'h> {
    /// `today` is the processing date used for missing or unreadable dates.
    pub fn new(headers: &'h HeaderIndex, today: NaiveDate) -> Self {
        Self { headers, today }
    }

    /// Returns `Ok(None)` for a row without any value.
    pub fn extract(&self, row: &[Data]) -> Result<Option<ImportCandidate>, RowError> {
        if row.iter().all(|cell| cell_text(cell).is_none()) {
            return Ok(None);
        }

        let email = self.text(row, Field::Email)?;
        let document = match self.text(row, Field::Document)? {
            Some(document) => document,
            None => synthesize_document(email.as_deref()),
        };

        Ok(Some(ImportCandidate {
            document,
            first_name: self.text(row, Field::FirstName)?.unwrap_or_default(),
            last_name: self.text(row, Field::LastName)?.unwrap_or_default(),
            birth_date: self.date(row, Field::BirthDate)?,
            address: self.text(row, Field::Address)?.unwrap_or_default(),
            email: email.unwrap_or_default(),
            phone: self.text(row, Field::Phone)?.unwrap_or_default(),
            salary_cents: self.amount_cents(row, Field::Salary)?,
            hiring_date: self.date(row, Field::HiringDate)?,
            status: parse_status(self.text(row, Field::Status)?.as_deref()),
            education_level: parse_education_level(
                self.text(row, Field::EducationLevel)?.as_deref(),
            ),
            professional_profile: self
                .text(row, Field::ProfessionalProfile)?
                .unwrap_or_default(),
            job_position_name: self.text(row, Field::JobPosition)?,
            department_name: self
                .text(row, Field::Department)?
                .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string()),
        }))
    }

    /// First non-empty cell among the field's synonym columns.
    fn cell<'r>(&self, row: &'r [Data], field: Field) -> Result<Option<&'r Data>, RowError> {
        let keys = FIELD_KEYS.get(&field).map(Vec::as_slice).unwrap_or_default();
        for key in keys {
            let Some(column) = self.headers.column(key) else {
                continue;
            };
            let Some(cell) = row.get(column) else {
                continue;
            };
            if let Data::Error(kind) = cell {
                return Err(RowError::CellError {
                    field,
                    column,
                    kind: kind.to_string(),
                });
            }
            if cell_text(cell).is_some() {
                return Ok(Some(cell));
            }
        }
        Ok(None)
    }

    fn text(&self, row: &[Data], field: Field) -> Result<Option<String>, RowError> {
        Ok(self.cell(row, field)?.and_then(cell_text))
    }

    fn date(&self, row: &[Data], field: Field) -> Result<NaiveDate, RowError> {
        let parsed = self.cell(row, field)?.and_then(|cell| match cell {
            Data::DateTime(value) => value.as_datetime().map(|dt| dt.date()),
            Data::Float(serial) => serial_to_date(*serial),
            Data::Int(serial) => serial_to_date(*serial as f64),
            Data::String(text) | Data::DateTimeIso(text) => parse_date_text(text),
            _ => None,
        });
        Ok(parsed.unwrap_or_else(|| {
            debug!(%field, today = %self.today, "date missing or unreadable; using processing date");
            self.today
        }))
    }

    fn amount_cents(&self, row: &[Data], field: Field) -> Result<i64, RowError> {
        let cents = self.cell(row, field)?.and_then(|cell| match cell {
            Data::Float(value) => float_to_cents(*value),
            Data::Int(value) => value.checked_mul(100),
            Data::String(text) => parse_amount_cents(text),
            _ => None,
        });
        Ok(cents.unwrap_or(0))
    }
}

/// Renders a cell as trimmed text; empty cells and errors yield `None`.
pub fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(value) => match value.as_datetime() {
            Some(dt) => dt.date().format("%Y-%m-%d").to_string(),
            None => value.as_f64().to_string(),
        },
        Data::Error(_) | Data::Empty => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Converts a 1900-system spreadsheet serial into a calendar date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial >= 2_958_466.0 {
        return None;
    }
    let days = serial.floor() as i64;
    // Serials before the phantom 1900-02-29 are anchored one day later.
    let epoch = if days < 60 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    epoch.checked_add_signed(Duration::days(days))
}

pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    // Numeric text is treated as a serial.
    text.parse::<f64>().ok().and_then(serial_to_date)
}

/// Parses a money amount into cents: invariant notation first
/// (`3,000,000.50`), then the local one (`3.000.000,50`).
pub fn parse_amount_cents(text: &str) -> Option<i64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if INVARIANT_AMOUNT.is_match(&cleaned) {
        cleaned.replace(',', "")
    } else if LOCAL_AMOUNT.is_match(&cleaned) {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        return None;
    };
    normalized.parse::<f64>().ok().and_then(float_to_cents)
}

fn float_to_cents(value: f64) -> Option<i64> {
    let cents = (value * 100.0).round();
    (cents.is_finite() && cents.abs() < i64::MAX as f64).then_some(cents as i64)
}

/// Document used when a row has none: derived from the e-mail when there is
/// one, random otherwise. Always eight digits.
pub fn synthesize_document(email: Option<&str>) -> String {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => document_from_email(email),
        None => {
            let value = rand::thread_rng().gen_range(10_000_000..DOCUMENT_SPACE);
            format!("{value:08}")
        }
    }
}

fn document_from_email(email: &str) -> String {
    let digest = Sha256::digest(email.to_lowercase().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    format!("{:08}", u64::from_be_bytes(prefix) % DOCUMENT_SPACE)
}
