use std::{collections::HashMap, fmt::Write as _, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use entity::employee;
use reqwest::Client;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::lookups;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const NOT_CONFIGURED_REPLY: &str = "Sorry, the AI service is not configured correctly.";
pub const APOLOGY_REPLY: &str = "Sorry, there was an error processing your query.";
const EMPTY_REPLY: &str = "No response could be generated.";
const RECENT_HIRES: u64 = 5;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("assistant API key is not configured")]
    NotConfigured,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Db(#[from] DbErr),
}

#[derive(Clone, Debug)]
pub struct AssistantSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupCount {
    pub label: String,
    pub count: u64,
}

#[derive(Clone, Debug)]
pub struct RecentHire {
    pub employee_id: i32,
    pub full_name: String,
    pub hiring_date: NaiveDate,
}

/// Aggregate head counts. Carries no per-employee personal data except the
/// names of the most recent hires.
#[derive(Clone, Debug, Default)]
pub struct WorkforceStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub vacation: u64,
    pub by_department: Vec<GroupCount>,
    pub by_job_position: Vec<GroupCount>,
    pub by_education: Vec<GroupCount>,
    pub recent_hires: Vec<RecentHire>,
}

#[derive(Debug, FromQueryResult)]
struct LabelCount {
    label: String,
    count: i64,
}

#[derive(Debug, FromQueryResult)]
struct IdCount {
    key: i32,
    count: i64,
}

pub async fn workforce_stats(db: &DatabaseConnection) -> Result<WorkforceStats, DbErr> {
    let mut stats = WorkforceStats::default();

    let by_status = employee::Entity::find()
        .select_only()
        .column_as(employee::Column::Status, "label")
        .column_as(employee::Column::Id.count(), "count")
        .group_by(employee::Column::Status)
        .into_model::<LabelCount>()
        .all(db)
        .await?;
    for row in by_status {
        let count = row.count.max(0) as u64;
        stats.total += count;
        match row.label.as_str() {
            "ACTIVE" => stats.active += count,
            "INACTIVE" => stats.inactive += count,
            "VACATION" => stats.vacation += count,
            other => warn!(status = other, "unknown employee status in stats"),
        }
    }

    let department_names: HashMap<i32, String> = lookups::departments(db)
        .await?
        .into_iter()
        .map(|d| (d.id, d.name))
        .collect();
    stats.by_department = id_counts(db, employee::Column::DepartmentId)
        .await?
        .into_iter()
        .map(|row| GroupCount {
            label: department_names
                .get(&row.key)
                .cloned()
                .unwrap_or_else(|| format!("#{}", row.key)),
            count: row.count.max(0) as u64,
        })
        .collect();

    let job_names: HashMap<i32, String> = lookups::job_positions(db)
        .await?
        .into_iter()
        .map(|j| (j.id, j.name))
        .collect();
    stats.by_job_position = id_counts(db, employee::Column::JobPositionId)
        .await?
        .into_iter()
        .map(|row| GroupCount {
            label: job_names
                .get(&row.key)
                .cloned()
                .unwrap_or_else(|| format!("#{}", row.key)),
            count: row.count.max(0) as u64,
        })
        .collect();

    stats.by_education = employee::Entity::find()
        .select_only()
        .column_as(employee::Column::EducationLevel, "label")
        .column_as(employee::Column::Id.count(), "count")
        .group_by(employee::Column::EducationLevel)
        .into_model::<LabelCount>()
        .all(db)
        .await?
        .into_iter()
        .map(|row| GroupCount {
            label: education_label(&row.label).to_string(),
            count: row.count.max(0) as u64,
        })
        .collect();
    sort_groups(&mut stats.by_department);
    sort_groups(&mut stats.by_job_position);
    sort_groups(&mut stats.by_education);

    stats.recent_hires = employee::Entity::find()
        .order_by_desc(employee::Column::HiringDate)
        .order_by_desc(employee::Column::Id)
        .limit(RECENT_HIRES)
        .all(db)
        .await?
        .into_iter()
        .map(|e| RecentHire {
            employee_id: e.id,
            full_name: format!("{} {}", e.first_name, e.last_name),
            hiring_date: e.hiring_date,
        })
        .collect();

    Ok(stats)
}

async fn id_counts(db: &DatabaseConnection, column: employee::Column) -> Result<Vec<IdCount>, DbErr> {
    employee::Entity::find()
        .select_only()
        .column_as(column, "key")
        .column_as(employee::Column::Id.count(), "count")
        .group_by(column)
        .into_model::<IdCount>()
        .all(db)
        .await
}

fn sort_groups(groups: &mut [GroupCount]) {
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
}

fn education_label(code: &str) -> &str {
    match code {
        "HIGH_SCHOOL" => "High school",
        "TECHNICAL" => "Technical",
        "TECHNOLOGIST" => "Technologist",
        "PROFESSIONAL" => "Professional",
        "SPECIALIZATION" => "Specialization",
        "MASTER" => "Master",
        "DOCTORATE" => "Doctorate",
        other => other,
    }
}

/// Context handed to the model: aggregate counts followed by the question.
pub fn build_prompt(stats: &WorkforceStats, question: &str) -> String {
    let mut prompt = String::from(
        "You are a human resources assistant for TalentoPlus S.A.S. \
         Answer concisely and professionally using only these figures.\n\n",
    );
    let _ = writeln!(prompt, "Total employees: {}", stats.total);
    let _ = writeln!(prompt, "Active: {}", stats.active);
    let _ = writeln!(prompt, "Inactive: {}", stats.inactive);
    let _ = writeln!(prompt, "On vacation: {}", stats.vacation);
    for (title, groups) in [
        ("Employees per department", &stats.by_department),
        ("Employees per job position", &stats.by_job_position),
        ("Employees per education level", &stats.by_education),
    ] {
        let _ = writeln!(prompt, "\n{title}:");
        if groups.is_empty() {
            let _ = writeln!(prompt, "- none");
        }
        for group in groups {
            let _ = writeln!(prompt, "- {}: {}", group.label, group.count);
        }
    }
    let _ = write!(prompt, "\nQuestion: {}", question.trim());
    prompt
}

#[async_trait]
pub trait Assistant: Send + Sync {
    async fn answer(&self, prompt: &str) -> Result<String, AssistantError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .find_map(|part| part.text)
    }
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiAssistant {
    client: Client,
    settings: AssistantSettings,
}

impl GeminiAssistant {
    pub fn new(settings: AssistantSettings) -> Result<Self, AssistantError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl Assistant for GeminiAssistant {
    async fn answer(&self, prompt: &str) -> Result<String, AssistantError> {
        let Some(api_key) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(AssistantError::NotConfigured);
        };
        let url = format!(
            "{}/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let response = self
            .client
            .post(url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let parsed: GenerateResponse = response.json().await?;
        debug!(model = %self.settings.model, "assistant answered");
        Ok(parsed.text().unwrap_or_else(|| EMPTY_REPLY.to_string()))
    }
}

/// Answers a free-text question from aggregate workforce figures.
///
/// Only an empty question or a database failure is an error; assistant
/// failures become a fixed reply.
pub async fn ask(
    assistant: &dyn Assistant,
    db: &DatabaseConnection,
    question: &str,
) -> Result<String, AssistantError> {
    if question.trim().is_empty() {
        return Err(AssistantError::EmptyQuestion);
    }
    let stats = workforce_stats(db).await?;
    let prompt = build_prompt(&stats, question);
    match assistant.answer(&prompt).await {
        Ok(reply) => Ok(reply),
        Err(AssistantError::NotConfigured) => {
            warn!("assistant API key not configured");
            Ok(NOT_CONFIGURED_REPLY.to_string())
        }
        Err(err) => {
            error!(error = %err, "assistant query failed");
            Ok(APOLOGY_REPLY.to_string())
        }
    }
}
