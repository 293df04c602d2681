use tracing::{error, info, warn};

use super::extract::ImportCandidate;
use crate::{
    employees::EmployeeDraft,
    store::{EmployeeStore, StoreResult},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Created,
    Updated,
    SkippedInvalidReference,
    Failed,
}

/// Tally of one import run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportReport {
    /// Employees written by the run, counting repeats of a document.
    pub fn processed(&self) -> usize {
        self.created + self.updated
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::SkippedInvalidReference => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

impl ImportCandidate {
    pub fn into_draft(self, department_id: i32, job_position_id: i32) -> EmployeeDraft {
        EmployeeDraft {
            document: self.document,
            first_name: self.first_name,
            last_name: self.last_name,
            birth_date: self.birth_date,
            address: self.address,
            email: self.email,
            phone: self.phone,
            job_position_id,
            salary_cents: self.salary_cents,
            hiring_date: self.hiring_date,
            status: self.status,
            education_level: self.education_level,
            professional_profile: self.professional_profile,
            department_id,
        }
    }
}

/// Merges candidates into the store one at a time, in input order.
pub struct Reconciler<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S: EmployeeStore + ?Sized> Reconciler<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub async fn run(&self, candidates: Vec<ImportCandidate>) -> ImportReport {
        let mut report = ImportReport::default();
        for candidate in candidates {
            report.record(self.reconcile(candidate).await);
        }
        report
    }

    /// Store errors are logged and reported as [`Outcome::Failed`].
    pub async fn reconcile(&self, candidate: ImportCandidate) -> Outcome {
        let document = candidate.document.clone();
        match self.apply(candidate).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(%document, error = %err, "employee import failed");
                Outcome::Failed
            }
        }
    }

    async fn apply(&self, candidate: ImportCandidate) -> StoreResult<Outcome> {
        let job_position_id = match candidate.job_position_name.as_deref() {
            Some(name) => Some(self.job_position_id(name).await?),
            None => None,
        };
        let department_id = self.department_id(&candidate.department_name).await?;

        let Some(job_position_id) = job_position_id else {
            warn!(document = %candidate.document, "skipping employee without job position");
            return Ok(Outcome::SkippedInvalidReference);
        };
        if department_id <= 0 || job_position_id <= 0 {
            warn!(
                document = %candidate.document,
                department_id,
                job_position_id,
                "skipping employee with invalid references"
            );
            return Ok(Outcome::SkippedInvalidReference);
        }

        let existing = self.store.employee_by_document(&candidate.document).await?;
        let draft = candidate.into_draft(department_id, job_position_id);
        match existing {
            Some(current) => {
                self.store.update_employee(current.id, draft).await?;
                Ok(Outcome::Updated)
            }
            None => {
                let created = self.store.add_employee(draft).await?;
                info!(employee_id = created.id, document = %created.document, "employee imported");
                Ok(Outcome::Created)
            }
        }
    }

    async fn department_id(&self, name: &str) -> StoreResult<i32> {
        if let Some(found) = self.store.department_by_name(name).await? {
            return Ok(found.id);
        }
        let created = self.store.add_department(name).await?;
        info!(department_id = created.id, name, "department created");
        Ok(created.id)
    }

    async fn job_position_id(&self, name: &str) -> StoreResult<i32> {
        if let Some(found) = self.store.job_position_by_name(name).await? {
            return Ok(found.id);
        }
        let created = self.store.add_job_position(name).await?;
        info!(job_position_id = created.id, name, "job position created");
        Ok(created.id)
    }
}
