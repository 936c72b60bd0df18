//! CSV ingestion for portal exports: application rows for one cycle and the
//! matching academic records. Loosely typed cells are tightened here, so the
//! rest of the pipeline only ever sees explicit `Option`s.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use tracing::warn;

use super::domain::{
    AcademicRecord, ApplicantId, Application, ApplicationId, ApplicationStatus, CycleId,
    OfferingId,
};

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: usize, reason: String },
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(err) => write!(f, "failed to read admissions export: {}", err),
            ImportError::Csv(err) => write!(f, "invalid admissions CSV data: {}", err),
            ImportError::InvalidRow { line, reason } => {
                write!(f, "invalid admissions export row {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Io(err) => Some(err),
            ImportError::Csv(err) => Some(err),
            ImportError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

pub struct AdmissionsImporter;

impl AdmissionsImporter {
    pub fn applications_from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<Application>, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::applications_from_reader(file)
    }

    pub fn applications_from_reader<R: Read>(reader: R) -> Result<Vec<Application>, ImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut applications = Vec::new();

        for (index, row) in csv_reader.deserialize::<ApplicationRow>().enumerate() {
            // header occupies line 1
            let line = index + 2;
            let row = row?;
            applications.push(row.into_application(line)?);
        }

        Ok(applications)
    }

    pub fn records_from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<BTreeMap<ApplicantId, AcademicRecord>, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::records_from_reader(file)
    }

    /// Later rows for the same applicant supersede earlier ones.
    pub fn records_from_reader<R: Read>(
        reader: R,
    ) -> Result<BTreeMap<ApplicantId, AcademicRecord>, ImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = BTreeMap::new();

        for (index, row) in csv_reader.deserialize::<RecordRow>().enumerate() {
            let line = index + 2;
            let record = row?.into_record(line)?;
            records.insert(record.applicant_id.clone(), record);
        }

        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct ApplicationRow {
    #[serde(rename = "Application ID")]
    application_id: String,
    #[serde(rename = "Applicant ID")]
    applicant_id: String,
    #[serde(rename = "Cycle")]
    cycle: String,
    #[serde(rename = "Institution")]
    institution: String,
    #[serde(rename = "Faculty")]
    faculty: String,
    #[serde(rename = "Course")]
    course: String,
    #[serde(rename = "Submitted At")]
    submitted_at: String,
    #[serde(rename = "Status")]
    status: String,
}

impl ApplicationRow {
    fn into_application(self, line: usize) -> Result<Application, ImportError> {
        if self.application_id.is_empty() || self.applicant_id.is_empty() {
            return Err(ImportError::InvalidRow {
                line,
                reason: "application and applicant ids are required".to_string(),
            });
        }

        let submitted_at =
            parse_timestamp(&self.submitted_at).ok_or_else(|| ImportError::InvalidRow {
                line,
                reason: format!("unrecognised submission timestamp '{}'", self.submitted_at),
            })?;
        let status = parse_status(&self.status).ok_or_else(|| ImportError::InvalidRow {
            line,
            reason: format!("unknown application status '{}'", self.status),
        })?;

        Ok(Application {
            id: ApplicationId(self.application_id),
            applicant_id: ApplicantId(self.applicant_id),
            offering_id: OfferingId::new(self.institution, self.faculty, self.course),
            cycle: CycleId(self.cycle),
            submitted_at,
            status,
            eligibility: None,
            resolution: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RecordRow {
    #[serde(rename = "Applicant ID")]
    applicant_id: String,
    #[serde(rename = "Credits", default, deserialize_with = "empty_string_as_none")]
    credits: Option<String>,
    #[serde(rename = "Passes", default, deserialize_with = "empty_string_as_none")]
    passes: Option<String>,
    #[serde(rename = "GPA", default, deserialize_with = "empty_string_as_none")]
    gpa: Option<String>,
    #[serde(rename = "Grades", default, deserialize_with = "empty_string_as_none")]
    grades: Option<String>,
}

impl RecordRow {
    fn into_record(self, line: usize) -> Result<AcademicRecord, ImportError> {
        if self.applicant_id.is_empty() {
            return Err(ImportError::InvalidRow {
                line,
                reason: "applicant id is required".to_string(),
            });
        }

        let applicant_id = ApplicantId(self.applicant_id);
        let mut record = AcademicRecord::new(applicant_id.clone());
        record.credits = lenient_measure(&applicant_id, "credits", self.credits.as_deref());
        record.passes = lenient_number(&applicant_id, "passes", self.passes.as_deref());
        record.gpa = lenient_measure(&applicant_id, "gpa", self.gpa.as_deref());
        if let Some(grades) = self.grades.as_deref() {
            record.subject_grades = parse_grades(grades);
        }

        Ok(record)
    }
}

/// Unparseable cells become `None` so they contribute nothing downstream.
fn lenient_number<T: std::str::FromStr>(
    applicant: &ApplicantId,
    field: &'static str,
    raw: Option<&str>,
) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(applicant = %applicant, field, value = raw, "ignoring unparseable academic value");
            None
        }
    }
}

/// Like `lenient_number`, but `NaN`, infinities and negatives are unusable too.
fn lenient_measure(
    applicant: &ApplicantId,
    field: &'static str,
    raw: Option<&str>,
) -> Option<f64> {
    let value = lenient_number::<f64>(applicant, field, raw)?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        warn!(
            applicant = %applicant,
            field,
            value = raw.unwrap_or_default(),
            "ignoring unparseable academic value"
        );
        None
    }
}

/// `Mathematics=B; Physics=C` style subject grade lists.
fn parse_grades(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (subject, grade) = pair.split_once('=')?;
            let subject = subject.trim();
            let grade = grade.trim();
            (!subject.is_empty() && !grade.is_empty())
                .then(|| (subject.to_string(), grade.to_string()))
        })
        .collect()
}

pub(crate) fn parse_status(raw: &str) -> Option<ApplicationStatus> {
    let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    match normalized.as_str() {
        "pending" => Some(ApplicationStatus::Pending),
        "under_review" | "underreview" => Some(ApplicationStatus::UnderReview),
        "accepted" => Some(ApplicationStatus::Accepted { finalized: false }),
        "accepted_final" | "final" => Some(ApplicationStatus::Accepted { finalized: true }),
        "rejected" => Some(ApplicationStatus::Rejected),
        "waitlisted" => Some(ApplicationStatus::Waitlisted),
        _ => None,
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
