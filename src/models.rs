//! Patient records and their request/response shapes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub medical_history: String,
    pub registered_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal view of the staff member who registered a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisteredBy {
    pub id: Uuid,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientListing {
    #[serde(flatten)]
    pub patient: Patient,
    pub registered_by_user: RegisteredBy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PatientListResponse {
    pub patients: Vec<PatientListing>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PatientCreateResponse {
    pub patient_id: Uuid,
    pub message: String,
}

/// Patient creation payload as received over the wire.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatientCreateRequest {
    pub full_name: String,
    pub date_of_birth: String,
    pub gender: Gender,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub medical_history: String,
}

/// Validated creation payload handed to storage.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub medical_history: String,
}

impl PatientCreateRequest {
    pub fn validate(self, today: NaiveDate) -> Result<NewPatient, String> {
        if self.full_name.trim().is_empty() {
            return Err("Full name is required".to_string());
        }
        let date_of_birth = parse_date_of_birth(&self.date_of_birth, today)?;

        Ok(NewPatient {
            full_name: self.full_name.trim().to_string(),
            date_of_birth,
            gender: self.gender,
            address: self.address,
            phone: self.phone,
            email: self.email,
            medical_history: self.medical_history,
        })
    }
}

/// Demographic fields a receptionist may change (PUT).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemographicsUpdate {
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl DemographicsUpdate {
    pub fn validate(self, today: NaiveDate) -> Result<PatientChanges, String> {
        if let Some(name) = &self.full_name {
            if name.trim().is_empty() {
                return Err("Full name cannot be empty".to_string());
            }
        }
        let date_of_birth = self
            .date_of_birth
            .as_deref()
            .map(|raw| parse_date_of_birth(raw, today))
            .transpose()?;

        Ok(PatientChanges {
            full_name: self.full_name.map(|n| n.trim().to_string()),
            date_of_birth,
            gender: self.gender,
            address: self.address,
            phone: self.phone,
            email: self.email,
            medical_history: None,
        })
    }
}

/// Medical fields a doctor may change (PATCH).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MedicalUpdate {
    pub medical_history: Option<String>,
}

impl From<MedicalUpdate> for PatientChanges {
    fn from(update: MedicalUpdate) -> Self {
        Self {
            medical_history: update.medical_history,
            ..Self::default()
        }
    }
}

/// Column-level changes; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientChanges {
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub medical_history: Option<String>,
}

impl PatientChanges {
    pub fn apply_to(&self, patient: &mut Patient) {
        if let Some(v) = &self.full_name {
            patient.full_name = v.clone();
        }
        if let Some(v) = self.date_of_birth {
            patient.date_of_birth = v;
        }
        if let Some(v) = self.gender {
            patient.gender = v;
        }
        if let Some(v) = &self.address {
            patient.address = v.clone();
        }
        if let Some(v) = &self.phone {
            patient.phone = v.clone();
        }
        if let Some(v) = &self.email {
            patient.email = v.clone();
        }
        if let Some(v) = &self.medical_history {
            patient.medical_history = v.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Normalized pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        Self {
            page: query.page.unwrap_or(1).max(1),
            page_size: query
                .page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }
}

fn parse_date_of_birth(raw: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    let date = NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| "Invalid date format. Use YYYY-MM-DD".to_string())?;
    if date > today {
        return Err("Date of birth cannot be in the future".to_string());
    }
    Ok(date)
}
