//! Patient Storage

use super::{parse_timestamp, parse_uuid, Database, PatientRepository};
use crate::models::{
    Gender, NewPatient, Page, Patient, PatientChanges, PatientListing, RegisteredBy, DATE_FORMAT,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

const PATIENT_COLUMNS: &str = "p.id, p.full_name, p.date_of_birth, p.gender, p.address, p.phone, \
     p.email, p.medical_history, p.registered_by, p.created_at, p.updated_at";

pub struct SqlitePatientStore {
    db: Database,
}

impl SqlitePatientStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    let dob: String = row.get(2)?;
    let gender: String = row.get(3)?;
    Ok(Patient {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        full_name: row.get(1)?,
        date_of_birth: NaiveDate::parse_from_str(&dob, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        gender: Gender::parse(&gender).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, gender.clone(), rusqlite::types::Type::Text)
        })?,
        address: row.get(4)?,
        phone: row.get(5)?,
        email: row.get(6)?,
        medical_history: row.get(7)?,
        registered_by: parse_uuid(&row.get::<_, String>(8)?)?,
        created_at: parse_timestamp(&row.get::<_, String>(9)?)?,
        updated_at: parse_timestamp(&row.get::<_, String>(10)?)?,
    })
}

fn select_patient(conn: &rusqlite::Connection, id: Uuid) -> Result<Option<Patient>> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients p WHERE p.id = ?1");
    let patient = conn
        .query_row(&sql, params![id.to_string()], patient_from_row)
        .optional()
        .context("Failed to fetch patient")?;
    Ok(patient)
}

#[async_trait]
impl PatientRepository for SqlitePatientStore {
    async fn create(&self, registered_by: Uuid, patient: &NewPatient) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let patient = patient.clone();

        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO patients (id, full_name, date_of_birth, gender, address, phone, email,
                                           medical_history, registered_by, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                    params![
                        id.to_string(),
                        patient.full_name,
                        patient.date_of_birth.format(DATE_FORMAT).to_string(),
                        patient.gender.as_str(),
                        patient.address,
                        patient.phone,
                        patient.email,
                        patient.medical_history,
                        registered_by.to_string(),
                        now,
                    ],
                )
                .context("Failed to insert patient")?;
                Ok(())
            })
            .await?;

        Ok(id)
    }

    async fn list(&self, page: Page) -> Result<(Vec<PatientListing>, u64)> {
        self.db
            .call(move |conn| {
                let total: i64 = conn
                    .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))
                    .context("Failed to count patients")?;

                let sql = format!(
                    "SELECT {PATIENT_COLUMNS}, u.full_name
                     FROM patients p
                     JOIN users u ON p.registered_by = u.id
                     ORDER BY p.created_at DESC, p.id
                     LIMIT ?1 OFFSET ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let listings = stmt
                    .query_map(
                        params![i64::from(page.page_size), page.offset() as i64],
                        |row| {
                            let patient = patient_from_row(row)?;
                            let registered_by_user = RegisteredBy {
                                id: patient.registered_by,
                                full_name: row.get(11)?,
                            };
                            Ok(PatientListing {
                                patient,
                                registered_by_user,
                            })
                        },
                    )?
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to list patients")?;

                Ok((listings, total as u64))
            })
            .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Patient>> {
        self.db.call(move |conn| select_patient(conn, id)).await
    }

    async fn update(&self, id: Uuid, changes: &PatientChanges) -> Result<Option<Patient>> {
        let changes = changes.clone();
        self.db
            .call(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE patients
                         SET full_name = COALESCE(?1, full_name),
                             date_of_birth = COALESCE(?2, date_of_birth),
                             gender = COALESCE(?3, gender),
                             address = COALESCE(?4, address),
                             phone = COALESCE(?5, phone),
                             email = COALESCE(?6, email),
                             medical_history = COALESCE(?7, medical_history),
                             updated_at = ?8
                         WHERE id = ?9",
                        params![
                            changes.full_name,
                            changes
                                .date_of_birth
                                .map(|d| d.format(DATE_FORMAT).to_string()),
                            changes.gender.map(|g| g.as_str()),
                            changes.address,
                            changes.phone,
                            changes.email,
                            changes.medical_history,
                            Utc::now().to_rfc3339(),
                            id.to_string(),
                        ],
                    )
                    .context("Failed to update patient")?;

                if changed == 0 {
                    return Ok(None);
                }
                select_patient(conn, id)
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.db
            .call(move |conn| {
                let deleted = conn
                    .execute("DELETE FROM patients WHERE id = ?1", params![id.to_string()])
                    .context("Failed to delete patient")?;
                Ok(deleted > 0)
            })
            .await
    }
}
