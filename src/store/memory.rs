//! In-memory store implementing all three repository traits.
//!
//! One mutex guards the whole state. Meant for tests and local experiments,
//! not for production traffic.

use super::{PatientRepository, TokenRepository, UniqueViolation, UserRepository};
use crate::auth::models::{NewUser, User, UserUpdate};
use crate::models::{NewPatient, Page, Patient, PatientChanges, PatientListing, RegisteredBy};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    patients: HashMap<Uuid, Patient>,
    invalid_tokens: HashMap<String, DateTime<Utc>>,
}

impl MemoryState {
    fn username_taken(&self, username: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of denylist rows, swept or not.
    pub fn denylist_len(&self) -> usize {
        self.state.lock().invalid_tokens.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, new_user: &NewUser, password_hash: &str) -> Result<User> {
        let mut state = self.state.lock();
        if state.username_taken(&new_user.username, None) {
            return Err(UniqueViolation { field: "username" }.into());
        }
        if state.email_taken(&new_user.email, None) {
            return Err(UniqueViolation { field: "email" }.into());
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: password_hash.to_string(),
            full_name: new_user.full_name.clone(),
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let state = self.state.lock();
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock();
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self.state.lock().username_taken(username, None))
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        Ok(self.state.lock().email_taken(email, None))
    }

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<Option<User>> {
        let mut state = self.state.lock();
        if let Some(username) = &update.username {
            if state.username_taken(username, Some(id)) {
                return Err(UniqueViolation { field: "username" }.into());
            }
        }
        if let Some(email) = &update.email {
            if state.email_taken(email, Some(id)) {
                return Err(UniqueViolation { field: "email" }.into());
            }
        }

        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = &update.username {
            user.username = username.clone();
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        if let Some(full_name) = &update.full_name {
            user.full_name = full_name.clone();
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl PatientRepository for MemoryStore {
    async fn create(&self, registered_by: Uuid, patient: &NewPatient) -> Result<Uuid> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        self.state.lock().patients.insert(
            id,
            Patient {
                id,
                full_name: patient.full_name.clone(),
                date_of_birth: patient.date_of_birth,
                gender: patient.gender,
                address: patient.address.clone(),
                phone: patient.phone.clone(),
                email: patient.email.clone(),
                medical_history: patient.medical_history.clone(),
                registered_by,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn list(&self, page: Page) -> Result<(Vec<PatientListing>, u64)> {
        let state = self.state.lock();
        let mut patients: Vec<&Patient> = state.patients.values().collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = patients.len() as u64;
        let listings = patients
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .map(|p| PatientListing {
                patient: p.clone(),
                registered_by_user: RegisteredBy {
                    id: p.registered_by,
                    full_name: state
                        .users
                        .get(&p.registered_by)
                        .map(|u| u.full_name.clone())
                        .unwrap_or_default(),
                },
            })
            .collect();

        Ok((listings, total))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Patient>> {
        Ok(self.state.lock().patients.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, changes: &PatientChanges) -> Result<Option<Patient>> {
        let mut state = self.state.lock();
        let Some(patient) = state.patients.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(patient);
        patient.updated_at = Utc::now();
        Ok(Some(patient.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.lock().patients.remove(&id).is_some())
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn invalidate(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.state
            .lock()
            .invalid_tokens
            .insert(token.to_string(), expires_at);
        Ok(())
    }

    async fn is_invalid(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        let state = self.state.lock();
        Ok(state
            .invalid_tokens
            .get(token)
            .is_some_and(|expires_at| *expires_at > now))
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock();
        let before = state.invalid_tokens.len();
        state.invalid_tokens.retain(|_, expires_at| *expires_at > now);
        Ok((before - state.invalid_tokens.len()) as u64)
    }
}
