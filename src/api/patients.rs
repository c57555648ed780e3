//! Patient record endpoints.

use super::{ApiError, AppState};
use crate::auth::AuthContext;
use crate::models::{
    DemographicsUpdate, MedicalUpdate, Page, PageQuery, Patient, PatientChanges,
    PatientCreateRequest, PatientCreateResponse, PatientListResponse,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

/// GET /patients
pub async fn list_patients(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PatientListResponse>, ApiError> {
    let Query(query) = query?;
    let page = Page::from(query);

    let (patients, total) = state.repos.patients.list(page).await?;

    Ok(Json(PatientListResponse {
        patients,
        total,
        page: page.page,
        page_size: page.page_size,
    }))
}

/// GET /patients/:id
pub async fn get_patient(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Patient>, ApiError> {
    let Path(id) = id?;

    let patient = state
        .repos
        .patients
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound("Patient not found"))?;

    Ok(Json(patient))
}

/// POST /patients (receptionist)
pub async fn create_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    payload: Result<Json<PatientCreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PatientCreateResponse>), ApiError> {
    let Json(payload) = payload?;
    let new_patient = payload
        .validate(Utc::now().date_naive())
        .map_err(ApiError::Validation)?;

    let patient_id = state
        .repos
        .patients
        .create(ctx.user_id, &new_patient)
        .await?;

    info!("🩺 Patient {} registered by {}", patient_id, ctx.user_id);

    Ok((
        StatusCode::CREATED,
        Json(PatientCreateResponse {
            patient_id,
            message: "Patient created successfully".to_string(),
        }),
    ))
}

/// PUT /patients/:id (receptionist, demographic fields only)
pub async fn update_patient_demographics(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<DemographicsUpdate>, JsonRejection>,
) -> Result<Json<Patient>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let changes = payload
        .validate(Utc::now().date_naive())
        .map_err(ApiError::Validation)?;

    apply_changes(&state, id, changes).await
}

/// PATCH /patients/:id (doctor, medical history only)
pub async fn update_patient_medical(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<MedicalUpdate>, JsonRejection>,
) -> Result<Json<Patient>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;

    apply_changes(&state, id, payload.into()).await
}

async fn apply_changes(
    state: &AppState,
    id: Uuid,
    changes: PatientChanges,
) -> Result<Json<Patient>, ApiError> {
    let patient = state
        .repos
        .patients
        .update(id, &changes)
        .await?
        .ok_or(ApiError::NotFound("Patient not found"))?;

    Ok(Json(patient))
}

/// DELETE /patients/:id (receptionist)
pub async fn delete_patient(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;

    if !state.repos.patients.delete(id).await? {
        return Err(ApiError::NotFound("Patient not found"));
    }

    info!("🗑️  Patient deleted: {}", id);

    Ok(StatusCode::NO_CONTENT)
}
