use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::money::Money;
use crate::models::payment::PaymentProof;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/:id/proofs", post(upload_proof).get(list_proofs))
        .route("/proofs/:id/verify", post(verify_proof))
}

#[derive(Deserialize)]
pub struct UploadProofRequest {
    pub amount: Money,
    pub evidence_ref: String,
}

#[derive(Deserialize)]
pub struct VerifyProofRequest {
    pub approved: bool,
    pub admin_id: String,
    pub rejection_reason: Option<String>,
}

#[derive(Serialize)]
pub struct VerificationResponse {
    pub driver: Driver,
    pub proof: PaymentProof,
}

async fn upload_proof(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UploadProofRequest>,
) -> Result<Json<PaymentProof>, AppError> {
    if payload.evidence_ref.trim().is_empty() {
        return Err(AppError::BadRequest("evidence_ref cannot be empty".to_string()));
    }

    let proof = state.commit_proof_upload(id, payload.amount, payload.evidence_ref)?;
    Ok(Json(proof))
}

async fn list_proofs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PaymentProof>>, AppError> {
    state.driver(id)?;
    let mut proofs = state.proofs_for(id);
    proofs.sort_by_key(|proof| proof.uploaded_at);
    Ok(Json(proofs))
}

async fn verify_proof(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyProofRequest>,
) -> Result<Json<VerificationResponse>, AppError> {
    if payload.admin_id.trim().is_empty() {
        return Err(AppError::BadRequest("admin_id cannot be empty".to_string()));
    }

    let verification = state.commit_verification(
        id,
        payload.approved,
        &payload.admin_id,
        payload.rejection_reason.as_deref(),
    )?;

    Ok(Json(VerificationResponse {
        driver: verification.driver,
        proof: verification.proof,
    }))
}
