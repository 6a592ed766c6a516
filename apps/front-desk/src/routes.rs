//! Superfície HTTP do serviço de recepção
//!
//! Rotas finas sobre os fluxos de sessão, rascunho e painel. A navegação do
//! cliente (telas) fica fora daqui; cada rota corresponde a uma transição dos
//! fluxos descritos nos módulos `sync`, `roster` e `session`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rand::Rng;
use registry_db::models::{PatientRecord, PatientStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

use crate::error::ApiError;
use crate::form::RegistrationForm;
use crate::roster::RosterEntry;
use crate::session::{verify_staff_credentials, Role, Session};
use crate::state::SharedState;
use crate::sync::{DraftRegistry, DraftSession};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/auth/staff", post(staff_login))
        .route("/api/auth/patient/login", post(patient_login))
        .route("/api/auth/patient/register", post(patient_register))
        .route("/api/auth/logout", post(logout))
        .route("/api/session", get(current_session))
        .route(
            "/api/patients",
            post(create_walkin).get(roster_list).delete(clear_all),
        )
        .route("/api/patients/events", get(change_events))
        .route("/api/patients/:id", get(get_patient))
        .route("/api/patients/:id/draft", put(autosave).delete(drop_draft))
        .route("/api/patients/:id/submit", post(submit))
        .route("/api/patients/:id/edit", post(edit_entry))
        .route("/api/roster/select/:id", post(select_patient))
        .route("/api/roster/close", post(close_detail))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ═══════════════════════════════════════════
// Autenticação e sessão
// ═══════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct StaffLoginRequest {
    staff_id: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PhoneRequest {
    phone: String,
}

async fn staff_login(
    State(state): State<SharedState>,
    Json(req): Json<StaffLoginRequest>,
) -> Result<Json<Session>, ApiError> {
    if !verify_staff_credentials(&req.staff_id, &req.password) {
        return Err(ApiError::InvalidStaffCredentials);
    }

    let mut sessions = state.sessions.lock().await;
    sessions.login(Role::Staff, None)?;
    info!(staff_id = %req.staff_id, "Funcionário entrou");
    Ok(Json(sessions.current().clone()))
}

async fn patient_login(
    State(state): State<SharedState>,
    Json(req): Json<PhoneRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let phone = required_phone(&req.phone)?;

    let record = state
        .store
        .find_by_phone(&phone)
        .await?
        .ok_or(ApiError::PhoneNotRegistered)?;

    state
        .sessions
        .lock()
        .await
        .login(Role::Patient, Some(record.id.clone()))?;
    Ok(Json(json!({ "id": record.id })))
}

async fn patient_register(
    State(state): State<SharedState>,
    Json(req): Json<PhoneRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let phone = required_phone(&req.phone)?;

    if state.store.find_by_phone(&phone).await?.is_some() {
        return Err(ApiError::PhoneAlreadyRegistered);
    }

    // Id interno estável, separado da chave de telefone
    let id = Uuid::new_v4().to_string();

    // O registro só nasce na primeira digitação do formulário
    state.drafts.lock().await.insert(
        id.clone(),
        DraftSession::start(Arc::clone(&state.store), id.clone()),
    );

    state
        .sessions
        .lock()
        .await
        .login(Role::Patient, Some(id.clone()))?;
    info!(%id, "Novo cadastro de paciente iniciado");
    Ok(Json(json!({ "id": id })))
}

async fn logout(State(state): State<SharedState>) -> Result<StatusCode, ApiError> {
    let patient_id = {
        let mut sessions = state.sessions.lock().await;
        let patient_id = sessions.current().patient_id.clone();
        sessions.logout()?;
        patient_id
    };

    // A sessão de rascunho morre junto (o Drop desarma o temporizador)
    if let Some(id) = patient_id {
        state.drafts.lock().await.remove(&id);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn current_session(State(state): State<SharedState>) -> Json<Session> {
    Json(state.sessions.lock().await.current().clone())
}

// ═══════════════════════════════════════════
// Formulário do paciente
// ═══════════════════════════════════════════

#[derive(Debug, Serialize)]
struct DraftStatusResponse {
    id: String,
    status: PatientStatus,
}

/// Sessão de acesso direto, sem cadastro por telefone (variante mock)
async fn create_walkin(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    let id = format!("p-{:09}", rand::thread_rng().gen_range(0..1_000_000_000u32));

    state.drafts.lock().await.insert(
        id.clone(),
        DraftSession::start(Arc::clone(&state.store), id.clone()),
    );
    state
        .sessions
        .lock()
        .await
        .login(Role::Patient, Some(id.clone()))?;
    Ok(Json(json!({ "id": id })))
}

async fn autosave(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(form): Json<RegistrationForm>,
) -> Result<Json<DraftStatusResponse>, ApiError> {
    let mut drafts = state.drafts.lock().await;
    let draft = draft_entry(&state, &mut drafts, &id).await?;

    draft.apply_edit(form).await?;
    Ok(Json(DraftStatusResponse {
        id,
        status: draft.state(),
    }))
}

async fn submit(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(form): Json<RegistrationForm>,
) -> Result<Json<PatientRecord>, ApiError> {
    let mut drafts = state.drafts.lock().await;
    let draft = draft_entry(&state, &mut drafts, &id).await?;

    let record = draft.submit(form).await?;
    info!(%id, "Formulário de paciente enviado");
    Ok(Json(record))
}

/// Ponto de entrada de edição: reabre um registro existente
///
/// O status em memória volta a `inactive` seja qual for o valor gravado; a
/// população do formulário não conta como edição e não grava nada.
async fn edit_entry(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state.store.get(&id).await?.ok_or(ApiError::PatientNotFound)?;

    let draft = DraftSession::resume(Arc::clone(&state.store), &record).await?;
    let status = draft.state();
    state.drafts.lock().await.insert(id, draft);

    Ok(Json(json!({ "record": record, "draft_status": status })))
}

/// Saída da página: descarta a sessão de rascunho sem gravar
async fn drop_draft(State(state): State<SharedState>, Path(id): Path<String>) -> StatusCode {
    state.drafts.lock().await.remove(&id);
    StatusCode::NO_CONTENT
}

async fn get_patient(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<PatientRecord>, ApiError> {
    let record = state.store.get(&id).await?.ok_or(ApiError::PatientNotFound)?;
    Ok(Json(record))
}

// ═══════════════════════════════════════════
// Painel da equipe
// ═══════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RosterQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClearQuery {
    confirm: Option<bool>,
}

#[derive(Debug, Serialize)]
struct RosterResponse {
    patients: Vec<RosterEntry>,
    selected: Option<PatientRecord>,
}

async fn roster_list(
    State(state): State<SharedState>,
    Query(query): Query<RosterQuery>,
) -> Result<Json<RosterResponse>, ApiError> {
    require_staff(&state).await?;

    let roster = state.roster.read().await;
    Ok(Json(RosterResponse {
        patients: roster.filtered(query.q.as_deref().unwrap_or("")),
        selected: roster.selected().cloned(),
    }))
}

async fn select_patient(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<PatientRecord>, ApiError> {
    require_staff(&state).await?;

    let mut roster = state.roster.write().await;
    let selected = roster.select(&id).cloned().ok_or(ApiError::PatientNotFound)?;
    Ok(Json(selected))
}

async fn close_detail(State(state): State<SharedState>) -> Result<StatusCode, ApiError> {
    require_staff(&state).await?;
    state.roster.write().await.close_detail();
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_all(
    State(state): State<SharedState>,
    Query(query): Query<ClearQuery>,
) -> Result<StatusCode, ApiError> {
    require_staff(&state).await?;

    if query.confirm != Some(true) {
        return Err(ApiError::ConfirmationRequired);
    }

    state
        .roster
        .write()
        .await
        .clear_all(state.store.as_ref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fluxo de mudanças da coleção como Server-Sent Events
async fn change_events(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    require_staff(&state).await?;

    let rx = state.store.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        // Eventos perdidos por atraso são pulados; o cliente reconverge
        // com uma re-leitura integral
        let change = msg.ok()?;
        let event = Event::default()
            .event(change.kind.as_str())
            .json_data(&change.record)
            .ok()?;
        Some(Ok::<_, Infallible>(event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ═══════════════════════════════════════════
// Auxiliares
// ═══════════════════════════════════════════

async fn require_staff(state: &SharedState) -> Result<(), ApiError> {
    if state.sessions.lock().await.is_staff() {
        Ok(())
    } else {
        Err(ApiError::StaffOnly)
    }
}

fn required_phone(raw: &str) -> Result<String, ApiError> {
    let phone = raw.trim();
    if phone.is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("phone", ValidationError::new("required"));
        return Err(ApiError::Validation(errors));
    }
    Ok(phone.to_string())
}

async fn draft_entry<'a>(
    state: &SharedState,
    drafts: &'a mut DraftRegistry,
    id: &str,
) -> Result<&'a mut DraftSession, ApiError> {
    if !drafts.contains_key(id) {
        // Sem sessão ativa: retoma o registro gravado ou começa do zero
        let session = match state.store.get(id).await? {
            Some(record) => DraftSession::resume(Arc::clone(&state.store), &record).await?,
            None => DraftSession::start(Arc::clone(&state.store), id.to_string()),
        };
        drafts.insert(id.to_string(), session);
    }

    drafts.get_mut(id).ok_or_else(|| {
        ApiError::Internal(anyhow::anyhow!("Sessão de rascunho recém-criada ausente"))
    })
}
