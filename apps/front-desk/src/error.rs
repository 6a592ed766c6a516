//! Erros da camada HTTP
//!
//! Nenhuma falha é fatal ao processo: cada erro fica localizado na ação que o
//! disparou e o rascunho em memória nunca se perde por causa de uma resposta
//! de erro.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use registry_db::error::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::sync::SyncError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Login de paciente com telefone sem cadastro (dica: registrar)
    #[error("Não encontramos cadastro para este telefone")]
    PhoneNotRegistered,

    /// Registro de paciente com telefone já cadastrado (dica: entrar)
    #[error("Este telefone já possui cadastro")]
    PhoneAlreadyRegistered,

    #[error("Paciente não encontrado")]
    PatientNotFound,

    #[error("Identificador ou senha de funcionário incorretos")]
    InvalidStaffCredentials,

    #[error("Acesso restrito à equipe")]
    StaffOnly,

    #[error("Operação destrutiva exige confirmação explícita")]
    ConfirmationRequired,

    #[error("Formulário já enviado")]
    AlreadySubmitted,

    #[error("Dados obrigatórios ausentes ou inválidos")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::AlreadySubmitted => ApiError::AlreadySubmitted,
            SyncError::Validation(errors) => ApiError::Validation(errors),
            SyncError::Store(e) => ApiError::Store(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, hint, details) = match &self {
            ApiError::PhoneNotRegistered => (
                StatusCode::NOT_FOUND,
                Some("Use \"Registrar\" para criar um novo cadastro"),
                None,
            ),
            ApiError::PhoneAlreadyRegistered => (
                StatusCode::CONFLICT,
                Some("Use \"Entrar\" para acessar o cadastro existente"),
                None,
            ),
            ApiError::PatientNotFound => (StatusCode::NOT_FOUND, None, None),
            ApiError::InvalidStaffCredentials => (StatusCode::UNAUTHORIZED, None, None),
            ApiError::StaffOnly => (StatusCode::FORBIDDEN, None, None),
            ApiError::ConfirmationRequired => (StatusCode::BAD_REQUEST, None, None),
            ApiError::AlreadySubmitted => (StatusCode::CONFLICT, None, None),
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                None,
                serde_json::to_value(errors).ok(),
            ),
            ApiError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, None, None),
            ApiError::Store(e) => {
                error!("Erro do armazenamento: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, None, None)
            }
            ApiError::Internal(e) => {
                error!("Erro interno: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, None, None)
            }
        };

        let mut body = json!({ "error": self.to_string() });
        if let Some(hint) = hint {
            body["hint"] = json!(hint);
        }
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}
