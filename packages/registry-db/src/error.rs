//! Definições de erro para a biblioteca registry-db
//!
//! Este módulo define os tipos de erro usados pela biblioteca

use thiserror::Error;

/// Erros específicos para operações do armazenamento de pacientes
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Erro de conexão com banco de dados: {0}")]
    ConnectionError(String),

    #[error("Erro de migração: {0}")]
    MigrationError(String),

    #[error("Erro de consulta: {0}")]
    QueryError(String),

    #[error("Registro não encontrado: {0}")]
    NotFound(String),

    #[error("Violação de restrição: {0}")]
    ConstraintViolation(String),

    #[error("Erro interno: {0}")]
    InternalError(String),
}

/// Conversão de erros específicos do SQLx para nossos tipos de erro
impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => StoreError::NotFound("Registro não encontrado".to_string()),
            sqlx::Error::Database(dbe) => {
                if let Some(code) = dbe.code() {
                    // 2067 = SQLITE_CONSTRAINT_UNIQUE, 23000 = violação genérica
                    if code.as_ref() == "23000" || code.as_ref() == "2067" {
                        return StoreError::ConstraintViolation(dbe.message().to_string());
                    }
                }
                StoreError::QueryError(dbe.message().to_string())
            }
            sqlx::Error::ColumnNotFound(col) => {
                StoreError::QueryError(format!("Coluna não encontrada: {}", col))
            }
            sqlx::Error::TypeNotFound { type_name } => {
                StoreError::QueryError(format!("Tipo não encontrado: {}", type_name))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::QueryError(format!("Erro ao decodificar coluna {}: {}", index, source))
            }
            sqlx::Error::Io(io_err) => StoreError::ConnectionError(io_err.to_string()),
            sqlx::Error::Configuration(conf_err) => {
                StoreError::ConnectionError(conf_err.to_string())
            }
            sqlx::Error::PoolClosed => {
                StoreError::ConnectionError("Pool de conexões fechado".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                StoreError::ConnectionError("Timeout no pool de conexões".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                StoreError::InternalError("Worker do banco de dados falhou".to_string())
            }
            _ => StoreError::InternalError(format!("Erro inesperado: {:?}", error)),
        }
    }
}
