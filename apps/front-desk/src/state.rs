//! Configuração e estado compartilhado da aplicação

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use registry_db::store::SharedStore;
use registry_db::DbConfig;
use tokio::sync::{Mutex, RwLock};

use crate::roster::{Roster, SyncMode};
use crate::session::SessionManager;
use crate::sync::DraftRegistry;

/// Configuração do serviço, lida do ambiente com padrões do time
#[derive(Debug, Clone)]
pub struct Config {
    /// Endereço de escuta (FRONT_DESK_ADDR)
    pub bind_addr: SocketAddr,
    /// Banco de dados (FRONT_DESK_DB)
    pub db: DbConfig,
    /// Arquivo da sessão persistida (FRONT_DESK_SESSION)
    pub session_path: PathBuf,
    /// Painel por polling em vez de assinatura (FRONT_DESK_POLL=1)
    pub roster_sync: SyncMode,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("FRONT_DESK_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .context("FRONT_DESK_ADDR inválido")?;

        let db_path =
            std::env::var("FRONT_DESK_DB").unwrap_or_else(|_| "data/registry.db".to_string());

        let session_path = std::env::var("FRONT_DESK_SESSION")
            .unwrap_or_else(|_| "data/agnos_session.json".to_string());

        let roster_sync = match std::env::var("FRONT_DESK_POLL").as_deref() {
            Ok("1") | Ok("true") => SyncMode::Poll,
            _ => SyncMode::Subscribe,
        };

        Ok(Self {
            bind_addr,
            db: DbConfig {
                db_path,
                ..DbConfig::default()
            },
            session_path: PathBuf::from(session_path),
            roster_sync,
        })
    }
}

/// Estado compartilhado entre os handlers
pub struct AppState {
    pub store: SharedStore,
    /// Sessão de papel do processo (convidado/paciente/funcionário)
    pub sessions: Mutex<SessionManager>,
    /// Sessões de rascunho ativas, uma por id de registro
    pub drafts: Mutex<DraftRegistry>,
    /// Painel compartilhado, mantido pela tarefa de sincronização
    pub roster: Arc<RwLock<Roster>>,
}

impl AppState {
    pub fn new(store: SharedStore, sessions: SessionManager) -> Self {
        Self {
            store,
            sessions: Mutex::new(sessions),
            drafts: Mutex::new(HashMap::new()),
            roster: Arc::new(RwLock::new(Roster::new())),
        }
    }
}

pub type SharedState = Arc<AppState>;
