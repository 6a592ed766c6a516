//! Sessão local de papel (convidado / paciente / funcionário)
//!
//! Não é uma fronteira de segurança: a credencial de funcionário é fixa e a
//! sessão vive no próprio processo, persistida em um arquivo JSON sob chave
//! fixa (o análogo do localStorage do navegador). Sobrevive a reinícios e é
//! apagada no logout.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use registry_db::store::PatientStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Senha fixa de demonstração para o papel de funcionário
pub const STAFF_PASSWORD: &str = "1234";

/// Papel ativo no processo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Patient,
    Staff,
}

/// Estado de login do processo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub role: Role,
    /// Presente apenas quando `role == Patient`
    pub patient_id: Option<String>,
}

impl Session {
    pub fn guest() -> Self {
        Self {
            role: Role::Guest,
            patient_id: None,
        }
    }
}

/// Credencial de funcionário: qualquer identificador não vazio + senha fixa
pub fn verify_staff_credentials(staff_id: &str, password: &str) -> bool {
    !staff_id.trim().is_empty() && password == STAFF_PASSWORD
}

/// Persistência da sessão entre execuções
pub trait SessionPersistence: Send + Sync {
    fn load(&self) -> Result<Option<Session>>;
    fn save(&self, session: &Session) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Persistência em arquivo JSON sob caminho fixo
pub struct FileSessionPersistence {
    path: PathBuf,
}

impl FileSessionPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionPersistence for FileSessionPersistence {
    fn load(&self) -> Result<Option<Session>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Falha ao ler arquivo de sessão"),
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // Arquivo corrompido equivale a não ter sessão
                warn!("Sessão persistida ilegível ({}); descartando", e);
                Ok(None)
            }
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).context("Falha ao criar diretório da sessão")?;
            }
        }
        let raw = serde_json::to_string(session).context("Falha ao serializar sessão")?;
        fs::write(&self.path, raw).context("Falha ao gravar arquivo de sessão")
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Falha ao remover arquivo de sessão"),
        }
    }
}

/// Persistência em memória, para testes e demos sem disco
#[derive(Default)]
pub struct MemorySessionPersistence {
    inner: Mutex<Option<Session>>,
}

impl MemorySessionPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionPersistence for MemorySessionPersistence {
    fn load(&self) -> Result<Option<Session>> {
        Ok(self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}

/// Dono da sessão do processo, com ciclo de vida explícito
///
/// Inicializa a partir da persistência, muta apenas via login/logout e grava
/// cada mudança. Nada de estado global ambiente.
pub struct SessionManager {
    session: Session,
    persistence: Box<dyn SessionPersistence>,
}

impl SessionManager {
    /// Carrega a sessão persistida e a valida contra o armazenamento
    ///
    /// Uma sessão de paciente cujo registro não existe mais degrada para
    /// convidado, como no fluxo original de verificação de sessão.
    pub async fn init(
        persistence: Box<dyn SessionPersistence>,
        store: &dyn PatientStore,
    ) -> Result<Self> {
        let mut session = persistence.load()?.unwrap_or_else(Session::guest);

        if session.role == Role::Patient {
            let valid = match &session.patient_id {
                Some(id) => store
                    .get(id)
                    .await
                    .context("Falha ao validar sessão de paciente")?
                    .is_some(),
                None => false,
            };
            if !valid {
                info!("Sessão de paciente órfã; voltando para convidado");
                session = Session::guest();
                persistence.clear()?;
            }
        }

        Ok(Self {
            session,
            persistence,
        })
    }

    pub fn current(&self) -> &Session {
        &self.session
    }

    pub fn is_staff(&self) -> bool {
        self.session.role == Role::Staff
    }

    pub fn login(&mut self, role: Role, patient_id: Option<String>) -> Result<()> {
        self.session = Session { role, patient_id };
        self.persistence.save(&self.session)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.session = Session::guest();
        self.persistence.clear()
    }
}
