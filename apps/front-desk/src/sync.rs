//! Fluxo de sincronização de rascunho
//!
//! Mantém o registro no armazenamento consistente com a digitação em curso,
//! com o status refletindo a atividade e o mínimo de gravações:
//!
//! - qualquer edição grava o formulário inteiro com `filling` e rearma o
//!   temporizador de inatividade (debounce de 3000 ms — só a última edição de
//!   uma rajada mantém um temporizador pendente);
//! - o temporizador expirado grava os mesmos valores com `inactive`;
//! - o envio explícito cancela o temporizador ANTES da gravação final com
//!   `submitted`, garantindo que nenhuma gravação desta sessão a sucede;
//! - `submitted` é terminal: edições posteriores são rejeitadas sem gravar.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use registry_db::error::StoreError;
use registry_db::models::{PatientRecord, PatientStatus};
use registry_db::store::SharedStore;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;
use validator::{Validate, ValidationErrors};

use crate::form::RegistrationForm;

/// Pausa de digitação que rebaixa a sessão para `inactive`
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Origem de uma mudança de valores no formulário
///
/// Popular o formulário a partir de um registro carregado NÃO é uma edição do
/// usuário e não pode disparar gravação espúria. A distinção é um estado
/// explícito, não um acidente de ordem de chamadas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    UserEdit,
    ProgrammaticLoad,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Formulário já enviado; edições não são mais aceitas")]
    AlreadySubmitted,

    #[error("Dados obrigatórios ausentes ou inválidos")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Máquina de estados de uma sessão de formulário ativa
///
/// O estado fica em um `Arc<Mutex<_>>` porque a tarefa do temporizador também
/// o rebaixa para `inactive` ao expirar.
pub struct DraftSession {
    store: SharedStore,
    id: String,
    form: RegistrationForm,
    state: Arc<Mutex<PatientStatus>>,
    idle_timer: Option<JoinHandle<()>>,
}

impl DraftSession {
    /// Sessão nova, sem registro gravado até a primeira edição
    pub fn start(store: SharedStore, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
            form: RegistrationForm::default(),
            state: Arc::new(Mutex::new(PatientStatus::Inactive)),
            idle_timer: None,
        }
    }

    /// Ponto de entrada de edição: retoma um registro existente
    ///
    /// Força o estado em memória para `inactive` independentemente do status
    /// gravado (mesmo `submitted` volta a ser editável) e não grava nada.
    pub async fn resume(store: SharedStore, record: &PatientRecord) -> Result<Self, SyncError> {
        let mut session = Self::start(store, record.id.clone());
        session
            .apply(
                RegistrationForm::from_record(record),
                ChangeSource::ProgrammaticLoad,
            )
            .await?;
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PatientStatus {
        *lock_state(&self.state)
    }

    pub fn form(&self) -> &RegistrationForm {
        &self.form
    }

    /// Edição do usuário: grava `filling` e rearma o temporizador
    pub async fn apply_edit(&mut self, form: RegistrationForm) -> Result<(), SyncError> {
        self.apply(form, ChangeSource::UserEdit).await
    }

    /// Único ponto de mudança de valores; a origem decide se há gravação
    pub async fn apply(
        &mut self,
        form: RegistrationForm,
        source: ChangeSource,
    ) -> Result<(), SyncError> {
        if self.state() == PatientStatus::Submitted {
            return Err(SyncError::AlreadySubmitted);
        }

        match source {
            ChangeSource::ProgrammaticLoad => {
                self.populate(form);
                Ok(())
            }
            ChangeSource::UserEdit => {
                // Debounce: a edição anterior perde seu temporizador
                self.cancel_timer();
                self.form = form;

                let record = self
                    .form
                    .to_record(&self.id, PatientStatus::Filling, Utc::now());
                self.store.upsert(record.clone()).await?;
                *lock_state(&self.state) = PatientStatus::Filling;

                self.schedule_idle_write(record);
                Ok(())
            }
        }
    }

    /// Envio explícito: valida, cancela o temporizador e grava o estado terminal
    pub async fn submit(&mut self, form: RegistrationForm) -> Result<PatientRecord, SyncError> {
        if self.state() == PatientStatus::Submitted {
            return Err(SyncError::AlreadySubmitted);
        }

        form.validate()?;

        // Garantia de ordem: o temporizador morre antes da gravação final
        self.cancel_timer();

        let record = form.to_record(&self.id, PatientStatus::Submitted, Utc::now());
        self.store.upsert(record.clone()).await?;

        self.form = form;
        *lock_state(&self.state) = PatientStatus::Submitted;
        Ok(record)
    }

    fn populate(&mut self, form: RegistrationForm) {
        self.form = form;
        *lock_state(&self.state) = PatientStatus::Inactive;
    }

    fn schedule_idle_write(&mut self, mut record: PatientRecord) {
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);

        self.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(INACTIVITY_TIMEOUT).await;

            record.status = PatientStatus::Inactive;
            record.updated_at = Utc::now();
            match store.upsert(record).await {
                Ok(()) => *lock_state(&state) = PatientStatus::Inactive,
                Err(e) => warn!("Falha ao gravar status inactive após pausa: {}", e),
            }
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for DraftSession {
    /// Contrato de limpeza: sair da página não deixa gravação pendente
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

fn lock_state(state: &Mutex<PatientStatus>) -> std::sync::MutexGuard<'_, PatientStatus> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sessões de rascunho ativas, indexadas pelo id do registro
pub type DraftRegistry = HashMap<String, DraftSession>;
