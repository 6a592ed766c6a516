//! Painel ao vivo de pacientes para a equipe da recepção
//!
//! Mantém uma lista em memória alimentada pelo canal de mudanças do
//! armazenamento (ou, como alternativa, por re-leitura periódica), com seleção
//! de detalhe, filtro de texto livre e limpeza total. Os dois modos de
//! sincronização convergem para a mesma visão.

use std::sync::Arc;
use std::time::Duration;

use registry_db::error::StoreError;
use registry_db::models::{ChangeEvent, ChangeKind, PatientRecord, PatientStatus};
use registry_db::store::{PatientStore, SharedStore};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Intervalo da variante por polling (re-leitura integral)
pub const ROSTER_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Categoria visual de um status de paciente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusIndicator {
    /// Digitando agora — indicador chamativo
    ActivelyEditing,
    /// Formulário enviado — indicador de concluído
    Complete,
    /// Qualquer outro caso — indicador neutro
    Inactive,
}

/// Mapeamento exaustivo de status para indicador
///
/// Um novo valor de status quebra a compilação aqui em vez de cair em um
/// fallthrough silencioso.
pub fn indicator(status: PatientStatus) -> StatusIndicator {
    match status {
        PatientStatus::Filling => StatusIndicator::ActivelyEditing,
        PatientStatus::Submitted => StatusIndicator::Complete,
        PatientStatus::Inactive => StatusIndicator::Inactive,
    }
}

/// Entrada do painel como entregue à UI
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub indicator: StatusIndicator,
    pub medical_alert: bool,
    pub record: PatientRecord,
}

impl From<PatientRecord> for RosterEntry {
    fn from(record: PatientRecord) -> Self {
        Self {
            indicator: indicator(record.status),
            medical_alert: record.has_medical_alert(),
            record,
        }
    }
}

/// Visão em memória de todos os registros de pacientes
#[derive(Default)]
pub struct Roster {
    patients: Vec<PatientRecord>,
    selected: Option<PatientRecord>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patients(&self) -> &[PatientRecord] {
        &self.patients
    }

    pub fn selected(&self) -> Option<&PatientRecord> {
        self.selected.as_ref()
    }

    /// Re-leitura integral do armazenamento (montagem e variante por polling)
    pub async fn refresh(&mut self, store: &dyn PatientStore) -> Result<(), StoreError> {
        self.patients = store.list().await?;

        // O painel de detalhe acompanha a nova leitura: atualiza ou fecha
        if let Some(selected) = &self.selected {
            self.selected = self.patients.iter().find(|r| r.id == selected.id).cloned();
        }
        Ok(())
    }

    /// Remendo mínimo em memória a partir de uma notificação de mudança
    pub fn apply_change(&mut self, event: ChangeEvent) {
        let ChangeEvent { kind, record } = event;
        match kind {
            ChangeKind::Created => {
                // Idempotente: um created repetido vira substituição
                if let Some(slot) = self.patients.iter_mut().find(|r| r.id == record.id) {
                    *slot = record.clone();
                } else {
                    self.patients.insert(0, record.clone());
                }
                self.refresh_selected(record);
            }
            ChangeKind::Updated => {
                match self.patients.iter_mut().find(|r| r.id == record.id) {
                    Some(slot) => *slot = record.clone(),
                    // Update de registro desconhecido: converge inserindo
                    None => self.patients.insert(0, record.clone()),
                }
                self.refresh_selected(record);
            }
            ChangeKind::Deleted => {
                self.patients.retain(|r| r.id != record.id);
                if self.selected.as_ref().is_some_and(|s| s.id == record.id) {
                    // Registro aberto no detalhe foi removido: fecha o painel
                    self.selected = None;
                }
            }
        }
    }

    fn refresh_selected(&mut self, record: PatientRecord) {
        if self.selected.as_ref().is_some_and(|s| s.id == record.id) {
            self.selected = Some(record);
        }
    }

    /// Abre o painel de detalhe para um registro da lista
    pub fn select(&mut self, id: &str) -> Option<&PatientRecord> {
        self.selected = self.patients.iter().find(|r| r.id == id).cloned();
        self.selected.as_ref()
    }

    pub fn close_detail(&mut self) {
        self.selected = None;
    }

    /// Filtro de texto livre, aplicado só sobre o conjunto em memória
    ///
    /// Casa se o nome completo contém a consulta (sem diferenciar maiúsculas)
    /// ou se o telefone a contém como substring. Consulta vazia devolve tudo.
    pub fn filtered(&self, query: &str) -> Vec<RosterEntry> {
        let query = query.trim();
        self.patients
            .iter()
            .filter(|record| matches_query(record, query))
            .cloned()
            .map(RosterEntry::from)
            .collect()
    }

    /// Operação destrutiva: esvazia o armazenamento e a visão
    ///
    /// A confirmação explícita é exigida na borda (rota), não aqui.
    pub async fn clear_all(&mut self, store: &dyn PatientStore) -> Result<(), StoreError> {
        store.delete_all().await?;
        self.patients.clear();
        self.selected = None;
        info!("Todos os registros de pacientes foram removidos pela equipe");
        Ok(())
    }
}

fn matches_query(record: &PatientRecord, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let name = record.full_name().to_lowercase();
    name.contains(&query.to_lowercase()) || record.phone.contains(query)
}

/// Modo de sincronização do painel com o armazenamento
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Assinatura do canal de mudanças (padrão)
    Subscribe,
    /// Re-leitura integral a cada `ROSTER_POLL_INTERVAL`
    Poll,
}

/// Tarefa de fundo que mantém o painel compartilhado atualizado
pub async fn run_sync_task(roster: Arc<RwLock<Roster>>, store: SharedStore, mode: SyncMode) {
    match mode {
        SyncMode::Subscribe => {
            // Assinar ANTES da leitura inicial: uma mudança gravada enquanto a
            // leitura está em voo fica enfileirada no canal e é aplicada logo
            // depois (`apply_change` é idempotente para o replay)
            let mut rx = store.subscribe();

            if let Err(e) = roster.write().await.refresh(store.as_ref()).await {
                warn!("Falha na leitura inicial do painel: {}", e);
            }

            loop {
                match rx.recv().await {
                    Ok(event) => {
                        debug!(kind = %event.kind, id = %event.record.id, "Mudança aplicada ao painel");
                        roster.write().await.apply_change(event);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Perdemos eventos: reconverge com leitura integral
                        warn!(missed, "Canal de mudanças atrasado; relendo tudo");
                        if let Err(e) = roster.write().await.refresh(store.as_ref()).await {
                            warn!("Falha ao reler o painel: {}", e);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        SyncMode::Poll => {
            // O primeiro tick é imediato e faz a leitura inicial
            let mut ticker = tokio::time::interval(ROSTER_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = roster.write().await.refresh(store.as_ref()).await {
                    warn!("Falha na re-leitura periódica do painel: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use registry_db::store::MemoryStore;
    use tokio::sync::broadcast;
    use tokio::sync::{Notify, Semaphore};

    fn record(id: &str, first: &str, last: &str, phone: &str, status: PatientStatus) -> PatientRecord {
        let mut r = PatientRecord::empty(id);
        r.first_name = first.to_string();
        r.last_name = last.to_string();
        r.phone = phone.to_string();
        r.status = status;
        r
    }

    #[tokio::test]
    async fn test_incremental_patching_matches_full_refresh() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let mut rx = store.subscribe();

        let mut incremental = Roster::new();

        store.upsert(record("a", "Ana", "Souza", "0811111111", PatientStatus::Filling)).await?;
        store.upsert(record("b", "Bia", "Lima", "0822222222", PatientStatus::Filling)).await?;
        let mut updated = record("a", "Ana", "Souza", "0811111111", PatientStatus::Submitted);
        updated.email = Some("ana@example.com".to_string());
        store.upsert(updated).await?;

        for _ in 0..3 {
            incremental.apply_change(rx.recv().await?);
        }

        let mut full = Roster::new();
        full.refresh(store.as_ref()).await?;

        assert_eq!(incremental.patients(), full.patients());

        // Exclusões também convergem
        store.delete_all().await?;
        while let Ok(event) = rx.try_recv() {
            incremental.apply_change(event);
        }
        full.refresh(store.as_ref()).await?;
        assert_eq!(incremental.patients(), full.patients());
        assert!(incremental.patients().is_empty());
        Ok(())
    }

    #[test]
    fn test_filter_matches_name_or_phone() {
        let mut roster = Roster::new();
        roster.apply_change(ChangeEvent {
            kind: ChangeKind::Created,
            record: record("a", "สมชาย", "ใจดี", "0812345678", PatientStatus::Submitted),
        });
        roster.apply_change(ChangeEvent {
            kind: ChangeKind::Created,
            record: record("b", "Maria", "Silva", "0899999999", PatientStatus::Filling),
        });

        // Consulta vazia (ou só espaços) devolve o conjunto completo
        assert_eq!(roster.filtered("").len(), 2);
        assert_eq!(roster.filtered("   ").len(), 2);

        // Nome, sem diferenciar maiúsculas
        let hits = roster.filtered("mArIa");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "b");

        // Substring sobre nome completo cruzando nome e sobrenome
        assert_eq!(roster.filtered("maria silva").len(), 1);

        // Telefone como substring
        let hits = roster.filtered("1234");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "a");

        assert!(roster.filtered("inexistente").is_empty());
    }

    #[test]
    fn test_indicator_mapping_is_exhaustive() {
        assert_eq!(indicator(PatientStatus::Filling), StatusIndicator::ActivelyEditing);
        assert_eq!(indicator(PatientStatus::Submitted), StatusIndicator::Complete);
        assert_eq!(indicator(PatientStatus::Inactive), StatusIndicator::Inactive);
    }

    #[test]
    fn test_detail_panel_follows_updates_and_deletes() {
        let mut roster = Roster::new();
        roster.apply_change(ChangeEvent {
            kind: ChangeKind::Created,
            record: record("a", "Ana", "Souza", "0811111111", PatientStatus::Filling),
        });

        roster.select("a");
        assert_eq!(roster.selected().unwrap().status, PatientStatus::Filling);

        // Atualização do registro aberto renova a cópia exibida
        roster.apply_change(ChangeEvent {
            kind: ChangeKind::Updated,
            record: record("a", "Ana", "Souza", "0811111111", PatientStatus::Submitted),
        });
        assert_eq!(roster.selected().unwrap().status, PatientStatus::Submitted);

        // Exclusão do registro aberto fecha o painel
        roster.apply_change(ChangeEvent {
            kind: ChangeKind::Deleted,
            record: record("a", "Ana", "Souza", "0811111111", PatientStatus::Submitted),
        });
        assert!(roster.selected().is_none());
        assert!(roster.patients().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_empties_view_and_store() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        store.upsert(record("a", "Ana", "Souza", "0811111111", PatientStatus::Submitted)).await?;

        let mut roster = Roster::new();
        roster.refresh(store.as_ref()).await?;
        roster.select("a");
        assert_eq!(roster.patients().len(), 1);

        roster.clear_all(store.as_ref()).await?;

        assert!(roster.patients().is_empty());
        assert!(roster.selected().is_none());
        // Busca subsequente de um id antes conhecido devolve não-encontrado
        assert!(store.get("a").await?.is_none());
        Ok(())
    }

    /// Armazenamento cuja listagem tira a foto e então suspende até ser
    /// liberada, como uma consulta real faria no pool
    struct GatedListStore {
        inner: MemoryStore,
        listing: Notify,
        release: Semaphore,
    }

    impl GatedListStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                listing: Notify::new(),
                release: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl PatientStore for GatedListStore {
        async fn get(&self, id: &str) -> Result<Option<PatientRecord>, StoreError> {
            self.inner.get(id).await
        }

        async fn find_by_phone(&self, phone: &str) -> Result<Option<PatientRecord>, StoreError> {
            self.inner.find_by_phone(phone).await
        }

        async fn list(&self) -> Result<Vec<PatientRecord>, StoreError> {
            let snapshot = self.inner.list().await?;
            self.listing.notify_one();
            let _permit = self
                .release
                .acquire()
                .await
                .map_err(|_| StoreError::InternalError("Semáforo fechado".to_string()))?;
            Ok(snapshot)
        }

        async fn upsert(&self, record: PatientRecord) -> Result<(), StoreError> {
            self.inner.upsert(record).await
        }

        async fn delete_all(&self) -> Result<(), StoreError> {
            self.inner.delete_all().await
        }

        fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn test_subscribe_mode_keeps_changes_made_during_initial_read() -> anyhow::Result<()> {
        let store = Arc::new(GatedListStore::new());
        let roster = Arc::new(RwLock::new(Roster::new()));

        let task = tokio::spawn(run_sync_task(
            Arc::clone(&roster),
            Arc::clone(&store) as SharedStore,
            SyncMode::Subscribe,
        ));

        // A leitura inicial tirou a foto (vazia) e está suspensa
        store.listing.notified().await;

        // Gravação concorrente enquanto a leitura está em voo
        store
            .upsert(record("a", "Ana", "Souza", "0811111111", PatientStatus::Filling))
            .await?;

        // Libera a leitura inicial; o evento enfileirado chega em seguida
        store.release.add_permits(1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(roster.read().await.patients().len(), 1);
        assert_eq!(roster.read().await.patients()[0].id, "a");

        task.abort();
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_mode_converges_to_store_state() -> anyhow::Result<()> {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let roster = Arc::new(RwLock::new(Roster::new()));

        let task = tokio::spawn(run_sync_task(
            Arc::clone(&roster),
            Arc::clone(&store),
            SyncMode::Poll,
        ));

        store.upsert(record("a", "Ana", "Souza", "0811111111", PatientStatus::Filling)).await?;

        // Um tick completo do intervalo de 1000 ms
        tokio::time::sleep(ROSTER_POLL_INTERVAL + Duration::from_millis(100)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        assert_eq!(roster.read().await.patients().len(), 1);
        task.abort();
        Ok(())
    }
}
