//! Armazenamento de registros de pacientes
//!
//! Define a interface estreita consumida pelas aplicações (buscar, listar,
//! gravar, limpar, assinar mudanças) e suas duas implementações
//! intercambiáveis: SQLite persistente e memória (mock para testes e demos).
//! Nenhuma restrição de uma implementação vaza para a outra — o canal de
//! notificação é sempre um `tokio::sync::broadcast`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{ChangeEvent, ChangeKind, PatientRecord};

/// Capacidade do canal de notificação de mudanças
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Interface estreita do armazenamento de pacientes
///
/// Gravações são sempre upserts integrais: criar se ausente, substituir por
/// completo se presente. Nunca um patch parcial.
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Busca um registro pelo identificador interno
    async fn get(&self, id: &str) -> Result<Option<PatientRecord>, StoreError>;

    /// Busca um registro pela chave de telefone (apenas valores preenchidos)
    async fn find_by_phone(&self, phone: &str) -> Result<Option<PatientRecord>, StoreError>;

    /// Lista todos os registros, mais recentes primeiro
    async fn list(&self) -> Result<Vec<PatientRecord>, StoreError>;

    /// Cria ou substitui integralmente um registro e notifica os assinantes
    async fn upsert(&self, record: PatientRecord) -> Result<(), StoreError>;

    /// Remove todos os registros, notificando uma exclusão por registro
    async fn delete_all(&self) -> Result<(), StoreError>;

    /// Assina o canal de mudanças da coleção
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Ponteiro compartilhado para qualquer implementação do armazenamento
pub type SharedStore = Arc<dyn PatientStore>;

// ═══════════════════════════════════════════
// Implementação persistente (SQLite)
// ═══════════════════════════════════════════

/// Armazenamento persistente sobre SQLite
pub struct SqliteStore {
    pool: SqlitePool,
    events: broadcast::Sender<ChangeEvent>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { pool, events }
    }

    fn notify(&self, kind: ChangeKind, record: PatientRecord) {
        // Sem assinantes não é erro: o canal simplesmente descarta
        let _ = self.events.send(ChangeEvent { kind, record });
    }
}

#[async_trait]
impl PatientStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<PatientRecord>, StoreError> {
        let record = sqlx::query_as::<_, PatientRecord>("SELECT * FROM patients WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<PatientRecord>, StoreError> {
        let record = sqlx::query_as::<_, PatientRecord>(
            "SELECT * FROM patients WHERE phone = ? AND phone <> ''",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<PatientRecord>, StoreError> {
        let records =
            sqlx::query_as::<_, PatientRecord>("SELECT * FROM patients ORDER BY updated_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(records)
    }

    async fn upsert(&self, record: PatientRecord) -> Result<(), StoreError> {
        // Classificar antes de gravar: criação ou atualização
        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM patients WHERE id = ?")
            .bind(&record.id)
            .fetch_optional(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO patients (
                id, first_name, middle_name, last_name, dob, gender,
                nationality, religion, pref_language, bloodtype,
                chronic_disease, allergies, phone, email, address,
                emergency_contact_name, emergency_contact_rel, emergency_contact_phone,
                status, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                middle_name = excluded.middle_name,
                last_name = excluded.last_name,
                dob = excluded.dob,
                gender = excluded.gender,
                nationality = excluded.nationality,
                religion = excluded.religion,
                pref_language = excluded.pref_language,
                bloodtype = excluded.bloodtype,
                chronic_disease = excluded.chronic_disease,
                allergies = excluded.allergies,
                phone = excluded.phone,
                email = excluded.email,
                address = excluded.address,
                emergency_contact_name = excluded.emergency_contact_name,
                emergency_contact_rel = excluded.emergency_contact_rel,
                emergency_contact_phone = excluded.emergency_contact_phone,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.first_name)
        .bind(&record.middle_name)
        .bind(&record.last_name)
        .bind(record.dob)
        .bind(record.gender.map(|g| g.as_str()))
        .bind(&record.nationality)
        .bind(&record.religion)
        .bind(&record.pref_language)
        .bind(&record.bloodtype)
        .bind(&record.chronic_disease)
        .bind(&record.allergies)
        .bind(&record.phone)
        .bind(&record.email)
        .bind(&record.address)
        .bind(&record.emergency_contact_name)
        .bind(&record.emergency_contact_rel)
        .bind(&record.emergency_contact_phone)
        .bind(record.status.as_str())
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        let kind = if existing.is_some() {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };
        debug!(id = %record.id, kind = %kind, "Registro de paciente gravado");
        self.notify(kind, record);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let removed = self.list().await?;

        sqlx::query("DELETE FROM patients")
            .execute(&self.pool)
            .await?;

        debug!(count = removed.len(), "Registros de pacientes removidos");
        for record in removed {
            self.notify(ChangeKind::Deleted, record);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }
}

// ═══════════════════════════════════════════
// Implementação em memória (mock)
// ═══════════════════════════════════════════

/// Armazenamento em memória, equivalente ao mock sobre localStorage
///
/// Mantém a ordem de inserção com novos registros no topo. Expõe um contador
/// de gravações para os testes de coalescência do autosave.
pub struct MemoryStore {
    inner: Mutex<Vec<PatientRecord>>,
    events: broadcast::Sender<ChangeEvent>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Vec::new()),
            events,
            writes: AtomicUsize::new(0),
        }
    }

    /// Total de upserts executados desde a criação
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<PatientRecord>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::InternalError("Mutex do armazenamento envenenado".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatientStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<PatientRecord>, StoreError> {
        Ok(self.lock()?.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<PatientRecord>, StoreError> {
        Ok(self
            .lock()?
            .iter()
            .find(|r| !r.phone.is_empty() && r.phone == phone)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<PatientRecord>, StoreError> {
        Ok(self.lock()?.clone())
    }

    async fn upsert(&self, record: PatientRecord) -> Result<(), StoreError> {
        let kind = {
            let mut patients = self.lock()?;
            match patients.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => {
                    *slot = record.clone();
                    ChangeKind::Updated
                }
                None => {
                    patients.insert(0, record.clone());
                    ChangeKind::Created
                }
            }
        };

        self.writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(ChangeEvent { kind, record });
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let removed: Vec<PatientRecord> = self.lock()?.drain(..).collect();
        for record in removed {
            let _ = self.events.send(ChangeEvent {
                kind: ChangeKind::Deleted,
                record,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientStatus;
    use crate::{init_db_pool, DbConfig};
    use anyhow::Result;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn sample(id: &str, phone: &str) -> PatientRecord {
        let mut record = PatientRecord::empty(id);
        record.first_name = "Ana".to_string();
        record.last_name = "Souza".to_string();
        record.phone = phone.to_string();
        record
    }

    async fn sqlite_store() -> Result<(tempfile::TempDir, SqliteStore)> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("store.db");
        let config = DbConfig {
            db_path: db_path.to_string_lossy().to_string(),
            max_connections: 2,
        };
        let pool = init_db_pool(&config).await?;
        Ok((temp_dir, SqliteStore::new(pool)))
    }

    #[tokio::test]
    async fn test_sqlite_upsert_classifies_create_and_update() -> Result<()> {
        let (_guard, store) = sqlite_store().await?;
        let mut rx = store.subscribe();

        let mut record = sample("p-000000001", "0812345678");
        store.upsert(record.clone()).await?;
        assert_eq!(rx.recv().await?.kind, ChangeKind::Created);

        record.first_name = "Maria".to_string();
        record.status = PatientStatus::Filling;
        store.upsert(record.clone()).await?;
        let event = rx.recv().await?;
        assert_eq!(event.kind, ChangeKind::Updated);
        assert_eq!(event.record.first_name, "Maria");

        let loaded = store.get("p-000000001").await?.unwrap();
        assert_eq!(loaded.first_name, "Maria");
        assert_eq!(loaded.status, PatientStatus::Filling);
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_find_by_phone_ignores_empty_keys() -> Result<()> {
        let (_guard, store) = sqlite_store().await?;

        store.upsert(sample("a", "0812345678")).await?;
        store.upsert(sample("b", "")).await?;

        let found = store.find_by_phone("0812345678").await?.unwrap();
        assert_eq!(found.id, "a");

        // Telefone vazio nunca é chave de busca
        assert!(store.find_by_phone("").await?.is_none());
        assert!(store.find_by_phone("0899999999").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_list_orders_most_recent_first() -> Result<()> {
        let (_guard, store) = sqlite_store().await?;
        let now = Utc::now();

        let mut older = sample("velho", "0811111111");
        older.updated_at = now - Duration::seconds(60);
        let mut newer = sample("novo", "0822222222");
        newer.updated_at = now;

        store.upsert(older).await?;
        store.upsert(newer).await?;

        let listed = store.list().await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "novo");
        assert_eq!(listed[1].id, "velho");
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_delete_all_notifies_each_record() -> Result<()> {
        let (_guard, store) = sqlite_store().await?;
        store.upsert(sample("a", "0811111111")).await?;
        store.upsert(sample("b", "0822222222")).await?;

        let mut rx = store.subscribe();
        store.delete_all().await?;

        let mut deleted = vec![rx.recv().await?, rx.recv().await?];
        deleted.sort_by(|x, y| x.record.id.cmp(&y.record.id));
        assert!(deleted.iter().all(|e| e.kind == ChangeKind::Deleted));
        assert_eq!(deleted[0].record.id, "a");
        assert_eq!(deleted[1].record.id, "b");

        assert!(store.list().await?.is_empty());
        assert!(store.get("a").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_store_prepends_new_records() -> Result<()> {
        let store = MemoryStore::new();
        store.upsert(sample("primeiro", "0811111111")).await?;
        store.upsert(sample("segundo", "0822222222")).await?;

        let listed = store.list().await?;
        assert_eq!(listed[0].id, "segundo");
        assert_eq!(listed[1].id, "primeiro");
        assert_eq!(store.write_count(), 2);

        // Substituição integral mantém a posição
        let mut replacement = sample("primeiro", "0811111111");
        replacement.first_name = "Clara".to_string();
        store.upsert(replacement).await?;

        let listed = store.list().await?;
        assert_eq!(listed[1].first_name, "Clara");
        assert_eq!(store.write_count(), 3);
        Ok(())
    }
}
