//! Sistema de migrações para banco de dados
//!
//! Este módulo gerencia as migrações do banco de dados SQLite

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
const MIGRATIONS: &[&str] = &[
    // 001_patients.sql
    r#"
    -- Tabela de pacientes: uma linha por sessão de registro.
    -- Toda gravação substitui a linha inteira (upsert integral).
    CREATE TABLE IF NOT EXISTS patients (
        id TEXT PRIMARY KEY NOT NULL,
        first_name TEXT NOT NULL DEFAULT '',
        middle_name TEXT,
        last_name TEXT NOT NULL DEFAULT '',
        dob DATE,
        gender TEXT CHECK (gender IS NULL OR gender IN ('male', 'female', 'other')),
        nationality TEXT,
        religion TEXT,
        pref_language TEXT,
        bloodtype TEXT,
        chronic_disease TEXT,
        allergies TEXT,
        phone TEXT NOT NULL DEFAULT '',
        email TEXT,
        address TEXT,
        emergency_contact_name TEXT,
        emergency_contact_rel TEXT,
        emergency_contact_phone TEXT,
        status TEXT NOT NULL CHECK (status IN ('inactive', 'filling', 'submitted')),
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- Telefone é chave de busca, única apenas entre valores preenchidos
    -- (várias sessões em andamento podem ainda não ter telefone)
    CREATE UNIQUE INDEX IF NOT EXISTS idx_patients_phone
        ON patients (phone) WHERE phone <> '';

    -- Índices para otimização
    CREATE INDEX IF NOT EXISTS idx_patients_status ON patients (status);
    CREATE INDEX IF NOT EXISTS idx_patients_updated_at ON patients (updated_at);
    "#,
];

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    // Obter a versão atual do banco de dados
    let mut version: i64 = 0;
    match sqlx::query_scalar("PRAGMA user_version").fetch_one(pool).await {
        Ok(v) => version = v,
        Err(e) => {
            error!("Erro ao obter versão do banco: {}", e);
            // Continuar mesmo assim, pois pode ser a primeira execução
        }
    }

    info!("Versão atual do banco: {}", version);

    // Aplicar cada migração pendente sequencialmente
    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        // Pular migrações já aplicadas
        if migration_version <= version {
            info!("Migração {} já aplicada", migration_version);
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        // Executar em uma transação para garantir atomicidade
        let mut transaction = pool.begin().await.context(format!(
            "Falha ao iniciar transação para migração {}",
            migration_version
        ))?;

        // Executar os comandos SQL
        sqlx::query(migration_sql)
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao executar migração {}", migration_version))?;

        // Atualizar versão do banco
        sqlx::query(&format!("PRAGMA user_version = {}", migration_version))
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao atualizar versão para {}", migration_version))?;

        // Commit da transação
        transaction.commit().await.context(format!(
            "Falha ao confirmar transação para migração {}",
            migration_version
        ))?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", MIGRATIONS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::SqlitePool;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations() -> Result<()> {
        // Usar diretório temporário para testes
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migrations.db");

        // Conectar
        let conn_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(conn_options).await?;

        // Aplicar migrações
        run_migrations(&pool).await?;

        // Verificar versão do banco
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await?;

        assert_eq!(version, MIGRATIONS.len() as i64);

        // Verificar se tabelas foram criadas
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&pool)
        .await?;

        assert!(tables.contains(&"patients".to_string()));

        // Reaplicar deve ser idempotente
        run_migrations(&pool).await?;

        Ok(())
    }
}
