//! Modelos de dados compartilhados entre aplicações
//!
//! Este módulo define as estruturas principais do registro de pacientes

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Status de preenchimento de um registro de paciente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    /// Sessão sem edições pendentes (inicial ou após pausa de digitação)
    Inactive,
    /// Paciente digitando no formulário neste momento
    Filling,
    /// Formulário enviado — estado terminal
    Submitted,
}

impl PatientStatus {
    /// Código canônico gravado no banco de dados
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientStatus::Inactive => "inactive",
            PatientStatus::Filling => "filling",
            PatientStatus::Submitted => "submitted",
        }
    }

    /// Decodifica o código vindo do banco; valores desconhecidos são erro
    pub fn from_code(code: &str) -> Result<Self, String> {
        match code {
            "inactive" => Ok(PatientStatus::Inactive),
            "filling" => Ok(PatientStatus::Filling),
            "submitted" => Ok(PatientStatus::Submitted),
            other => Err(format!("Valor de status inválido: {}", other)),
        }
    }
}

impl std::fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gênero do paciente, armazenado como código enumerado
///
/// A conversão para texto localizado acontece na borda (UI), nunca no banco.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, String> {
        match code {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            unknown => Err(format!("Valor de gênero inválido: {}", unknown)),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registro completo de um paciente
///
/// Cada gravação carrega o conjunto completo de campos conhecidos (upsert
/// integral), nunca um diff parcial. O `id` é um token interno estável; o
/// telefone é apenas chave de busca e pode ser editado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Identificador interno único (token de sessão ou UUID)
    pub id: String,
    /// Nome — pode ficar vazio enquanto o formulário está sendo preenchido
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    /// Data de nascimento, obrigatória apenas no envio final
    pub dob: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub nationality: Option<String>,
    pub religion: Option<String>,
    pub pref_language: Option<String>,
    pub bloodtype: Option<String>,
    /// Doenças crônicas — dado sensível, exibido com destaque
    pub chronic_disease: Option<String>,
    /// Alergias (medicamentos/alimentos/químicos) — dado sensível
    pub allergies: Option<String>,
    /// Telefone — chave de busca única entre valores não vazios
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_rel: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub status: PatientStatus,
    /// Atualizado a cada gravação
    pub updated_at: DateTime<Utc>,
}

impl PatientRecord {
    /// Registro vazio recém-criado para uma sessão de formulário
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: String::new(),
            middle_name: None,
            last_name: String::new(),
            dob: None,
            gender: None,
            nationality: None,
            religion: None,
            pref_language: None,
            bloodtype: None,
            chronic_disease: None,
            allergies: None,
            phone: String::new(),
            email: None,
            address: None,
            emergency_contact_name: None,
            emergency_contact_rel: None,
            emergency_contact_phone: None,
            status: PatientStatus::Inactive,
            updated_at: Utc::now(),
        }
    }

    /// Nome completo para exibição no painel
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Indica se o cartão do paciente deve exibir alerta médico
    pub fn has_medical_alert(&self) -> bool {
        self.chronic_disease.as_deref().is_some_and(|v| !v.is_empty())
            || self.allergies.as_deref().is_some_and(|v| !v.is_empty())
    }
}

impl FromRow<'_, SqliteRow> for PatientRecord {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        let status = PatientStatus::from_code(&status).map_err(|msg| sqlx::Error::ColumnDecode {
            index: String::from("status"),
            source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
        })?;

        let gender = row
            .try_get::<Option<String>, _>("gender")?
            .map(|code| {
                Gender::from_code(&code).map_err(|msg| sqlx::Error::ColumnDecode {
                    index: String::from("gender"),
                    source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
                })
            })
            .transpose()?;

        Ok(Self {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            middle_name: row.try_get("middle_name")?,
            last_name: row.try_get("last_name")?,
            dob: row.try_get("dob")?,
            gender,
            nationality: row.try_get("nationality")?,
            religion: row.try_get("religion")?,
            pref_language: row.try_get("pref_language")?,
            bloodtype: row.try_get("bloodtype")?,
            chronic_disease: row.try_get("chronic_disease")?,
            allergies: row.try_get("allergies")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            address: row.try_get("address")?,
            emergency_contact_name: row.try_get("emergency_contact_name")?,
            emergency_contact_rel: row.try_get("emergency_contact_rel")?,
            emergency_contact_phone: row.try_get("emergency_contact_phone")?,
            status,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Tipo de mudança notificada pelo armazenamento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evento entregue aos assinantes do canal de mudanças
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: PatientRecord,
}
