//! Formulário de registro do paciente
//!
//! Espelha o conjunto completo de campos do registro. Durante o autosave o
//! formulário é aceito incompleto; a validação só bloqueia o envio final.

use chrono::{DateTime, NaiveDate, Utc};
use registry_db::models::{Gender, PatientRecord, PatientStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Campos do formulário tal como chegam do cliente
///
/// Todos opcionais: um upsert de rascunho carrega o que o paciente já digitou.
/// Os atributos `required` valem apenas quando `validate()` é chamado, ou
/// seja, no envio final.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct RegistrationForm {
    #[validate(required(message = "Nome é obrigatório"), length(min = 1, message = "Nome é obrigatório"))]
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    #[validate(required(message = "Sobrenome é obrigatório"), length(min = 1, message = "Sobrenome é obrigatório"))]
    pub last_name: Option<String>,
    #[validate(required(message = "Data de nascimento é obrigatória"))]
    pub dob: Option<NaiveDate>,
    #[validate(required(message = "Gênero é obrigatório"))]
    pub gender: Option<Gender>,
    pub nationality: Option<String>,
    pub religion: Option<String>,
    pub pref_language: Option<String>,
    pub bloodtype: Option<String>,
    pub chronic_disease: Option<String>,
    pub allergies: Option<String>,
    #[validate(required(message = "Telefone é obrigatório"), length(min = 1, message = "Telefone é obrigatório"))]
    pub phone: Option<String>,
    #[validate(email(message = "E-mail inválido"))]
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_rel: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

impl RegistrationForm {
    /// População programática a partir de um registro existente (fluxo de edição)
    pub fn from_record(record: &PatientRecord) -> Self {
        Self {
            first_name: Some(record.first_name.clone()),
            middle_name: record.middle_name.clone(),
            last_name: Some(record.last_name.clone()),
            dob: record.dob,
            gender: record.gender,
            nationality: record.nationality.clone(),
            religion: record.religion.clone(),
            pref_language: record.pref_language.clone(),
            bloodtype: record.bloodtype.clone(),
            chronic_disease: record.chronic_disease.clone(),
            allergies: record.allergies.clone(),
            phone: Some(record.phone.clone()),
            email: record.email.clone(),
            address: record.address.clone(),
            emergency_contact_name: record.emergency_contact_name.clone(),
            emergency_contact_rel: record.emergency_contact_rel.clone(),
            emergency_contact_phone: record.emergency_contact_phone.clone(),
        }
    }

    /// Materializa o conjunto completo de campos conhecidos para gravação
    pub fn to_record(
        &self,
        id: &str,
        status: PatientStatus,
        updated_at: DateTime<Utc>,
    ) -> PatientRecord {
        PatientRecord {
            id: id.to_string(),
            first_name: self.first_name.clone().unwrap_or_default(),
            middle_name: self.middle_name.clone(),
            last_name: self.last_name.clone().unwrap_or_default(),
            dob: self.dob,
            gender: self.gender,
            nationality: self.nationality.clone(),
            religion: self.religion.clone(),
            pref_language: self.pref_language.clone(),
            bloodtype: self.bloodtype.clone(),
            chronic_disease: self.chronic_disease.clone(),
            allergies: self.allergies.clone(),
            phone: self.phone.clone().unwrap_or_default(),
            email: self.email.clone(),
            address: self.address.clone(),
            emergency_contact_name: self.emergency_contact_name.clone(),
            emergency_contact_rel: self.emergency_contact_rel.clone(),
            emergency_contact_phone: self.emergency_contact_phone.clone(),
            status,
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_form() -> RegistrationForm {
        RegistrationForm {
            first_name: Some("Ana".to_string()),
            last_name: Some("Souza".to_string()),
            dob: NaiveDate::from_ymd_opt(1990, 1, 1),
            gender: Some(Gender::Female),
            phone: Some("0812345678".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_form_passes_validation() {
        assert!(complete_form().validate().is_ok());
    }

    #[test]
    fn test_missing_required_fields_block_submission() {
        let mut form = complete_form();
        form.phone = None;
        form.dob = None;
        let errors = form.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("phone"));
        assert!(errors.field_errors().contains_key("dob"));
        assert!(!errors.field_errors().contains_key("first_name"));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut form = complete_form();
        form.first_name = Some(String::new());
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_record_round_trip_preserves_fields() {
        let form = complete_form();
        let record = form.to_record("p-000000001", PatientStatus::Filling, Utc::now());
        assert_eq!(record.first_name, "Ana");
        assert_eq!(record.status, PatientStatus::Filling);
        assert_eq!(RegistrationForm::from_record(&record), form);
    }
}
