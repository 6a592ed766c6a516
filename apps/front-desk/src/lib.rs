//! Front Desk - Serviço de auto-registro de pacientes e monitoramento ao vivo
//!
//! Um paciente preenche o formulário de registro (dados pessoais, médicos, de
//! contato e de emergência) com autosave; a equipe acompanha em um painel ao
//! vivo o progresso de preenchimento de cada paciente e abre o detalhe de
//! qualquer registro.

pub mod error;
pub mod form;
pub mod roster;
pub mod routes;
pub mod session;
pub mod state;
pub mod sync;
