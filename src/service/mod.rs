//! Lifecycle Services
//!
//! The orchestration layer that keeps the relational store and the object
//! vault coherent without a shared transaction coordinator: ordering
//! discipline on create, compensation on partial failure, reconciliation
//! at list time. Control flows downward only; neither store calls back
//! into this layer.

pub mod case_service;
pub mod evidence_service;

pub use case_service::{CaseService, NewCaseParams};
pub use evidence_service::{EvidenceService, NewEvidenceParams};
