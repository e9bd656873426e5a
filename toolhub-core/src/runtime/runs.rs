// toolhub-core/src/runtime/runs.rs
// ============================================================================
// Module: ToolHub Run Registry
// Description: Creation and resolution of run contexts.
// Purpose: Provide the unit of correlation every other record references.
// Dependencies: chrono, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runs are created explicitly, never mutated, and never deleted. Every
//! artifact, tool call, step, decision, and approval references an existing
//! run by identifier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use chrono::Utc;

use crate::core::errors::DomainError;
use crate::core::identifiers::RepoName;
use crate::core::identifiers::RunId;
use crate::core::records::RunRecord;
use crate::interfaces::AuditStore;

// ============================================================================
// SECTION: Run Service
// ============================================================================

/// Manages the lifecycle of runs.
#[derive(Clone)]
pub struct RunService {
    /// Backing audit store.
    store: Arc<dyn AuditStore>,
}

impl RunService {
    /// Creates a run service backed by the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
        }
    }

    /// Creates and persists a new run.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] for blank fields and
    /// [`DomainError::Internal`] when the insert fails.
    pub fn create_run(&self, repo: &str, purpose: &str) -> Result<RunRecord, DomainError> {
        if repo.trim().is_empty() {
            return Err(DomainError::Validation("repo is required".to_string()));
        }
        if purpose.trim().is_empty() {
            return Err(DomainError::Validation("purpose is required".to_string()));
        }
        let run = RunRecord {
            run_id: RunId::generate(),
            repo: RepoName::new(repo),
            purpose: purpose.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_run(&run)?;
        Ok(run)
    }

    /// Loads a run by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Internal`] when the query fails.
    pub fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>, DomainError> {
        Ok(self.store.get_run(run_id)?)
    }

    /// Resolves a run or fails with `run_not_found`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::RunNotFound`] when the run does not exist.
    pub fn require_run(&self, run_id: &RunId) -> Result<RunRecord, DomainError> {
        self.get_run(run_id)?.ok_or(DomainError::RunNotFound)
    }

    /// Lists runs, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Internal`] when the query fails.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, DomainError> {
        let limit = if limit == 0 { 50 } else { limit };
        Ok(self.store.list_runs(limit)?)
    }
}
