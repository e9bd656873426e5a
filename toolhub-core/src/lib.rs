// toolhub-core/src/lib.rs
// ============================================================================
// Module: ToolHub Core Library
// Description: Public API surface for the ToolHub core.
// Purpose: Expose domain types, collaborator interfaces, and runtime engines.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! ToolHub core implements the invariant execution pipeline that wraps every
//! tool call: policy check, tool execution, artifact persistence, and audit
//! record. It is transport-agnostic and integrates with the code forge, the
//! QA runner, and the git runner through explicit interfaces rather than
//! embedding those collaborators.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AuditStore;
pub use interfaces::CodeChangeRequest;
pub use interfaces::CodeChangeResult;
pub use interfaces::CodeOpsError;
pub use interfaces::CodeRunner;
pub use interfaces::CreateIssueInput;
pub use interfaces::CreatePullRequestInput;
pub use interfaces::FileChange;
pub use interfaces::ForgeClient;
pub use interfaces::ForgeError;
pub use interfaces::Issue;
pub use interfaces::PrComment;
pub use interfaces::PullRequest;
pub use interfaces::PullRequestFile;
pub use interfaces::QaExecutor;
pub use interfaces::QaOutcome;
pub use interfaces::StoreError;
pub use interfaces::ToolCallFilter;
pub use runtime::ArtifactStore;
pub use runtime::ArtifactStoreError;
pub use runtime::AuditError;
pub use runtime::AuditService;
pub use runtime::BatchItemResult;
pub use runtime::BatchRequest;
pub use runtime::BatchResponse;
pub use runtime::ExtraArtifact;
pub use runtime::InMemoryAuditStore;
pub use runtime::IssueInput;
pub use runtime::RecordInput;
pub use runtime::RepairLoopEngine;
pub use runtime::RepairLoopRequest;
pub use runtime::RepairOutcome;
pub use runtime::RunService;
pub use runtime::process_issue_batch;
