// toolhub-core/src/core/mod.rs
// ============================================================================
// Module: ToolHub Core Types
// Description: Domain types and pure logic for the ToolHub pipeline.
// Purpose: Group identifiers, policy, hashing, and audit record types.
// Dependencies: crate submodules
// ============================================================================

//! ## Overview
//! The core module holds the durable record types and the pure decision logic
//! (policy, idempotency keys, batch status, error mapping) that the runtime
//! engines and transports build on. Nothing here performs I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod batch;
pub mod envelope;
pub mod errors;
pub mod hashing;
pub mod identifiers;
pub mod idempotency;
pub mod patch;
pub mod policy;
pub mod profile;
pub mod qa;
pub mod records;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use batch::BatchMode;
pub use batch::BatchStatus;
pub use batch::derive_batch_status;
pub use envelope::QaArtifactRefs;
pub use envelope::ToolCallError;
pub use envelope::ToolEnvelope;
pub use envelope::ToolMeta;
pub use errors::DomainError;
pub use errors::ErrorInfo;
pub use errors::map_error;
pub use identifiers::ApprovalId;
pub use identifiers::ArtifactId;
pub use identifiers::DecisionId;
pub use identifiers::RepoName;
pub use identifiers::RunId;
pub use identifiers::StepId;
pub use identifiers::ToolCallId;
pub use idempotency::IssueValidationError;
pub use idempotency::MAX_BATCH_SIZE;
pub use idempotency::make_issue_key;
pub use idempotency::make_pr_comment_key;
pub use idempotency::validate_issue_input;
pub use patch::count_content_lines;
pub use patch::generate_unified_diff;
pub use policy::Policy;
pub use policy::PolicyError;
pub use policy::PolicyViolation;
pub use policy::PolicyViolationCode;
pub use profile::ProfileDefaults;
pub use profile::ProfileError;
pub use profile::load_profile;
pub use qa::QaError;
pub use qa::QaErrorCode;
pub use qa::QaKind;
pub use qa::QaReport;
pub use qa::QaStatus;
pub use qa::derive_qa_failure_category;
pub use qa::derive_qa_status;
pub use qa::qa_status_metric_label;
pub use records::ApprovalRecord;
pub use records::ApprovalStatus;
pub use records::ArtifactRecord;
pub use records::CallStatus;
pub use records::DecisionRecord;
pub use records::RunRecord;
pub use records::StepRecord;
pub use records::StepStatus;
pub use records::ToolCallRecord;

/// Version of the public tool contract reported by both transports.
pub const CONTRACT_VERSION: &str = "v1";
