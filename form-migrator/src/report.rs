//! Migration reporting and verification structures
//!
//! A [`MigrationReport`] follows one form through the reconciliation stages,
//! counting what was mapped, created and skipped, and collecting the
//! non-fatal errors and warnings the run produced.
//!
//! # Usage
//!
//! ```rust
//! use form_migrator::report::{ConditionCheck, ConditionCounts, MigrationReport, MigrationStage};
//!
//! let mut report = MigrationReport::new(360001, "source", "target");
//! report.advance(MigrationStage::FieldMappingBuilt);
//! report.record_field_created();
//! report.record_field_failure(42, "Region", "422 RecordInvalid".to_string());
//!
//! let check = ConditionCheck::compare(
//!     ConditionCounts { end_user: 2, agent: 1 },
//!     ConditionCounts { end_user: 2, agent: 1 },
//! );
//! assert!(!check.discrepancy);
//! report.complete();
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use helpdesk_client::TicketForm;

use crate::conditions::{ReferenceRole, UnresolvedReference};

/// Report for a single form migration run
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MigrationReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Source form being migrated
    pub form_id: u64,
    /// Source account label
    pub source_account: String,
    /// Target account label
    pub target_account: String,
    pub started_at: DateTime<Utc>,
    /// When the run finished (None while running)
    pub completed_at: Option<DateTime<Utc>>,
    /// Last stage reached
    pub stage: MigrationStage,
    pub counts: MigrationCounts,
    /// Non-fatal failures, plus the fatal one for a failed run
    pub errors: Vec<StageError>,
    pub warnings: Vec<MigrationWarning>,
    /// Form field ids that could not be translated
    pub missing_field_ids: Vec<u64>,
}

/// Reconciliation stages, in execution order
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    Start,
    FieldMappingBuilt,
    DependenciesResolved,
    ConditionsTransformed,
    FormCreated,
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStage::Start => "start",
            MigrationStage::FieldMappingBuilt => "field_mapping_built",
            MigrationStage::DependenciesResolved => "dependencies_resolved",
            MigrationStage::ConditionsTransformed => "conditions_transformed",
            MigrationStage::FormCreated => "form_created",
        };
        f.write_str(name)
    }
}

/// Counters for the run
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationCounts {
    /// Built-in fields mapped to themselves
    pub fields_builtin: u32,
    /// Custom fields matched by title
    pub fields_matched: u32,
    /// Fields created in the target
    pub fields_created: u32,
    /// Field creations that failed
    pub fields_failed: u32,
    /// Required ids unknown to the source account
    pub fields_skipped: u32,
    /// Custom object types already present in the target
    pub custom_objects_existing: u32,
    /// Custom object types created in the target
    pub custom_objects_created: u32,
    /// Custom object types that could not be made available
    pub custom_objects_failed: u32,
    /// Brands matched by name
    pub brands_mapped: u32,
}

/// A failure tied to a stage of the run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    pub phase: MigrationPhase,
    /// Field title, custom object key or form name, when known
    pub subject: Option<String>,
    pub message: String,
}

/// Part of the run an error belongs to
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Reading from either account
    Fetch,
    /// Matching fields and brands
    Mapping,
    /// Creating custom objects and fields
    Dependencies,
    /// Creating the form
    FormCreation,
}

/// Non-fatal observations collected during a run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationWarning {
    /// Custom field with no title match in the target
    UnmappedField { field_id: u64, title: String },
    /// Title shared by several fields; the first one was used
    DuplicateTitle { account: String, title: String },
    /// Lookup target could not be found or created
    CustomObjectUnavailable { key: String, field_id: u64 },
    /// Condition reference passed through untranslated
    UnresolvedReference(UnresolvedReference),
    /// Form field id with no mapping entry
    MissingFormField { field_id: u64 },
    /// Restricted brand with no counterpart in the target
    UnmappedBrand { brand_id: u64 },
    /// Created form reports a different number of conditions
    ConditionCountMismatch { original: usize, migrated: usize },
}

impl fmt::Display for MigrationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationWarning::UnmappedField { field_id, title } => {
                write!(f, "field '{}' ({}) not found in target", title, field_id)
            }
            MigrationWarning::DuplicateTitle { account, title } => {
                write!(f, "title '{}' is not unique in {}; first match used", title, account)
            }
            MigrationWarning::CustomObjectUnavailable { key, field_id } => write!(
                f,
                "custom object '{}' needed by field {} is unavailable in target",
                key, field_id
            ),
            MigrationWarning::UnresolvedReference(reference) => {
                let role = match reference.role {
                    ReferenceRole::ParentField => "parent_field_id",
                    ReferenceRole::ChildField => "child_field id",
                };
                write!(
                    f,
                    "{} {} in {} condition #{} kept untranslated",
                    role,
                    reference.field_id,
                    reference.scope,
                    reference.condition_index + 1
                )
            }
            MigrationWarning::MissingFormField { field_id } => {
                write!(f, "form field {} has no mapping", field_id)
            }
            MigrationWarning::UnmappedBrand { brand_id } => {
                write!(f, "brand {} has no counterpart in target", brand_id)
            }
            MigrationWarning::ConditionCountMismatch { original, migrated } => write!(
                f,
                "condition count mismatch: original={}, migrated={}",
                original, migrated
            ),
        }
    }
}

/// Condition totals of one form
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionCounts {
    pub end_user: usize,
    pub agent: usize,
}

impl ConditionCounts {
    pub fn of(form: &TicketForm) -> Self {
        Self {
            end_user: form.end_user_conditions.len(),
            agent: form.agent_conditions.len(),
        }
    }

    pub fn total(&self) -> usize {
        self.end_user + self.agent
    }
}

/// Original vs migrated condition totals
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionCheck {
    pub original: ConditionCounts,
    pub migrated: ConditionCounts,
    /// Totals differ
    pub discrepancy: bool,
}

impl ConditionCheck {
    pub fn compare(original: ConditionCounts, migrated: ConditionCounts) -> Self {
        Self {
            original,
            migrated,
            discrepancy: original.total() != migrated.total(),
        }
    }

    /// The original had conditions and none survived
    pub fn all_lost(&self) -> bool {
        self.original.total() > 0 && self.migrated.total() == 0
    }
}

impl MigrationReport {
    /// Create a report for migrating `form_id` between two accounts
    pub fn new(form_id: u64, source_account: &str, target_account: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            form_id,
            source_account: source_account.to_string(),
            target_account: target_account.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            stage: MigrationStage::Start,
            counts: MigrationCounts::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            missing_field_ids: Vec::new(),
        }
    }

    /// Move to the next stage; stages never go backwards
    pub fn advance(&mut self, stage: MigrationStage) {
        if stage > self.stage {
            debug!(run_id = %self.run_id, from = %self.stage, to = %stage, "Stage reached");
            self.stage = stage;
        }
    }

    pub fn record_field_created(&mut self) {
        self.counts.fields_created += 1;
    }

    pub fn record_field_skipped(&mut self) {
        self.counts.fields_skipped += 1;
    }

    pub fn record_field_failure(&mut self, field_id: u64, title: &str, message: String) {
        self.counts.fields_failed += 1;
        self.errors.push(StageError {
            phase: MigrationPhase::Dependencies,
            subject: Some(format!("{} ({})", title, field_id)),
            message,
        });
    }

    pub fn record_custom_object_existing(&mut self) {
        self.counts.custom_objects_existing += 1;
    }

    pub fn record_custom_object_created(&mut self) {
        self.counts.custom_objects_created += 1;
    }

    pub fn record_custom_object_failure(&mut self, key: &str, message: String) {
        self.counts.custom_objects_failed += 1;
        self.errors.push(StageError {
            phase: MigrationPhase::Dependencies,
            subject: Some(key.to_string()),
            message,
        });
    }

    /// Add an error for any phase
    pub fn add_error(&mut self, phase: MigrationPhase, subject: Option<String>, message: String) {
        self.errors.push(StageError {
            phase,
            subject,
            message,
        });
    }

    pub fn add_warning(&mut self, warning: MigrationWarning) {
        self.warnings.push(warning);
    }

    pub fn add_warnings(&mut self, warnings: impl IntoIterator<Item = MigrationWarning>) {
        self.warnings.extend(warnings);
    }

    /// Record the post-create condition comparison
    pub fn record_condition_check(&mut self, check: &ConditionCheck) {
        if check.discrepancy {
            warn!(
                original = check.original.total(),
                migrated = check.migrated.total(),
                "Condition count discrepancy"
            );
            self.add_warning(MigrationWarning::ConditionCountMismatch {
                original: check.original.total(),
                migrated: check.migrated.total(),
            });
        }
    }

    /// Mark the run as finished
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Every required field exists in the target and nothing failed
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.missing_field_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::ConditionScope;

    #[test]
    fn test_migration_report_basic() {
        let mut report = MigrationReport::new(10, "source", "target");

        report.record_field_created();
        report.record_field_created();
        report.record_field_skipped();
        report.record_field_failure(7, "Region", "422".to_string());
        report.record_custom_object_failure("asset", "not in source".to_string());

        assert_eq!(report.counts.fields_created, 2);
        assert_eq!(report.counts.fields_skipped, 1);
        assert_eq!(report.counts.fields_failed, 1);
        assert_eq!(report.counts.custom_objects_failed, 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].subject.as_deref(), Some("Region (7)"));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_stage_never_goes_backwards() {
        let mut report = MigrationReport::new(10, "source", "target");
        report.advance(MigrationStage::DependenciesResolved);
        report.advance(MigrationStage::FieldMappingBuilt);
        assert_eq!(report.stage, MigrationStage::DependenciesResolved);
    }

    #[test]
    fn test_condition_check_matching_counts() {
        let check = ConditionCheck::compare(
            ConditionCounts { end_user: 2, agent: 1 },
            ConditionCounts { end_user: 2, agent: 1 },
        );
        assert!(!check.discrepancy);
        assert!(!check.all_lost());

        let mut report = MigrationReport::new(10, "source", "target");
        report.record_condition_check(&check);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_condition_check_discrepancy_is_warning() {
        let check = ConditionCheck::compare(
            ConditionCounts { end_user: 2, agent: 1 },
            ConditionCounts { end_user: 0, agent: 1 },
        );
        assert!(check.discrepancy);

        let mut report = MigrationReport::new(10, "source", "target");
        report.record_condition_check(&check);
        assert_eq!(
            report.warnings,
            vec![MigrationWarning::ConditionCountMismatch { original: 3, migrated: 1 }]
        );
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_warning_serialization_is_tagged() {
        let warning = MigrationWarning::UnresolvedReference(UnresolvedReference {
            scope: ConditionScope::EndUser,
            condition_index: 0,
            role: ReferenceRole::ParentField,
            field_id: 5,
        });

        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "unresolved_reference");
        assert_eq!(json["field_id"], 5);
        assert_eq!(
            warning.to_string(),
            "parent_field_id 5 in end_user condition #1 kept untranslated"
        );
    }
}
