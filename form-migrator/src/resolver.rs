//! Dependency resolver.
//!
//! Creates the fields a form needs that the target account lacks, making
//! sure a lookup field's custom object type exists first. Failures are
//! recorded on the report and never stop the batch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use helpdesk_client::{HelpdeskStore, NewCustomObject, NewTicketField, TicketField};

use crate::mapping::IdentifierMapping;
use crate::pacer::WritePacer;
use crate::report::{MigrationPhase, MigrationReport, MigrationWarning};

/// How a lookup field is treated when its custom object is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomObjectGate {
    /// Create the field anyway and let the remote decide
    #[default]
    BestEffort,
    /// Skip the field and record a failure
    Required,
}

/// Creates missing fields in the target account
pub struct DependencyResolver<'a> {
    source: &'a dyn HelpdeskStore,
    target: &'a dyn HelpdeskStore,
    pacer: &'a WritePacer,
    gate: CustomObjectGate,
    rate_limit_retries: u32,
    /// Custom object key -> available in target
    objects: HashMap<String, bool>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        source: &'a dyn HelpdeskStore,
        target: &'a dyn HelpdeskStore,
        pacer: &'a WritePacer,
    ) -> Self {
        Self {
            source,
            target,
            pacer,
            gate: CustomObjectGate::default(),
            rate_limit_retries: 1,
            objects: HashMap::new(),
        }
    }

    pub fn with_gate(mut self, gate: CustomObjectGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    /// Make every id in `required_ids` resolvable through `mapping`.
    ///
    /// Ids already mapped are left alone. Ids unknown to `source_fields` are
    /// skipped. Returns the number of fields created.
    pub async fn resolve(
        &mut self,
        required_ids: &[u64],
        source_fields: &[TicketField],
        mapping: &mut IdentifierMapping,
        report: &mut MigrationReport,
    ) -> usize {
        let index: HashMap<u64, &TicketField> =
            source_fields.iter().map(|field| (field.id, field)).collect();

        let mut created = 0;
        for &field_id in required_ids {
            if mapping.contains(field_id) {
                continue;
            }

            let Some(field) = index.get(&field_id).copied() else {
                warn!(field_id, "Required field not found in source account, skipping");
                report.record_field_skipped();
                continue;
            };

            if let Some(key) = field.custom_object_key() {
                if !self.ensure_custom_object(key, report).await {
                    report.add_warning(MigrationWarning::CustomObjectUnavailable {
                        key: key.to_string(),
                        field_id,
                    });
                    if self.gate == CustomObjectGate::Required {
                        warn!(field_id, key, "Custom object unavailable, skipping lookup field");
                        report.record_field_failure(
                            field_id,
                            &field.title,
                            format!("custom object '{}' unavailable in target", key),
                        );
                        continue;
                    }
                }
            }

            if self.create_field(field, mapping, report).await {
                created += 1;
            }
        }

        info!(
            required = required_ids.len(),
            created,
            failed = report.counts.fields_failed,
            "Dependencies resolved"
        );
        created
    }

    async fn create_field(
        &self,
        field: &TicketField,
        mapping: &mut IdentifierMapping,
        report: &mut MigrationReport,
    ) -> bool {
        let payload = NewTicketField::from_source(field);
        debug!(field_id = field.id, title = %field.title, "Creating field in target");

        let result = self
            .pacer
            .write(self.rate_limit_retries, || self.target.create_ticket_field(&payload))
            .await;

        match result {
            Ok(created) => {
                info!(
                    title = %field.title,
                    source_id = field.id,
                    target_id = created.id,
                    "Field created"
                );
                mapping.record(field.id, created.id);
                report.record_field_created();
                true
            }
            Err(e) => {
                error!(title = %field.title, field_id = field.id, error = %e, "Failed to create field");
                report.record_field_failure(field.id, &field.title, e.to_string());
                false
            }
        }
    }

    /// Make sure the custom object type `key` exists in the target.
    ///
    /// Returns whether it is available. Answers are cached per run.
    async fn ensure_custom_object(&mut self, key: &str, report: &mut MigrationReport) -> bool {
        if let Some(&available) = self.objects.get(key) {
            return available;
        }

        let available = self.lookup_or_create(key, report).await;
        self.objects.insert(key.to_string(), available);
        available
    }

    async fn lookup_or_create(&self, key: &str, report: &mut MigrationReport) -> bool {
        match self.target.find_custom_object(key).await {
            Ok(Some(_)) => {
                debug!(key, "Custom object already present in target");
                report.record_custom_object_existing();
                return true;
            }
            Ok(None) => {}
            Err(e) => {
                error!(key, error = %e, "Failed to look up custom object in target");
                report.add_error(
                    MigrationPhase::Fetch,
                    Some(key.to_string()),
                    format!("custom object lookup in target failed: {}", e),
                );
                report.counts.custom_objects_failed += 1;
                return false;
            }
        }

        let definition = match self.source.find_custom_object(key).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                warn!(key, "Custom object not found in source, cannot migrate it");
                report.record_custom_object_failure(key, "not found in source account".to_string());
                return false;
            }
            Err(e) => {
                error!(key, error = %e, "Failed to look up custom object in source");
                report.add_error(
                    MigrationPhase::Fetch,
                    Some(key.to_string()),
                    format!("custom object lookup in source failed: {}", e),
                );
                report.counts.custom_objects_failed += 1;
                return false;
            }
        };

        let payload = NewCustomObject::from(&definition);
        let result = self
            .pacer
            .write(self.rate_limit_retries, || self.target.create_custom_object(&payload))
            .await;

        match result {
            Ok(created) => {
                info!(key = %created.key, title = %created.title, "Custom object created");
                report.record_custom_object_created();
                true
            }
            Err(e) => {
                error!(key, error = %e, "Failed to create custom object");
                report.record_custom_object_failure(key, e.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_client::{CustomObject, MemoryStore, WriteOp};

    fn asset() -> CustomObject {
        CustomObject {
            key: "asset".to_string(),
            title: "Asset".to_string(),
            title_pluralized: "Assets".to_string(),
            description: Some("Company hardware".to_string()),
        }
    }

    fn lookup(id: u64, title: &str, key: &str) -> TicketField {
        TicketField::new(id, title, "lookup")
            .with_relationship_target(format!("zen:custom_object:{}", key))
    }

    #[tokio::test]
    async fn test_creates_missing_fields_and_extends_mapping() {
        let source = MemoryStore::new("source");
        let target = MemoryStore::new("target").with_next_id(900);
        let pacer = WritePacer::unlimited();
        let fields = vec![TicketField::new(8, "Warranty", "checkbox")];
        let mut mapping = IdentifierMapping::new();
        let mut report = MigrationReport::new(1, "source", "target");

        let created = DependencyResolver::new(&source, &target, &pacer)
            .resolve(&[8], &fields, &mut mapping, &mut report)
            .await;

        assert_eq!(created, 1);
        assert_eq!(mapping.get(8), Some(900));
        assert_eq!(report.counts.fields_created, 1);
    }

    #[tokio::test]
    async fn test_already_mapped_and_unknown_ids_are_skipped() {
        let source = MemoryStore::new("source");
        let target = MemoryStore::new("target");
        let pacer = WritePacer::unlimited();
        let mut mapping: IdentifierMapping = [(1, 101)].into_iter().collect();
        let mut report = MigrationReport::new(1, "source", "target");

        let created = DependencyResolver::new(&source, &target, &pacer)
            .resolve(&[1, 42], &[], &mut mapping, &mut report)
            .await;

        assert_eq!(created, 0);
        assert!(target.writes().is_empty());
        assert_eq!(report.counts.fields_skipped, 1);
        assert!(!mapping.contains(42));
    }

    #[tokio::test]
    async fn test_custom_object_created_before_lookup_field() {
        let source = MemoryStore::new("source").with_custom_objects([asset()]);
        let target = MemoryStore::new("target");
        let pacer = WritePacer::unlimited();
        let fields = vec![lookup(12, "Laptop", "asset"), lookup(13, "Monitor", "asset")];
        let mut mapping = IdentifierMapping::new();
        let mut report = MigrationReport::new(1, "source", "target");

        DependencyResolver::new(&source, &target, &pacer)
            .resolve(&[12, 13], &fields, &mut mapping, &mut report)
            .await;

        assert_eq!(
            target.writes(),
            vec![
                WriteOp::CustomObject("asset".to_string()),
                WriteOp::TicketField("Laptop".to_string()),
                WriteOp::TicketField("Monitor".to_string()),
            ]
        );
        assert_eq!(report.counts.custom_objects_created, 1);
        assert_eq!(
            target.custom_objects()[0].description.as_deref(),
            Some("Company hardware")
        );
    }

    #[tokio::test]
    async fn test_existing_custom_object_is_reused() {
        let source = MemoryStore::new("source");
        let target = MemoryStore::new("target").with_custom_objects([asset()]);
        let pacer = WritePacer::unlimited();
        let fields = vec![lookup(12, "Laptop", "asset")];
        let mut mapping = IdentifierMapping::new();
        let mut report = MigrationReport::new(1, "source", "target");

        DependencyResolver::new(&source, &target, &pacer)
            .resolve(&[12], &fields, &mut mapping, &mut report)
            .await;

        assert_eq!(target.writes(), vec![WriteOp::TicketField("Laptop".to_string())]);
        assert_eq!(report.counts.custom_objects_existing, 1);
    }

    #[tokio::test]
    async fn test_missing_custom_object_best_effort_still_creates_field() {
        let source = MemoryStore::new("source");
        let target = MemoryStore::new("target");
        let pacer = WritePacer::unlimited();
        let fields = vec![lookup(12, "Laptop", "asset")];
        let mut mapping = IdentifierMapping::new();
        let mut report = MigrationReport::new(1, "source", "target");

        DependencyResolver::new(&source, &target, &pacer)
            .resolve(&[12], &fields, &mut mapping, &mut report)
            .await;

        assert!(mapping.contains(12));
        assert_eq!(report.counts.custom_objects_failed, 1);
        assert!(report.warnings.contains(&MigrationWarning::CustomObjectUnavailable {
            key: "asset".to_string(),
            field_id: 12,
        }));
    }

    #[tokio::test]
    async fn test_missing_custom_object_required_gate_skips_field() {
        let source = MemoryStore::new("source");
        let target = MemoryStore::new("target");
        let pacer = WritePacer::unlimited();
        let fields = vec![lookup(12, "Laptop", "asset")];
        let mut mapping = IdentifierMapping::new();
        let mut report = MigrationReport::new(1, "source", "target");

        DependencyResolver::new(&source, &target, &pacer)
            .with_gate(CustomObjectGate::Required)
            .resolve(&[12], &fields, &mut mapping, &mut report)
            .await;

        assert!(!mapping.contains(12));
        assert!(target.writes().is_empty());
        assert_eq!(report.counts.fields_failed, 1);
    }

    #[tokio::test]
    async fn test_field_failure_does_not_stop_batch() {
        let source = MemoryStore::new("source");
        let target = MemoryStore::new("target").failing_field("Broken");
        let pacer = WritePacer::unlimited();
        let fields = vec![
            TicketField::new(7, "Broken", "text"),
            TicketField::new(8, "Warranty", "checkbox"),
        ];
        let mut mapping = IdentifierMapping::new();
        let mut report = MigrationReport::new(1, "source", "target");

        let created = DependencyResolver::new(&source, &target, &pacer)
            .resolve(&[7, 8], &fields, &mut mapping, &mut report)
            .await;

        assert_eq!(created, 1);
        assert!(!mapping.contains(7));
        assert!(mapping.contains(8));
        assert_eq!(report.counts.fields_failed, 1);
        assert_eq!(report.errors[0].phase, MigrationPhase::Dependencies);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_field_is_retried() {
        let source = MemoryStore::new("source");
        let target = MemoryStore::new("target").rate_limited_field("Busy", 1);
        let pacer = WritePacer::unlimited();
        let fields = vec![TicketField::new(9, "Busy", "text")];
        let mut mapping = IdentifierMapping::new();
        let mut report = MigrationReport::new(1, "source", "target");

        DependencyResolver::new(&source, &target, &pacer)
            .with_rate_limit_retries(1)
            .resolve(&[9], &fields, &mut mapping, &mut report)
            .await;

        assert!(mapping.contains(9));
        assert_eq!(report.counts.fields_failed, 0);
    }
}
