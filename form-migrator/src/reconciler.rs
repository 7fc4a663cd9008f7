//! Form reconciler.
//!
//! Drives one form through field mapping, dependency resolution, condition
//! transformation and form creation, and reports the result as a
//! [`MigrationOutcome`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use helpdesk_client::{HelpdeskStore, NewTicketForm, TicketForm};

use crate::builder::{plan_form, submit_form};
use crate::config::MigratorConfig;
use crate::error::MigrationError;
use crate::mapping::{build_brand_mapping, build_field_mapping, IdentifierMapping};
use crate::pacer::WritePacer;
use crate::report::{
    ConditionCheck, ConditionCounts, MigrationPhase, MigrationReport, MigrationStage,
    MigrationWarning,
};
use crate::resolver::DependencyResolver;

/// Which account an operation reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSide {
    Source,
    Target,
}

/// Result of one migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    Success {
        source_form: TicketForm,
        migrated_form: TicketForm,
        field_mappings: IdentifierMapping,
        conditions: ConditionCheck,
        report: MigrationReport,
    },
    Failed {
        error: String,
        /// Last stage completed before the failure
        failed_at: MigrationStage,
        /// Mapping as far as it got; can seed a retry
        field_mappings: IdentifierMapping,
        /// Form payload, when the failure happened on submit
        attempted_payload: Option<NewTicketForm>,
        report: MigrationReport,
    },
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MigrationOutcome::Success { .. })
    }

    pub fn report(&self) -> &MigrationReport {
        match self {
            MigrationOutcome::Success { report, .. } | MigrationOutcome::Failed { report, .. } => {
                report
            }
        }
    }

    pub fn field_mappings(&self) -> &IdentifierMapping {
        match self {
            MigrationOutcome::Success { field_mappings, .. }
            | MigrationOutcome::Failed { field_mappings, .. } => field_mappings,
        }
    }

    /// Take the mapping, e.g. to retry with [`FormReconciler::migrate_form_with_mapping`]
    pub fn into_field_mappings(self) -> IdentifierMapping {
        match self {
            MigrationOutcome::Success { field_mappings, .. }
            | MigrationOutcome::Failed { field_mappings, .. } => field_mappings,
        }
    }
}

/// Migrates ticket forms from a source account into a target account
pub struct FormReconciler {
    source: Arc<dyn HelpdeskStore>,
    target: Arc<dyn HelpdeskStore>,
    config: MigratorConfig,
    pacer: WritePacer,
}

/// What a successful run produced
struct Migrated {
    source_form: TicketForm,
    migrated_form: TicketForm,
    conditions: ConditionCheck,
}

impl FormReconciler {
    pub fn new(source: Arc<dyn HelpdeskStore>, target: Arc<dyn HelpdeskStore>) -> Self {
        Self::with_config(source, target, MigratorConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn HelpdeskStore>,
        target: Arc<dyn HelpdeskStore>,
        config: MigratorConfig,
    ) -> Self {
        let pacer = WritePacer::new(config.write_interval, config.write_burst);
        Self {
            source,
            target,
            config,
            pacer,
        }
    }

    fn store(&self, side: AccountSide) -> &dyn HelpdeskStore {
        match side {
            AccountSide::Source => self.source.as_ref(),
            AccountSide::Target => self.target.as_ref(),
        }
    }

    /// List every ticket form of one account
    pub async fn list_forms(&self, side: AccountSide) -> Result<Vec<TicketForm>, MigrationError> {
        let store = self.store(side);
        store
            .list_ticket_forms()
            .await
            .map_err(|e| MigrationError::listing("ticket forms", store.account(), e))
    }

    /// Migrate `form_id` from a fresh mapping
    pub async fn migrate_form(&self, form_id: u64) -> MigrationOutcome {
        self.migrate_form_with_mapping(form_id, IdentifierMapping::new())
            .await
    }

    /// Migrate `form_id`, starting from the entries of `prior`.
    ///
    /// Prior entries win over fresh title matches, so fields created by an
    /// earlier failed run are not created again.
    pub async fn migrate_form_with_mapping(
        &self,
        form_id: u64,
        prior: IdentifierMapping,
    ) -> MigrationOutcome {
        let mut report =
            MigrationReport::new(form_id, self.source.account(), self.target.account());
        let mut mapping = prior;
        let mut attempted_payload = None;

        info!(
            run_id = %report.run_id,
            form_id,
            source_account = %report.source_account,
            target_account = %report.target_account,
            prior_entries = mapping.len(),
            "Starting form migration"
        );

        let result = self
            .run(form_id, &mut mapping, &mut report, &mut attempted_payload)
            .await;
        report.complete();

        match result {
            Ok(migrated) => {
                info!(
                    form_id,
                    migrated_form_id = migrated.migrated_form.id,
                    created = report.counts.fields_created,
                    warnings = report.warnings.len(),
                    "Form migration complete"
                );
                MigrationOutcome::Success {
                    source_form: migrated.source_form,
                    migrated_form: migrated.migrated_form,
                    field_mappings: mapping,
                    conditions: migrated.conditions,
                    report,
                }
            }
            Err(e) => {
                error!(form_id, stage = %report.stage, error = %e, "Form migration failed");
                let (phase, subject) = match &e {
                    MigrationError::SourceForm { .. } | MigrationError::Listing { .. } => {
                        (MigrationPhase::Fetch, None)
                    }
                    MigrationError::AmbiguousTitle { .. } => (MigrationPhase::Mapping, None),
                    MigrationError::FormCreation { name, .. } => {
                        (MigrationPhase::FormCreation, Some(name.clone()))
                    }
                };
                report.add_error(phase, subject, e.to_string());

                MigrationOutcome::Failed {
                    error: e.to_string(),
                    failed_at: report.stage,
                    field_mappings: mapping,
                    attempted_payload,
                    report,
                }
            }
        }
    }

    async fn run(
        &self,
        form_id: u64,
        mapping: &mut IdentifierMapping,
        report: &mut MigrationReport,
        attempted_payload: &mut Option<NewTicketForm>,
    ) -> Result<Migrated, MigrationError> {
        let source = self.source.as_ref();
        let target = self.target.as_ref();

        let source_form = source
            .get_ticket_form(form_id)
            .await
            .map_err(|e| MigrationError::SourceForm { form_id, source: e })?;
        info!(
            form_id,
            name = %source_form.name,
            fields = source_form.ticket_field_ids.len(),
            conditions = source_form.condition_count(),
            "Source form loaded"
        );

        let source_fields = source
            .list_ticket_fields()
            .await
            .map_err(|e| MigrationError::listing("ticket fields", source.account(), e))?;
        let target_fields = target
            .list_ticket_fields()
            .await
            .map_err(|e| MigrationError::listing("ticket fields", target.account(), e))?;

        // START -> FIELD_MAPPING_BUILT
        let matched = build_field_mapping(
            &source_fields,
            &target_fields,
            &referenced_field_ids(&source_form),
            source.account(),
            target.account(),
            self.config.duplicate_titles,
        )?;
        mapping.extend_from(&matched.mapping);
        report.counts.fields_builtin = matched.builtin as u32;
        report.counts.fields_matched = matched.matched as u32;
        report.add_warnings(matched.warnings.into_iter().filter(|warning| match warning {
            MigrationWarning::UnmappedField { field_id, .. } => !mapping.contains(*field_id),
            _ => true,
        }));

        let brands = self.brand_mapping(&source_form).await?;
        report.counts.brands_mapped = brands.len() as u32;
        report.advance(MigrationStage::FieldMappingBuilt);

        // FIELD_MAPPING_BUILT -> DEPENDENCIES_RESOLVED
        DependencyResolver::new(source, target, &self.pacer)
            .with_gate(self.config.custom_object_gate)
            .with_rate_limit_retries(self.config.rate_limit_retries)
            .resolve(&source_form.ticket_field_ids, &source_fields, mapping, report)
            .await;
        report.advance(MigrationStage::DependenciesResolved);

        // DEPENDENCIES_RESOLVED -> CONDITIONS_TRANSFORMED
        let plan = plan_form(&source_form, mapping, &brands);
        report.missing_field_ids = plan.missing_field_ids.clone();
        report.add_warnings(plan.warnings());
        report.advance(MigrationStage::ConditionsTransformed);

        // CONDITIONS_TRANSFORMED -> FORM_CREATED
        *attempted_payload = Some(plan.payload.clone());
        let migrated_form =
            submit_form(target, &self.pacer, self.config.rate_limit_retries, &plan).await?;
        *attempted_payload = None;
        report.advance(MigrationStage::FormCreated);

        let conditions = ConditionCheck::compare(
            ConditionCounts::of(&source_form),
            ConditionCounts::of(&migrated_form),
        );
        report.record_condition_check(&conditions);

        Ok(Migrated {
            source_form,
            migrated_form,
            conditions,
        })
    }

    /// Brand mapping, fetched only when the form is restricted to brands
    async fn brand_mapping(
        &self,
        form: &TicketForm,
    ) -> Result<IdentifierMapping, MigrationError> {
        if form.in_all_brands.unwrap_or(true) || form.restricted_brand_ids.is_empty() {
            return Ok(IdentifierMapping::new());
        }

        let source = self.source.as_ref();
        let target = self.target.as_ref();
        let source_brands = source
            .list_brands()
            .await
            .map_err(|e| MigrationError::listing("brands", source.account(), e))?;
        let target_brands = target
            .list_brands()
            .await
            .map_err(|e| MigrationError::listing("brands", target.account(), e))?;

        let brands = build_brand_mapping(&source_brands, &target_brands);
        if brands.len() < form.restricted_brand_ids.len() {
            warn!(
                form_id = form.id,
                restricted = form.restricted_brand_ids.len(),
                mapped = brands.len(),
                "Not every restricted brand exists in target"
            );
        }
        Ok(brands)
    }
}

/// Field ids the form uses, in its field list or its conditions
fn referenced_field_ids(form: &TicketForm) -> Vec<u64> {
    let mut ids = form.ticket_field_ids.clone();
    for condition in form.end_user_conditions.iter().chain(&form.agent_conditions) {
        ids.extend(condition.parent_field_id);
        if let Some(children) = &condition.child_fields {
            ids.extend(children.iter().filter_map(|child| child.id));
        }
    }
    ids
}
