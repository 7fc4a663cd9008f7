//! Form builder.
//!
//! Turns a source form into a create payload for the target account and
//! submits it.

use tracing::{debug, error, info, warn};

use helpdesk_client::{HelpdeskStore, NewTicketForm, TicketForm};

use crate::conditions::{transform_conditions, ConditionScope, UnresolvedReference};
use crate::error::MigrationError;
use crate::mapping::{IdentifierMapping, Resolution};
use crate::pacer::WritePacer;
use crate::report::MigrationWarning;

/// A form payload ready to submit, plus what could not be translated
#[derive(Debug, Clone)]
pub struct FormPlan {
    pub payload: NewTicketForm,
    /// Field ids with no mapping entry, kept untranslated in the payload
    pub missing_field_ids: Vec<u64>,
    /// Condition references that passed through untranslated
    pub unresolved: Vec<UnresolvedReference>,
    /// Restricted brands dropped for lack of a target counterpart
    pub unmapped_brand_ids: Vec<u64>,
}

impl FormPlan {
    /// Warnings describing everything the plan could not translate
    pub fn warnings(&self) -> Vec<MigrationWarning> {
        self.missing_field_ids
            .iter()
            .map(|&field_id| MigrationWarning::MissingFormField { field_id })
            .chain(
                self.unresolved
                    .iter()
                    .cloned()
                    .map(MigrationWarning::UnresolvedReference),
            )
            .chain(
                self.unmapped_brand_ids
                    .iter()
                    .map(|&brand_id| MigrationWarning::UnmappedBrand { brand_id }),
            )
            .collect()
    }
}

/// Build the target payload for `form`.
///
/// Never fails: untranslatable ids are collected on the plan.
pub fn plan_form(
    form: &TicketForm,
    fields: &IdentifierMapping,
    brands: &IdentifierMapping,
) -> FormPlan {
    let mut missing_field_ids = Vec::new();
    let ticket_field_ids = form
        .ticket_field_ids
        .iter()
        .map(|&id| match fields.resolve(id) {
            Resolution::Resolved(target) => target,
            Resolution::Unresolved(original) => {
                warn!(form_id = form.id, field_id = original, "Form field has no mapping");
                missing_field_ids.push(original);
                original
            }
        })
        .collect();

    let end_user = transform_conditions(&form.end_user_conditions, fields, ConditionScope::EndUser);
    let agent = transform_conditions(&form.agent_conditions, fields, ConditionScope::Agent);

    let in_all_brands = form.in_all_brands.unwrap_or(true);
    let mut unmapped_brand_ids = Vec::new();
    let restricted_brand_ids = if in_all_brands {
        Vec::new()
    } else {
        form.restricted_brand_ids
            .iter()
            .filter_map(|&id| match brands.resolve(id) {
                Resolution::Resolved(target) => Some(target),
                Resolution::Unresolved(original) => {
                    warn!(form_id = form.id, brand_id = original, "Brand not found in target, dropping");
                    unmapped_brand_ids.push(original);
                    None
                }
            })
            .collect()
    };

    let payload = NewTicketForm {
        name: form.name.clone(),
        display_name: form.display_name.clone().unwrap_or_else(|| form.name.clone()),
        position: form.position.unwrap_or(0),
        active: form.active.unwrap_or(true),
        end_user_visible: form.end_user_visible.unwrap_or(true),
        default: form.default.unwrap_or(false),
        ticket_field_ids,
        in_all_brands,
        restricted_brand_ids,
        end_user_conditions: end_user.conditions,
        agent_conditions: agent.conditions,
    };

    let mut unresolved = end_user.unresolved;
    unresolved.extend(agent.unresolved);

    FormPlan {
        payload,
        missing_field_ids,
        unresolved,
        unmapped_brand_ids,
    }
}

/// Create the planned form in `target`.
///
/// On failure the full payload is logged before the error is returned.
pub async fn submit_form(
    target: &dyn HelpdeskStore,
    pacer: &WritePacer,
    rate_limit_retries: u32,
    plan: &FormPlan,
) -> Result<TicketForm, MigrationError> {
    let payload = &plan.payload;
    debug!(
        name = %payload.name,
        fields = payload.ticket_field_ids.len(),
        end_user_conditions = payload.end_user_conditions.len(),
        agent_conditions = payload.agent_conditions.len(),
        "Submitting form"
    );

    match pacer
        .write(rate_limit_retries, || target.create_ticket_form(payload))
        .await
    {
        Ok(created) => {
            info!(name = %created.name, form_id = created.id, "Form created");
            Ok(created)
        }
        Err(e) => {
            let dump = serde_json::to_string_pretty(payload)
                .unwrap_or_else(|_| format!("{:?}", payload));
            error!(name = %payload.name, error = %e, "Failed to create form");
            error!("Attempted form payload:\n{}", dump);
            Err(MigrationError::FormCreation {
                name: payload.name.clone(),
                source: e,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_client::MemoryStore;
    use serde_json::json;

    fn source_form(raw: serde_json::Value) -> TicketForm {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_field_ids_translated_in_order() {
        let form = TicketForm::new(1, "Support", vec![1, 2, 3]);
        let fields: IdentifierMapping = [(1, 101), (2, 2), (3, 103)].into_iter().collect();

        let plan = plan_form(&form, &fields, &IdentifierMapping::new());

        assert_eq!(plan.payload.ticket_field_ids, vec![101, 2, 103]);
        assert!(plan.missing_field_ids.is_empty());
        assert!(plan.warnings().is_empty());
    }

    #[test]
    fn test_missing_field_is_reported_not_raised() {
        let form = TicketForm::new(1, "Support", vec![1, 4]);
        let fields: IdentifierMapping = [(1, 101)].into_iter().collect();

        let plan = plan_form(&form, &fields, &IdentifierMapping::new());

        assert_eq!(plan.payload.ticket_field_ids, vec![101, 4]);
        assert_eq!(plan.missing_field_ids, vec![4]);
        assert_eq!(
            plan.warnings(),
            vec![MigrationWarning::MissingFormField { field_id: 4 }]
        );
    }

    #[test]
    fn test_scalar_defaults() {
        let form = TicketForm::new(1, "Support", vec![]);

        let plan = plan_form(&form, &IdentifierMapping::new(), &IdentifierMapping::new());
        let payload = serde_json::to_value(&plan.payload).unwrap();

        assert_eq!(
            payload,
            json!({
                "name": "Support",
                "display_name": "Support",
                "position": 0,
                "active": true,
                "end_user_visible": true,
                "default": false,
                "ticket_field_ids": [],
                "in_all_brands": true
            })
        );
    }

    #[test]
    fn test_source_scalars_are_kept() {
        let form = source_form(json!({
            "id": 1,
            "name": "Hardware",
            "display_name": "Hardware request",
            "position": 4,
            "active": false,
            "end_user_visible": false,
            "default": true,
            "ticket_field_ids": [1]
        }));
        let fields: IdentifierMapping = [(1, 1)].into_iter().collect();

        let payload = plan_form(&form, &fields, &IdentifierMapping::new()).payload;

        assert_eq!(payload.display_name, "Hardware request");
        assert_eq!(payload.position, 4);
        assert!(!payload.active);
        assert!(!payload.end_user_visible);
        assert!(payload.default);
    }

    #[test]
    fn test_restricted_brands_are_translated() {
        let form = source_form(json!({
            "id": 1,
            "name": "Support",
            "ticket_field_ids": [],
            "in_all_brands": false,
            "restricted_brand_ids": [11, 12]
        }));
        let brands: IdentifierMapping = [(11, 71)].into_iter().collect();

        let plan = plan_form(&form, &IdentifierMapping::new(), &brands);

        assert!(!plan.payload.in_all_brands);
        assert_eq!(plan.payload.restricted_brand_ids, vec![71]);
        assert_eq!(plan.unmapped_brand_ids, vec![12]);
    }

    #[test]
    fn test_conditions_are_transformed() {
        let form = source_form(json!({
            "id": 1,
            "name": "Support",
            "ticket_field_ids": [5, 6],
            "end_user_conditions": [
                { "parent_field_id": 5, "value": "x", "child_fields": [{ "id": 6, "is_required": false }] }
            ],
            "agent_conditions": []
        }));
        let fields: IdentifierMapping = [(6, 106)].into_iter().collect();

        let plan = plan_form(&form, &fields, &IdentifierMapping::new());

        let condition = &plan.payload.end_user_conditions[0];
        assert_eq!(condition.parent_field_id, Some(5));
        assert_eq!(condition.child_fields.as_ref().unwrap()[0].id, Some(106));
        assert!(plan.payload.agent_conditions.is_empty());
        assert_eq!(plan.unresolved.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_failure_returns_form_creation_error() {
        let target = MemoryStore::new("target").failing_form_creation();
        let form = TicketForm::new(1, "Support", vec![1]);
        let fields: IdentifierMapping = [(1, 1)].into_iter().collect();
        let plan = plan_form(&form, &fields, &IdentifierMapping::new());

        let result = submit_form(&target, &WritePacer::unlimited(), 0, &plan).await;

        match result {
            Err(MigrationError::FormCreation { name, .. }) => assert_eq!(name, "Support"),
            other => panic!("expected form creation error, got {:?}", other),
        }
    }
}
