//! Condition transformer.
//!
//! Rewrites the field ids inside visibility conditions through an
//! [`IdentifierMapping`]. Translation misses never fail the transform: the
//! original id is kept and an [`UnresolvedReference`] is reported instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use helpdesk_client::{ChildFieldRef, Condition};

use crate::mapping::{IdentifierMapping, Resolution};

/// Which condition list a condition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionScope {
    EndUser,
    Agent,
}

impl fmt::Display for ConditionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionScope::EndUser => f.write_str("end_user"),
            ConditionScope::Agent => f.write_str("agent"),
        }
    }
}

/// Where inside a condition an id was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRole {
    ParentField,
    ChildField,
}

/// A field id inside a condition that had no mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub scope: ConditionScope,
    /// Position of the condition in its list
    pub condition_index: usize,
    pub role: ReferenceRole,
    /// The source id that was passed through unchanged
    pub field_id: u64,
}

/// Transformed conditions plus every reference that could not be translated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformedConditions {
    pub conditions: Vec<Condition>,
    pub unresolved: Vec<UnresolvedReference>,
}

/// Rewrite every field id in `conditions` through `mapping`.
///
/// Scalar attributes and unknown keys are copied verbatim. An empty
/// `child_fields` list is dropped from the output.
pub fn transform_conditions(
    conditions: &[Condition],
    mapping: &IdentifierMapping,
    scope: ConditionScope,
) -> TransformedConditions {
    if conditions.is_empty() {
        debug!(%scope, "No conditions to transform");
        return TransformedConditions::default();
    }

    let mut unresolved = Vec::new();
    let transformed: Vec<Condition> = conditions
        .iter()
        .enumerate()
        .map(|(index, condition)| transform_condition(condition, index, scope, mapping, &mut unresolved))
        .collect();

    info!(
        %scope,
        count = transformed.len(),
        unresolved = unresolved.len(),
        "Conditions transformed"
    );

    TransformedConditions {
        conditions: transformed,
        unresolved,
    }
}

fn transform_condition(
    condition: &Condition,
    index: usize,
    scope: ConditionScope,
    mapping: &IdentifierMapping,
    unresolved: &mut Vec<UnresolvedReference>,
) -> Condition {
    let mut translate = |id: u64, role: ReferenceRole| match mapping.resolve(id) {
        Resolution::Resolved(target) => {
            debug!(%scope, index, ?role, source_id = id, target_id = target, "Condition reference mapped");
            target
        }
        Resolution::Unresolved(original) => {
            warn!(%scope, index, ?role, field_id = original, "Condition reference not in mapping");
            unresolved.push(UnresolvedReference {
                scope,
                condition_index: index,
                role,
                field_id: original,
            });
            original
        }
    };

    let parent_field_id = condition
        .parent_field_id
        .map(|id| translate(id, ReferenceRole::ParentField));

    let child_fields = condition
        .child_fields
        .as_ref()
        .filter(|children| !children.is_empty())
        .map(|children| {
            children
                .iter()
                .map(|child| ChildFieldRef {
                    id: child.id.map(|id| translate(id, ReferenceRole::ChildField)),
                    ..child.clone()
                })
                .collect()
        });

    Condition {
        parent_field_id,
        parent_field_type: condition.parent_field_type.clone(),
        value: condition.value.clone(),
        operator: condition.operator.clone(),
        child_fields,
        extra: condition.extra.clone(),
    }
}
