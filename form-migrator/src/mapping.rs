//! Identifier mapping and the title-based field mapper.
//!
//! A mapping is built once per migration run and only ever grows: the field
//! mapper seeds it, the dependency resolver adds freshly created fields, and
//! the form builder reads it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use helpdesk_client::{Brand, TicketField};

use crate::error::MigrationError;
use crate::report::MigrationWarning;

/// Source-account id to target-account id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierMapping {
    entries: BTreeMap<u64, u64>,
}

/// Outcome of translating one id through a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Target-account id
    Resolved(u64),
    /// No entry; carries the original source id
    Unresolved(u64),
}

impl Resolution {
    /// Id to use downstream: the translated one, or the original on a miss.
    pub fn id(self) -> u64 {
        match self {
            Resolution::Resolved(id) | Resolution::Unresolved(id) => id,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

impl IdentifierMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `source -> target`.
    ///
    /// Existing entries are never replaced; returns false when `source` was
    /// already mapped.
    pub fn record(&mut self, source: u64, target: u64) -> bool {
        match self.entries.entry(source) {
            std::collections::btree_map::Entry::Occupied(existing) => {
                if *existing.get() != target {
                    debug!(
                        source,
                        kept = *existing.get(),
                        ignored = target,
                        "Mapping entry already present"
                    );
                }
                false
            }
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(target);
                true
            }
        }
    }

    pub fn get(&self, source: u64) -> Option<u64> {
        self.entries.get(&source).copied()
    }

    pub fn contains(&self, source: u64) -> bool {
        self.entries.contains_key(&source)
    }

    /// Translate `source`, tagging misses instead of failing.
    pub fn resolve(&self, source: u64) -> Resolution {
        match self.get(source) {
            Some(target) => Resolution::Resolved(target),
            None => Resolution::Unresolved(source),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries.iter().map(|(source, target)| (*source, *target))
    }

    /// Copy every entry of `other` that is not mapped here yet.
    pub fn extend_from(&mut self, other: &IdentifierMapping) {
        for (source, target) in other.iter() {
            self.record(source, target);
        }
    }
}

impl FromIterator<(u64, u64)> for IdentifierMapping {
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        let mut mapping = IdentifierMapping::new();
        for (source, target) in iter {
            mapping.record(source, target);
        }
        mapping
    }
}

/// What to do when a custom field title is not unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateTitlePolicy {
    /// Use the first field with the title and emit a warning
    #[default]
    FirstMatch,
    /// Fail the run before anything is written
    Reject,
}

/// Result of matching source fields against target fields.
#[derive(Debug, Clone, Default)]
pub struct FieldMatch {
    pub mapping: IdentifierMapping,
    /// Built-in fields mapped to themselves
    pub builtin: usize,
    /// Custom fields matched by title
    pub matched: usize,
    /// Custom source fields with no target counterpart
    pub unmapped: Vec<u64>,
    pub warnings: Vec<MigrationWarning>,
}

/// Map source field ids to target field ids.
///
/// Built-in kinds keep their id. Custom fields are matched by exact title;
/// misses are left out of the mapping for the dependency resolver.
///
/// Every source field is mapped, but unmapped-field warnings and title
/// ambiguity only concern the fields in `form_field_ids`.
pub fn build_field_mapping(
    source_fields: &[TicketField],
    target_fields: &[TicketField],
    form_field_ids: &[u64],
    source_account: &str,
    target_account: &str,
    policy: DuplicateTitlePolicy,
) -> Result<FieldMatch, MigrationError> {
    let mut target_by_title: HashMap<&str, u64> = HashMap::new();
    let mut target_duplicates: HashSet<&str> = HashSet::new();
    for field in target_fields {
        if target_by_title.contains_key(field.title.as_str()) {
            target_duplicates.insert(field.title.as_str());
        } else {
            target_by_title.insert(field.title.as_str(), field.id);
        }
    }

    let mut source_title_counts: HashMap<&str, usize> = HashMap::new();
    for field in source_fields.iter().filter(|f| !f.field_type.is_builtin()) {
        *source_title_counts.entry(field.title.as_str()).or_default() += 1;
    }

    let in_form: HashSet<u64> = form_field_ids.iter().copied().collect();
    let mut result = FieldMatch::default();
    // (account, title)
    let mut ambiguous: BTreeSet<(&str, String)> = BTreeSet::new();

    for field in source_fields {
        if field.field_type.is_builtin() {
            result.mapping.record(field.id, field.id);
            result.builtin += 1;
            continue;
        }

        let title = field.title.as_str();
        let used = in_form.contains(&field.id);
        if used {
            if source_title_counts.get(title).copied().unwrap_or(0) > 1 {
                ambiguous.insert((source_account, title.to_string()));
            }
            if target_duplicates.contains(title) {
                ambiguous.insert((target_account, title.to_string()));
            }
        }

        match target_by_title.get(title) {
            Some(&target_id) => {
                result.mapping.record(field.id, target_id);
                result.matched += 1;
                debug!(title, source_id = field.id, target_id, "Field mapped by title");
            }
            None if used => {
                warn!(title, source_id = field.id, "Field not found in target");
                result.unmapped.push(field.id);
                result.warnings.push(MigrationWarning::UnmappedField {
                    field_id: field.id,
                    title: field.title.clone(),
                });
            }
            None => {
                debug!(title, source_id = field.id, "Field not found in target, not used by form");
                result.unmapped.push(field.id);
            }
        }
    }

    if !ambiguous.is_empty() {
        if policy == DuplicateTitlePolicy::Reject {
            let titles: BTreeSet<String> = ambiguous.into_iter().map(|(_, title)| title).collect();
            return Err(MigrationError::AmbiguousTitle {
                titles: titles.into_iter().collect(),
            });
        }
        for (account, title) in ambiguous {
            warn!(account, title = %title, "Duplicate field title, first match wins");
            result.warnings.push(MigrationWarning::DuplicateTitle {
                account: account.to_string(),
                title,
            });
        }
    }

    Ok(result)
}

/// Map source brand ids to target brand ids by brand name.
pub fn build_brand_mapping(source_brands: &[Brand], target_brands: &[Brand]) -> IdentifierMapping {
    let mut target_by_name: HashMap<&str, u64> = HashMap::new();
    for brand in target_brands {
        target_by_name.entry(brand.name.as_str()).or_insert(brand.id);
    }

    source_brands
        .iter()
        .filter_map(|brand| {
            target_by_name
                .get(brand.name.as_str())
                .map(|&target_id| (brand.id, target_id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: u64, title: &str, kind: &str) -> TicketField {
        TicketField::new(id, title, kind)
    }

    /// Map with every source field considered part of the form
    fn map_all(
        source: &[TicketField],
        target: &[TicketField],
        policy: DuplicateTitlePolicy,
    ) -> Result<FieldMatch, MigrationError> {
        let ids: Vec<u64> = source.iter().map(|f| f.id).collect();
        build_field_mapping(source, target, &ids, "source", "target", policy)
    }

    #[test]
    fn test_builtin_fields_map_to_themselves() {
        let source = vec![
            field(1, "Subject", "subject"),
            field(2, "Estado", "status"),
            field(3, "Type", "type"),
        ];
        // Titles differ and ids are absent from the target list on purpose
        let target = vec![field(500, "Subject line", "subject")];

        let result =
            map_all(&source, &target, DuplicateTitlePolicy::default())
                .unwrap();

        assert_eq!(result.mapping.get(1), Some(1));
        assert_eq!(result.mapping.get(2), Some(2));
        assert_eq!(result.mapping.get(3), Some(3));
        assert_eq!(result.builtin, 3);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_custom_fields_match_by_title() {
        let source = vec![field(1, "Region", "tagger"), field(3, "Serial", "text")];
        let target = vec![field(101, "Region", "tagger"), field(103, "Serial", "text")];

        let result =
            map_all(&source, &target, DuplicateTitlePolicy::FirstMatch)
                .unwrap();

        assert_eq!(result.mapping.resolve(1), Resolution::Resolved(101));
        assert_eq!(result.mapping.resolve(3), Resolution::Resolved(103));
        assert_eq!(result.matched, 2);
        assert!(result.unmapped.is_empty());
    }

    #[test]
    fn test_unmatched_custom_field_is_left_unmapped() {
        let source = vec![field(8, "Warranty", "checkbox")];
        let target = vec![field(101, "Region", "tagger")];

        let result =
            map_all(&source, &target, DuplicateTitlePolicy::FirstMatch)
                .unwrap();

        assert!(!result.mapping.contains(8));
        assert_eq!(result.mapping.resolve(8), Resolution::Unresolved(8));
        assert_eq!(result.unmapped, vec![8]);
        assert_eq!(
            result.warnings,
            vec![MigrationWarning::UnmappedField {
                field_id: 8,
                title: "Warranty".to_string()
            }]
        );
    }

    #[test]
    fn test_duplicate_target_titles_first_match_wins() {
        let source = vec![field(1, "Region", "tagger")];
        let target = vec![field(101, "Region", "tagger"), field(202, "Region", "text")];

        let result =
            map_all(&source, &target, DuplicateTitlePolicy::FirstMatch)
                .unwrap();

        assert_eq!(result.mapping.get(1), Some(101));
        assert!(result.warnings.contains(&MigrationWarning::DuplicateTitle {
            account: "target".to_string(),
            title: "Region".to_string(),
        }));
    }

    #[test]
    fn test_duplicate_titles_rejected_when_strict() {
        let source = vec![field(1, "Region", "tagger"), field(2, "Region", "text")];
        let target = vec![field(101, "Region", "tagger")];

        let result = map_all(&source, &target, DuplicateTitlePolicy::Reject);

        match result {
            Err(MigrationError::AmbiguousTitle { titles }) => {
                assert_eq!(titles, vec!["Region".to_string()])
            }
            other => panic!("expected ambiguity error, got {:?}", other.map(|m| m.mapping)),
        }
    }

    #[test]
    fn test_duplicate_title_outside_form_is_ignored() {
        let source = vec![
            field(1, "Region", "tagger"),
            field(40, "Legacy", "text"),
            field(41, "Legacy", "text"),
        ];
        let target = vec![field(101, "Region", "tagger")];

        let result = build_field_mapping(
            &source,
            &target,
            &[1],
            "source",
            "target",
            DuplicateTitlePolicy::Reject,
        )
        .unwrap();

        assert_eq!(result.mapping.get(1), Some(101));
        assert!(result.warnings.is_empty());
        assert_eq!(result.unmapped, vec![40, 41]);
    }

    #[test]
    fn test_source_only_duplicate_names_source_account() {
        let source = vec![field(40, "Legacy", "text"), field(41, "Legacy", "text")];
        let target = vec![field(140, "Legacy", "text")];

        let result = build_field_mapping(
            &source,
            &target,
            &[40],
            "acme",
            "acme-sandbox",
            DuplicateTitlePolicy::FirstMatch,
        )
        .unwrap();

        assert_eq!(
            result.warnings,
            vec![MigrationWarning::DuplicateTitle {
                account: "acme".to_string(),
                title: "Legacy".to_string(),
            }]
        );
    }

    #[test]
    fn test_record_never_overwrites() {
        let mut mapping = IdentifierMapping::new();
        assert!(mapping.record(5, 105));
        assert!(!mapping.record(5, 999));
        assert_eq!(mapping.get(5), Some(105));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_brand_mapping_by_name() {
        let source = vec![
            Brand { id: 1, name: "Acme".to_string(), subdomain: None },
            Brand { id: 2, name: "Acme Labs".to_string(), subdomain: None },
        ];
        let target = vec![Brand { id: 71, name: "Acme".to_string(), subdomain: None }];

        let mapping = build_brand_mapping(&source, &target);
        assert_eq!(mapping.get(1), Some(71));
        assert_eq!(mapping.get(2), None);
    }

    #[test]
    fn test_mapping_serializes_as_object() {
        let mapping: IdentifierMapping = [(1, 101), (3, 103)].into_iter().collect();
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json, serde_json::json!({ "1": 101, "3": 103 }));
    }
}
