//! Wire types for the helpdesk REST API

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Prefix of a lookup field's relationship target when it points at a custom object
pub const CUSTOM_OBJECT_TARGET_PREFIX: &str = "zen:custom_object:";

/// Account connection settings
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Account subdomain (e.g. "acme" for acme.zendesk.com)
    pub subdomain: String,
    /// Agent email used for token authentication
    pub email: String,
    /// API token
    pub token: String,
    /// Override for the API root (tests, proxies). Derived from the subdomain when unset.
    pub base_url: Option<String>,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            subdomain: String::new(),
            email: String::new(),
            token: String::new(),
            base_url: None,
            timeout_secs: 30,
        }
    }
}

impl AccountConfig {
    /// Create settings for an account with the default API root
    pub fn new(
        subdomain: impl Into<String>,
        email: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            subdomain: subdomain.into(),
            email: email.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    /// Point the account at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// API root, without trailing slash
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.zendesk.com/api/v2", self.subdomain),
        }
    }

    /// Basic-auth user name for API token authentication
    pub fn auth_user(&self) -> String {
        format!("{}/token", self.email)
    }
}

// ==================== Ticket fields ====================

/// Kind of a ticket field.
///
/// The nine built-in kinds exist in every account with the same identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Subject,
    Description,
    Status,
    Priority,
    TicketType,
    Assignee,
    Group,
    Requester,
    Collaborator,
    /// Relationship field, possibly targeting a custom object
    Lookup,
    /// Any other custom kind (text, tagger, multiselect, ...)
    Custom(String),
}

impl FieldType {
    /// Wire name of this kind
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Subject => "subject",
            FieldType::Description => "description",
            FieldType::Status => "status",
            FieldType::Priority => "priority",
            FieldType::TicketType => "type",
            FieldType::Assignee => "assignee",
            FieldType::Group => "group",
            FieldType::Requester => "requester",
            FieldType::Collaborator => "collaborator",
            FieldType::Lookup => "lookup",
            FieldType::Custom(name) => name,
        }
    }

    /// Whether this is one of the built-in kinds shared by all accounts
    pub fn is_builtin(&self) -> bool {
        !matches!(self, FieldType::Lookup | FieldType::Custom(_))
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "subject" => FieldType::Subject,
            "description" => FieldType::Description,
            "status" => FieldType::Status,
            "priority" => FieldType::Priority,
            "type" => FieldType::TicketType,
            "assignee" => FieldType::Assignee,
            "group" => FieldType::Group,
            "requester" => FieldType::Requester,
            "collaborator" => FieldType::Collaborator,
            "lookup" => FieldType::Lookup,
            _ => FieldType::Custom(value),
        }
    }
}

impl From<&str> for FieldType {
    fn from(value: &str) -> Self {
        FieldType::from(value.to_string())
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Option of a drop-down or multi-select field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

/// A ticket field as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketField {
    pub id: u64,
    pub title: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed_for_agents: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp_for_validation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_in_portal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_in_portal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable_in_portal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_in_portal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_field_options: Option<Vec<FieldOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_target_type: Option<String>,
}

impl TicketField {
    /// Bare field with only the required attributes set
    pub fn new(id: u64, title: impl Into<String>, field_type: impl Into<FieldType>) -> Self {
        Self {
            id,
            title: title.into(),
            field_type: field_type.into(),
            description: None,
            position: None,
            active: None,
            required: None,
            collapsed_for_agents: None,
            regexp_for_validation: None,
            title_in_portal: None,
            visible_in_portal: None,
            editable_in_portal: None,
            required_in_portal: None,
            tag: None,
            custom_field_options: None,
            sub_type_id: None,
            removable: None,
            relationship_target_type: None,
        }
    }

    /// Set the relationship target type
    pub fn with_relationship_target(mut self, target: impl Into<String>) -> Self {
        self.relationship_target_type = Some(target.into());
        self
    }

    /// Key of the custom object this lookup field points at, if any
    pub fn custom_object_key(&self) -> Option<&str> {
        if self.field_type != FieldType::Lookup {
            return None;
        }
        self.relationship_target_type
            .as_deref()
            .and_then(|target| target.strip_prefix(CUSTOM_OBJECT_TARGET_PREFIX))
            .filter(|key| !key.is_empty())
    }
}

/// Create payload for a ticket field.
///
/// Attributes absent on the source field are omitted rather than sent as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicketField {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed_for_agents: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp_for_validation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_in_portal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_in_portal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable_in_portal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_in_portal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_field_options: Option<Vec<FieldOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_target_type: Option<String>,
}

impl NewTicketField {
    /// Build the create payload for copying `field` into another account.
    ///
    /// Option ids belong to the source account and are stripped.
    pub fn from_source(field: &TicketField) -> Self {
        let custom_field_options = field.custom_field_options.as_ref().map(|options| {
            options
                .iter()
                .map(|option| FieldOption {
                    id: None,
                    ..option.clone()
                })
                .collect()
        });

        Self {
            field_type: field.field_type.clone(),
            title: field.title.clone(),
            description: field.description.clone(),
            position: field.position,
            active: field.active,
            required: field.required,
            collapsed_for_agents: field.collapsed_for_agents,
            regexp_for_validation: field.regexp_for_validation.clone(),
            title_in_portal: field.title_in_portal.clone(),
            visible_in_portal: field.visible_in_portal,
            editable_in_portal: field.editable_in_portal,
            required_in_portal: field.required_in_portal,
            tag: field.tag.clone(),
            custom_field_options,
            sub_type_id: field.sub_type_id,
            removable: field.removable,
            relationship_target_type: field.relationship_target_type.clone(),
        }
    }
}

// ==================== Custom objects ====================

/// A custom object type definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomObject {
    pub key: String,
    pub title: String,
    pub title_pluralized: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Create payload for a custom object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomObject {
    pub key: String,
    pub title: String,
    pub title_pluralized: String,
    pub description: String,
}

impl From<&CustomObject> for NewCustomObject {
    fn from(object: &CustomObject) -> Self {
        Self {
            key: object.key.clone(),
            title: object.title.clone(),
            title_pluralized: object.title_pluralized.clone(),
            description: object.description.clone().unwrap_or_default(),
        }
    }
}

// ==================== Brands ====================

/// A brand of the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
}

// ==================== Ticket forms ====================

/// Reference from a condition to a dependent field.
///
/// Attributes other than `id` and `is_required` are kept in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChildFieldRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_required: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChildFieldRef {
    pub fn new(id: u64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }
}

/// Visibility rule: when the parent field has `value`, show `child_fields`.
///
/// Unknown keys are kept in `extra` so newer API attributes survive a copy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field_type: Option<String>,
    /// Present-but-null is kept as `Some(Value::Null)`
    #[serde(default, deserialize_with = "present_value", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_fields: Option<Vec<ChildFieldRef>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A ticket form as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketForm {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_user_visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ticket_field_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_all_brands: Option<bool>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub restricted_brand_ids: Vec<u64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub end_user_conditions: Vec<Condition>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub agent_conditions: Vec<Condition>,
}

impl TicketForm {
    /// Form with a name and field list; everything else unset
    pub fn new(id: u64, name: impl Into<String>, ticket_field_ids: Vec<u64>) -> Self {
        Self {
            id,
            name: name.into(),
            display_name: None,
            position: None,
            active: None,
            end_user_visible: None,
            default: None,
            ticket_field_ids,
            in_all_brands: None,
            restricted_brand_ids: Vec::new(),
            end_user_conditions: Vec::new(),
            agent_conditions: Vec::new(),
        }
    }

    /// Total number of conditions across both scopes
    pub fn condition_count(&self) -> usize {
        self.end_user_conditions.len() + self.agent_conditions.len()
    }
}

/// Create payload for a ticket form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicketForm {
    pub name: String,
    pub display_name: String,
    pub position: i64,
    pub active: bool,
    pub end_user_visible: bool,
    pub default: bool,
    pub ticket_field_ids: Vec<u64>,
    pub in_all_brands: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restricted_brand_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub end_user_conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_conditions: Vec<Condition>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
