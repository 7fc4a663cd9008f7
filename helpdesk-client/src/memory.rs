//! In-memory helpdesk account for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{ClientError, Result};
use crate::store::HelpdeskStore;
use crate::types::*;

/// First id handed out to created resources unless overridden.
const DEFAULT_FIRST_ID: u64 = 10_000;

/// A write that reached the store, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Custom object type created (key)
    CustomObject(String),
    /// Ticket field created (title)
    TicketField(String),
    /// Ticket form created (name)
    TicketForm(String),
}

#[derive(Default)]
struct State {
    forms: Vec<TicketForm>,
    fields: Vec<TicketField>,
    objects: Vec<CustomObject>,
    brands: Vec<Brand>,
    writes: Vec<WriteOp>,
    next_id: u64,
    rate_limited_fields: HashMap<String, u32>,
}

/// In-memory store implementing [`HelpdeskStore`].
///
/// Configurable contents and failure injection for unit tests.
pub struct MemoryStore {
    account: String,
    state: Mutex<State>,
    failing_field_titles: HashSet<String>,
    fail_form_creation: bool,
    fail_custom_object_creation: bool,
    drop_end_user_conditions: bool,
    call_count: AtomicU32,
}

impl MemoryStore {
    /// Create an empty account.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            state: Mutex::new(State {
                next_id: DEFAULT_FIRST_ID,
                ..Default::default()
            }),
            failing_field_titles: HashSet::new(),
            fail_form_creation: false,
            fail_custom_object_creation: false,
            drop_end_user_conditions: false,
            call_count: AtomicU32::new(0),
        }
    }

    /// Seed ticket fields.
    pub fn with_fields(self, fields: impl IntoIterator<Item = TicketField>) -> Self {
        self.state().fields.extend(fields);
        self
    }

    /// Seed ticket forms.
    pub fn with_forms(self, forms: impl IntoIterator<Item = TicketForm>) -> Self {
        self.state().forms.extend(forms);
        self
    }

    /// Seed custom object types.
    pub fn with_custom_objects(self, objects: impl IntoIterator<Item = CustomObject>) -> Self {
        self.state().objects.extend(objects);
        self
    }

    /// Seed brands.
    pub fn with_brands(self, brands: impl IntoIterator<Item = Brand>) -> Self {
        self.state().brands.extend(brands);
        self
    }

    /// Set the id given to the next created resource.
    pub fn with_next_id(self, next_id: u64) -> Self {
        self.state().next_id = next_id;
        self
    }

    /// Reject creation of the field with this title.
    pub fn failing_field(mut self, title: impl Into<String>) -> Self {
        self.failing_field_titles.insert(title.into());
        self
    }

    /// Answer 429 for the first `times` attempts to create this field.
    pub fn rate_limited_field(self, title: impl Into<String>, times: u32) -> Self {
        self.state().rate_limited_fields.insert(title.into(), times);
        self
    }

    /// Reject every form creation.
    pub fn failing_form_creation(mut self) -> Self {
        self.fail_form_creation = true;
        self
    }

    /// Reject every custom object creation.
    pub fn failing_custom_object_creation(mut self) -> Self {
        self.fail_custom_object_creation = true;
        self
    }

    /// Accept forms but discard their end-user conditions.
    pub fn dropping_end_user_conditions(mut self) -> Self {
        self.drop_end_user_conditions = true;
        self
    }

    /// Writes performed so far, in order.
    pub fn writes(&self) -> Vec<WriteOp> {
        self.state().writes.clone()
    }

    /// Current ticket fields.
    pub fn fields(&self) -> Vec<TicketField> {
        self.state().fields.clone()
    }

    /// Current ticket forms.
    pub fn forms(&self) -> Vec<TicketForm> {
        self.state().forms.clone()
    }

    /// Current custom object types.
    pub fn custom_objects(&self) -> Vec<CustomObject> {
        self.state().objects.clone()
    }

    /// Number of store operations served.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn track_call(&self) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
    }
}

fn allocate_id(state: &mut State) -> u64 {
    let id = state.next_id;
    state.next_id += 1;
    id
}

fn rejected(reason: &str) -> ClientError {
    ClientError::Server {
        status: 422,
        message: format!("{{\"error\":\"RecordInvalid\",\"description\":\"{}\"}}", reason),
    }
}

#[async_trait]
impl HelpdeskStore for MemoryStore {
    fn account(&self) -> &str {
        &self.account
    }

    async fn get_ticket_form(&self, form_id: u64) -> Result<TicketForm> {
        self.track_call();
        self.state()
            .forms
            .iter()
            .find(|form| form.id == form_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("ticket_forms/{}", form_id)))
    }

    async fn list_ticket_forms(&self) -> Result<Vec<TicketForm>> {
        self.track_call();
        Ok(self.forms())
    }

    async fn list_ticket_fields(&self) -> Result<Vec<TicketField>> {
        self.track_call();
        Ok(self.fields())
    }

    async fn list_custom_objects(&self) -> Result<Vec<CustomObject>> {
        self.track_call();
        Ok(self.custom_objects())
    }

    async fn list_brands(&self) -> Result<Vec<Brand>> {
        self.track_call();
        Ok(self.state().brands.clone())
    }

    async fn create_ticket_form(&self, form: &NewTicketForm) -> Result<TicketForm> {
        self.track_call();
        if self.fail_form_creation {
            return Err(rejected("ticket form rejected"));
        }

        let mut state = self.state();
        let created = TicketForm {
            id: allocate_id(&mut state),
            name: form.name.clone(),
            display_name: Some(form.display_name.clone()),
            position: Some(form.position),
            active: Some(form.active),
            end_user_visible: Some(form.end_user_visible),
            default: Some(form.default),
            ticket_field_ids: form.ticket_field_ids.clone(),
            in_all_brands: Some(form.in_all_brands),
            restricted_brand_ids: form.restricted_brand_ids.clone(),
            end_user_conditions: if self.drop_end_user_conditions {
                Vec::new()
            } else {
                form.end_user_conditions.clone()
            },
            agent_conditions: form.agent_conditions.clone(),
        };
        state.writes.push(WriteOp::TicketForm(created.name.clone()));
        state.forms.push(created.clone());
        Ok(created)
    }

    async fn create_ticket_field(&self, field: &NewTicketField) -> Result<TicketField> {
        self.track_call();
        if self.failing_field_titles.contains(&field.title) {
            return Err(rejected("ticket field rejected"));
        }

        let mut state = self.state();
        if let Some(remaining) = state.rate_limited_fields.get_mut(&field.title) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClientError::RateLimited {
                    retry_after_secs: Some(0),
                });
            }
        }

        let created = TicketField {
            id: allocate_id(&mut state),
            title: field.title.clone(),
            field_type: field.field_type.clone(),
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
            custom_field_options: field.custom_field_options.clone(),
            sub_type_id: field.sub_type_id,
            removable: field.removable,
            relationship_target_type: field.relationship_target_type.clone(),
        };
        state.writes.push(WriteOp::TicketField(created.title.clone()));
        state.fields.push(created.clone());
        Ok(created)
    }

    async fn create_custom_object(&self, object: &NewCustomObject) -> Result<CustomObject> {
        self.track_call();
        if self.fail_custom_object_creation {
            return Err(rejected("custom object rejected"));
        }

        let mut state = self.state();
        if state.objects.iter().any(|existing| existing.key == object.key) {
            return Err(rejected("custom object key already taken"));
        }

        let created = CustomObject {
            key: object.key.clone(),
            title: object.title.clone(),
            title_pluralized: object.title_pluralized.clone(),
            description: Some(object.description.clone()),
        };
        state.writes.push(WriteOp::CustomObject(created.key.clone()));
        state.objects.push(created.clone());
        Ok(created)
    }
}
