//! Remote store abstraction.
//!
//! `HelpdeskStore` is the seam between the migration logic and an account:
//! the reqwest-backed [`HelpdeskClient`](crate::HelpdeskClient) talks to the
//! real API, [`MemoryStore`](crate::MemoryStore) keeps everything in memory.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::*;

/// Read/create access to one helpdesk account.
#[async_trait]
pub trait HelpdeskStore: Send + Sync {
    /// Account label used in logs (usually the subdomain).
    fn account(&self) -> &str;

    /// Fetch a single ticket form.
    async fn get_ticket_form(&self, form_id: u64) -> Result<TicketForm>;

    /// Fetch every ticket form.
    async fn list_ticket_forms(&self) -> Result<Vec<TicketForm>>;

    /// Fetch every ticket field, built-in kinds included.
    async fn list_ticket_fields(&self) -> Result<Vec<TicketField>>;

    /// Fetch every custom object type.
    async fn list_custom_objects(&self) -> Result<Vec<CustomObject>>;

    /// Find a custom object type by key.
    ///
    /// The API has no lookup by key, so the default filters the full list.
    async fn find_custom_object(&self, key: &str) -> Result<Option<CustomObject>> {
        let objects = self.list_custom_objects().await?;
        Ok(objects.into_iter().find(|object| object.key == key))
    }

    /// Fetch every brand.
    async fn list_brands(&self) -> Result<Vec<Brand>>;

    /// Create a ticket form.
    async fn create_ticket_form(&self, form: &NewTicketForm) -> Result<TicketForm>;

    /// Create a ticket field.
    async fn create_ticket_field(&self, field: &NewTicketField) -> Result<TicketField>;

    /// Create a custom object type.
    async fn create_custom_object(&self, object: &NewCustomObject) -> Result<CustomObject>;
}
