//! Rust client for the helpdesk ticket-form API
//!
//! Covers the resources a form migration touches: ticket forms, ticket
//! fields, custom object types and brands.
//!
//! # Example
//!
//! ```rust,no_run
//! use helpdesk_client::{AccountConfig, HelpdeskClient, HelpdeskStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = HelpdeskClient::new(AccountConfig::new("acme", "admin@acme.test", "secret"))?;
//!
//! let form = source.get_ticket_form(360001).await?;
//! let fields = source.list_ticket_fields().await?;
//! println!("{} uses {} of {} fields", form.name, form.ticket_field_ids.len(), fields.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

// Re-export main types
pub use client::HelpdeskClient;
pub use error::{ClientError, Result};
pub use memory::{MemoryStore, WriteOp};
pub use store::HelpdeskStore;
pub use types::*;
