//! Ticket form migration between helpdesk accounts
//!
//! Copies a ticket form from a source account into a target account. Field
//! ids differ between accounts, so every reference the form holds is
//! re-mapped:
//!
//! 1. **Field mapping** - built-in fields keep their id, custom fields are
//!    matched by title ([`mapping`])
//! 2. **Dependencies** - missing fields are created in the target, custom
//!    object types first ([`resolver`])
//! 3. **Conditions** - visibility rules are rewritten through the mapping
//!    ([`conditions`])
//! 4. **Form creation** - the payload is built and submitted ([`builder`])
//!
//! [`FormReconciler`] runs the stages and returns a [`MigrationOutcome`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use form_migrator::{FormReconciler, MigrationOutcome};
//! use helpdesk_client::{AccountConfig, HelpdeskClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = HelpdeskClient::new(AccountConfig::new("acme", "admin@acme.test", "s3cret"))?;
//! let target = HelpdeskClient::new(AccountConfig::new("acme-sandbox", "admin@acme.test", "t0ken"))?;
//!
//! let reconciler = FormReconciler::new(Arc::new(source), Arc::new(target));
//! if let MigrationOutcome::Failed { error, field_mappings, .. } = reconciler.migrate_form(360001).await {
//!     eprintln!("migration failed: {}", error);
//!     // Fields created so far are reused on retry
//!     let retry = reconciler.migrate_form_with_mapping(360001, field_mappings).await;
//!     println!("retry succeeded: {}", retry.is_success());
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod conditions;
pub mod config;
pub mod error;
pub mod mapping;
pub mod pacer;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod summary;

pub use conditions::{transform_conditions, ConditionScope, TransformedConditions, UnresolvedReference};
pub use config::{Args, Command, MigratorConfig};
pub use error::{MigrationError, Result};
pub use mapping::{build_field_mapping, DuplicateTitlePolicy, IdentifierMapping, Resolution};
pub use pacer::WritePacer;
pub use reconciler::{AccountSide, FormReconciler, MigrationOutcome};
pub use report::{ConditionCheck, ConditionCounts, MigrationReport, MigrationStage, MigrationWarning};
pub use resolver::{CustomObjectGate, DependencyResolver};
