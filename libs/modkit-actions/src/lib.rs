#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Entity action engine.
//!
//! Given a declarative [`EntityDescriptor`] of one relational table or view,
//! this crate derives the uniform family of data-access actions (`get`,
//! `list`, `create`, `update`, `remove`, `merge`, the bulk variants and
//! `canAccess`) on top of `SeaORM` connections and `sea-query` statements.
//!
//! # Features
//! - `sqlite` (default), `pg`, `mysql`: enable the matching `SQLx` backend
//!
//! # Example
//! ```rust,no_run
//! use modkit_actions::{ActionSpec, EntityConfig, ModelBuilder};
//! use serde_json::json;
//!
//! # async fn run(conn: sea_orm::DatabaseConnection) -> Result<(), modkit_actions::ActionError> {
//! let config = EntityConfig {
//!     create_columns: vec!["name".to_owned()],
//!     update_columns: vec!["name".to_owned()],
//!     ..EntityConfig::new("person")
//! };
//! let model = ModelBuilder::introspected(config, conn)
//!     .await?
//!     .actions(ActionSpec::crud())
//!     .build()?;
//!
//! let args = json!({"name": "Ada"}).as_object().cloned().unwrap_or_default();
//! let created = model.invoke("createPerson", args, None).await?;
//! # let _ = created;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod alias;
pub mod authorizer;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod introspect;
pub mod join;
pub mod model;
pub mod query;
pub mod record;
pub mod validator;

mod runner;

pub use actions::bulk::{BulkAction, BulkKind, BulkSummary};
pub use actions::lister::{ListResult, local_pages};
pub use actions::remover::RemoveResult;
pub use actions::{ActionContext, EntityAction};
pub use authorizer::{Ownership, RecordFetcher, ScopedAuthorizer};
pub use config::{ActionsConfig, IterateConfig, ListConfig};
pub use descriptor::{EntityConfig, EntityDescriptor, UniqueColumns};
pub use error::ActionError;
pub use hooks::{HookRegistry, HookSlot, SuggestTuple};
pub use model::{ActionSpec, ModelBuilder, ModelInterface, ModelMeta};
pub use record::Record;
