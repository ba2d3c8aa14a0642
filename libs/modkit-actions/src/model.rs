//! Model interface: the registered actions of one entity behind an explicit
//! name map, plus the metadata routing layers derive endpoints from.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use heck::ToUpperCamelCase;
use sea_orm::{DatabaseConnection, DatabaseTransaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::bulk::{BulkAction, BulkKind};
use crate::actions::creator::Creator;
use crate::actions::getter::{Existence, Getter};
use crate::actions::iterate::PageIterator;
use crate::actions::lister::{Lister, Suggester};
use crate::actions::merger::Merger;
use crate::actions::remover::Remover;
use crate::actions::updater::{UpdateMode, Updater};
use crate::actions::{ActionContext, EntityAction};
use crate::authorizer::{Ownership, RecordFetcher, ScopedAuthorizer};
use crate::config::ActionsConfig;
use crate::descriptor::{EntityConfig, EntityDescriptor};
use crate::error::ActionError;
use crate::hooks::HookRegistry;
use crate::introspect::{Introspector, TableInfo, introspect_table};
use crate::record::Record;
use crate::validator::Validator;

/// An action a model may register, named as in the action map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActionSpec {
    Get,
    Is,
    List,
    Suggest,
    Create,
    Update,
    SoftRemove,
    SoftRestore,
    Remove,
    Merge,
    Bulk(BulkKind),
    Introspect,
    /// Validation of the named fields; all columns when empty.
    Validate(Vec<String>),
}

impl ActionSpec {
    /// `get`, `list`, `create`, `update` and `remove`.
    #[must_use]
    pub fn crud() -> Vec<Self> {
        vec![Self::Get, Self::List, Self::Create, Self::Update, Self::Remove]
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Is => "is",
            Self::List => "list",
            Self::Suggest => "suggest",
            Self::Create => "create",
            Self::Update => UpdateMode::Update.name(),
            Self::SoftRemove => UpdateMode::SoftRemove.name(),
            Self::SoftRestore => UpdateMode::SoftRestore.name(),
            Self::Remove => "remove",
            Self::Merge => "merge",
            Self::Bulk(kind) => kind.name(),
            Self::Introspect => "introspect",
            Self::Validate(_) => "validate",
        }
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionSpec {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = match s {
            "get" => Self::Get,
            "is" => Self::Is,
            "list" => Self::List,
            "suggest" => Self::Suggest,
            "create" => Self::Create,
            "update" => Self::Update,
            "softRemove" => Self::SoftRemove,
            "softRestore" => Self::SoftRestore,
            "remove" => Self::Remove,
            "merge" => Self::Merge,
            "bulkCreate" => Self::Bulk(BulkKind::Create),
            "bulkUpdate" => Self::Bulk(BulkKind::Update),
            "bulkRemove" => Self::Bulk(BulkKind::Remove),
            "bulkMerge" => Self::Bulk(BulkKind::Merge),
            "bulkPut" => Self::Bulk(BulkKind::Put),
            "introspect" => Self::Introspect,
            "validate" => Self::Validate(Vec::new()),
            other => return Err(ActionError::InvalidDescriptor(format!("unknown action {other:?}"))),
        };
        Ok(spec)
    }
}

impl TryFrom<String> for ActionSpec {
    type Error = ActionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActionSpec> for String {
    fn from(spec: ActionSpec) -> Self {
        spec.name().to_owned()
    }
}

/// Descriptor metadata for transport and routing layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    #[serde(rename = "_entityName")]
    pub entity_name: String,
    #[serde(rename = "_pascalName")]
    pub pascal_name: String,
    #[serde(rename = "_label")]
    pub label: String,
    #[serde(rename = "_keys")]
    pub keys: Vec<String>,
    #[serde(rename = "_selectArgs")]
    pub select_args: Vec<String>,
    #[serde(rename = "_createColumns")]
    pub create_columns: Vec<String>,
    #[serde(rename = "_updateColumns")]
    pub update_columns: Vec<String>,
    #[serde(rename = "_joins")]
    pub joins: Vec<String>,
    #[serde(rename = "_listArgs")]
    pub list_args: Vec<String>,
    #[serde(rename = "_orderable")]
    pub orderable: Vec<String>,
    #[serde(rename = "_uniqueColumns")]
    pub unique_columns: Vec<Vec<String>>,
    #[serde(rename = "_actions")]
    pub actions: Vec<String>,
}

impl ModelMeta {
    fn from_descriptor(d: &EntityDescriptor) -> Self {
        let mut list_args = vec!["page".to_owned(), "limit".to_owned()];
        if !d.orderable().is_empty() {
            list_args.push("orderBy".to_owned());
            list_args.push("orderDir".to_owned());
        }
        if let Some(spec) = d.list_where() {
            list_args.extend(spec.arg_names());
        }
        Self {
            entity_name: d.entity_name().to_owned(),
            pascal_name: d.pascal_name().to_owned(),
            label: d.label().to_owned(),
            keys: d.keys().to_vec(),
            select_args: d.select_args().iter().map(ToString::to_string).collect(),
            create_columns: d.create_columns().to_vec(),
            update_columns: d.update_columns().to_vec(),
            joins: d.joins().iter().map(crate::join::PreparedJoin::clause).collect(),
            list_args,
            orderable: d.orderable().to_vec(),
            unique_columns: d.unique_columns().to_vec(),
            actions: Vec::new(),
        }
    }
}

struct AuthSpec {
    action: String,
    ownership: Option<Ownership>,
    fetcher: Option<RecordFetcher>,
}

/// Registers the actions of one entity.
pub struct ModelBuilder {
    ctx: ActionContext,
    table: Option<TableInfo>,
    actions: Vec<ActionSpec>,
    authorizers: Vec<AuthSpec>,
}

impl fmt::Debug for ModelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBuilder")
            .field("entity", &self.ctx.descriptor.entity_name())
            .field("actions", &self.actions)
            .field("authorizers", &self.authorizers.iter().map(|a| &a.action).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ModelBuilder {
    #[must_use]
    pub fn new(descriptor: EntityDescriptor, conn: DatabaseConnection) -> Self {
        Self {
            ctx: ActionContext::new(Arc::new(descriptor), conn),
            table: None,
            actions: Vec::new(),
            authorizers: Vec::new(),
        }
    }

    /// Introspect the entity's table and build its descriptor from `config`
    /// merged with what the store reports.
    ///
    /// # Errors
    /// `InvalidDescriptor` for a config that does not fit the table; store
    /// failures while introspecting.
    pub async fn introspected(config: EntityConfig, conn: DatabaseConnection) -> Result<Self, ActionError> {
        let table = introspect_table(&conn, config.schema.as_deref(), &config.entity_name).await?;
        let descriptor = EntityDescriptor::build(config, Some(&table))?;
        let mut builder = Self::new(descriptor, conn);
        builder.table = Some(table);
        Ok(builder)
    }

    #[must_use]
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.ctx = self.ctx.with_hooks(hooks);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ActionsConfig) -> Self {
        self.ctx = self.ctx.with_config(config);
        self
    }

    /// Column metadata for `validate`, when not introspected here.
    #[must_use]
    pub fn table(mut self, table: TableInfo) -> Self {
        self.table = Some(table);
        self
    }

    #[must_use]
    pub fn action(mut self, spec: ActionSpec) -> Self {
        self.actions.push(spec);
        self
    }

    #[must_use]
    pub fn actions(mut self, specs: impl IntoIterator<Item = ActionSpec>) -> Self {
        self.actions.extend(specs);
        self
    }

    /// Register `can<Action>`; `None` checks the flat `can <action> <entity>`.
    #[must_use]
    pub fn authorize(mut self, action: &str, ownership: Option<Ownership>) -> Self {
        self.authorizers.push(AuthSpec {
            action: action.to_owned(),
            ownership,
            fetcher: None,
        });
        self
    }

    /// Register a column-scoped `can<Action>` that loads targets through `fetcher`.
    #[must_use]
    pub fn authorize_with_fetcher(mut self, action: &str, column: &str, fetcher: RecordFetcher) -> Self {
        self.authorizers.push(AuthSpec {
            action: action.to_owned(),
            ownership: Some(Ownership::Column(column.to_owned())),
            fetcher: Some(fetcher),
        });
        self
    }

    fn instantiate(&self, spec: &ActionSpec) -> Result<Arc<dyn EntityAction>, ActionError> {
        let ctx = self.ctx.clone();
        let action: Arc<dyn EntityAction> = match spec {
            ActionSpec::Get => Arc::new(Getter::new(ctx)),
            ActionSpec::Is => Arc::new(Existence(Getter::new(ctx))),
            ActionSpec::List => Arc::new(Lister::new(ctx)),
            ActionSpec::Suggest => Arc::new(Suggester::new(ctx)),
            ActionSpec::Create => Arc::new(Creator::new(ctx)),
            ActionSpec::Update => Arc::new(Updater::new(ctx)),
            ActionSpec::SoftRemove => Arc::new(Updater::with_mode(ctx, UpdateMode::SoftRemove)),
            ActionSpec::SoftRestore => Arc::new(Updater::with_mode(ctx, UpdateMode::SoftRestore)),
            ActionSpec::Remove => Arc::new(Remover::new(ctx)),
            ActionSpec::Merge => Arc::new(Merger::new(ctx)),
            ActionSpec::Bulk(kind) => Arc::new(BulkAction::new(ctx, *kind)),
            ActionSpec::Introspect => Arc::new(Introspector::new(ctx)),
            ActionSpec::Validate(fields) => {
                let table = self.table.as_ref().ok_or_else(|| {
                    ActionError::InvalidDescriptor(format!(
                        "validate{} needs introspected column metadata",
                        self.ctx.descriptor.pascal_name()
                    ))
                })?;
                Arc::new(Validator::from_table(table, fields))
            }
        };
        Ok(action)
    }

    /// Freeze the registered actions into a [`ModelInterface`].
    ///
    /// # Errors
    /// `InvalidDescriptor` when `validate` is registered without column
    /// metadata or two registrations share a name.
    pub fn build(self) -> Result<ModelInterface, ActionError> {
        let pascal = self.ctx.descriptor.pascal_name().to_owned();
        let mut actions: HashMap<String, Arc<dyn EntityAction>> = HashMap::new();
        let mut names = Vec::new();
        let mut register = |name: String, action: Arc<dyn EntityAction>| {
            let full = format!("{name}{pascal}");
            if actions.contains_key(&full) {
                return Err(ActionError::InvalidDescriptor(format!("action {full} registered twice")));
            }
            actions.insert(name.clone(), Arc::clone(&action));
            actions.insert(full.clone(), action);
            names.push(full);
            Ok(())
        };

        for spec in &self.actions {
            register(spec.name().to_owned(), self.instantiate(spec)?)?;
        }
        for auth in &self.authorizers {
            let authorizer = match &auth.ownership {
                Some(ownership) => ScopedAuthorizer::scoped(self.ctx.clone(), &auth.action, ownership.clone()),
                None => ScopedAuthorizer::unscoped(self.ctx.clone(), &auth.action),
            };
            let authorizer = match &auth.fetcher {
                Some(fetcher) => authorizer.with_fetcher(Arc::clone(fetcher)),
                None => authorizer,
            };
            register(format!("can{}", auth.action.to_upper_camel_case()), Arc::new(authorizer))?;
        }

        let mut meta = ModelMeta::from_descriptor(&self.ctx.descriptor);
        meta.actions = names;
        tracing::info!(entity = %meta.entity_name, actions = ?meta.actions, "model registered");
        Ok(ModelInterface {
            meta,
            ctx: self.ctx,
            actions,
        })
    }
}

/// The registered actions of one entity.
#[derive(Clone)]
pub struct ModelInterface {
    meta: ModelMeta,
    ctx: ActionContext,
    actions: HashMap<String, Arc<dyn EntityAction>>,
}

impl fmt::Debug for ModelInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInterface")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl ModelInterface {
    #[must_use]
    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    #[must_use]
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.ctx.descriptor
    }

    /// Look up an action by its full name (`getPerson`) or bare name (`get`).
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&Arc<dyn EntityAction>> {
        self.actions.get(name)
    }

    /// Full names of every registered action.
    #[must_use]
    pub fn action_names(&self) -> &[String] {
        &self.meta.actions
    }

    /// Invoke a registered action with JSON args.
    ///
    /// # Errors
    /// `UnprocessableEntity` for an unknown name; otherwise whatever the action returns.
    pub async fn invoke(&self, name: &str, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        let action = self
            .action(name)
            .ok_or_else(|| ActionError::UnprocessableEntity(format!("Unknown action {name}")))?;
        action.invoke(args, tx).await
    }

    #[must_use]
    pub fn getter(&self) -> Getter {
        Getter::new(self.ctx.clone())
    }

    #[must_use]
    pub fn lister(&self) -> Lister {
        Lister::new(self.ctx.clone())
    }

    #[must_use]
    pub fn creator(&self) -> Creator {
        Creator::new(self.ctx.clone())
    }

    #[must_use]
    pub fn updater(&self) -> Updater {
        Updater::new(self.ctx.clone())
    }

    #[must_use]
    pub fn remover(&self) -> Remover {
        Remover::new(self.ctx.clone())
    }

    #[must_use]
    pub fn merger(&self) -> Merger {
        Merger::new(self.ctx.clone())
    }

    #[must_use]
    pub fn bulk(&self, kind: BulkKind) -> BulkAction {
        BulkAction::new(self.ctx.clone(), kind)
    }

    #[must_use]
    pub fn iterator(&self) -> PageIterator {
        PageIterator::new(self.lister())
    }
}
