//! `list` and `suggest`: paginated, ordered reads.

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use sea_orm::sea_query::{Condition, Order, SelectStatement};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ActionContext, EntityAction, to_json};
use crate::alias::QualifiedColumn;
use crate::error::ActionError;
use crate::hooks::{HookSlot, SuggestTuple};
use crate::query::{assemble, assemble_count};
use crate::record::{Record, aggregate_keys, as_u64};

/// One page of rows plus everything a client needs to render pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T = Record> {
    pub result: Vec<T>,
    pub total: u64,
    pub limit: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub local_pages: Vec<u64>,
    pub next_page: Option<u64>,
    pub prev_page: Option<u64>,
    pub first_page: Option<u64>,
    pub last_page: Option<u64>,
}

impl<T> ListResult<T> {
    /// The shape returned when the list queries fail.
    #[must_use]
    pub fn empty(current_page: u64, limit: u64) -> Self {
        Self {
            result: Vec::new(),
            total: 0,
            limit,
            current_page,
            total_pages: 0,
            local_pages: Vec::new(),
            next_page: None,
            prev_page: None,
            first_page: None,
            last_page: None,
        }
    }

    /// Page `page` of `total` rows, `limit` per page.
    #[must_use]
    pub fn paginate(result: Vec<T>, total: u64, page: u64, limit: u64, window: u64) -> Self {
        let total_pages = total.div_ceil(limit.max(1));
        Self {
            result,
            total,
            limit,
            current_page: page,
            total_pages,
            local_pages: local_pages(page, total_pages, window),
            next_page: (page < total_pages && total_pages > 1).then(|| page + 1),
            prev_page: (page > 1 && total_pages > 1).then(|| page - 1),
            first_page: (total_pages > 0 && page > 1).then_some(1),
            last_page: (total_pages > 0 && page < total_pages).then_some(total_pages),
        }
    }

    /// Same pagination, rows mapped.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ListResult<U> {
        ListResult {
            result: self.result.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            current_page: self.current_page,
            total_pages: self.total_pages,
            local_pages: self.local_pages,
            next_page: self.next_page,
            prev_page: self.prev_page,
            first_page: self.first_page,
            last_page: self.last_page,
        }
    }
}

/// Page numbers shown around `current`: at most `window` of them, starting at
/// 1 near the front, ending at `total_pages` near the back, otherwise
/// starting `ceil(window / 2)` pages before `current`.
///
/// ```
/// use modkit_actions::actions::lister::local_pages;
/// assert_eq!(local_pages(22, 100, 10), (18..=27).collect::<Vec<_>>());
/// assert_eq!(local_pages(3, 5, 10), vec![1, 2, 3, 4, 5]);
/// ```
#[must_use]
pub fn local_pages(current: u64, total_pages: u64, window: u64) -> Vec<u64> {
    let shown = total_pages.min(window);
    let half = window.div_ceil(2);
    let first = if current < half {
        1
    } else if total_pages.saturating_sub(current) <= window {
        total_pages - shown + 1
    } else {
        current + 1 - half
    };
    (first..first + shown).collect()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

/// Parsed paging and ordering arguments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ListArgs {
    pub(crate) page: u64,
    pub(crate) limit: u64,
    pub(crate) order: Vec<(String, Order)>,
}

#[derive(Clone, Debug)]
pub struct Lister {
    ctx: ActionContext,
}

impl Lister {
    #[must_use]
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn context(&self) -> &ActionContext {
        &self.ctx
    }

    pub(crate) fn parse_args(&self, args: &Record) -> ListArgs {
        let d = &self.ctx.descriptor;
        let page = as_u64(args.get("page")).filter(|p| *p > 0).unwrap_or(1);
        let limit = self
            .ctx
            .config
            .list
            .clamp_limit(as_u64(args.get("limit")), d.list_page_limit());

        let dirs = string_list(args.get("orderDir"));
        let order = string_list(args.get("orderBy"))
            .into_iter()
            .enumerate()
            .filter_map(|(i, col)| {
                if !d.orderable().contains(&col) {
                    tracing::debug!(column = %col, "column is not orderable");
                    return None;
                }
                let dir = match dirs.get(i).map(|s| s.to_ascii_lowercase()) {
                    Some(dir) if dir == "desc" => Order::Desc,
                    _ => Order::Asc,
                };
                Some((col, dir))
            })
            .collect();
        ListArgs { page, limit, order }
    }

    /// Declarative filters of the descriptor ANDed with every registered builder.
    fn filter(&self, args: &Record) -> Condition {
        let d = &self.ctx.descriptor;
        let mut cond = Condition::all();
        if let Some(spec) = d.list_where() {
            cond = cond.add(spec.condition(args, d.aliases(), d.entity_name()));
        }
        for build in self.ctx.hooks.list_where() {
            cond = cond.add(build(args, d.aliases()));
        }
        cond
    }

    fn result_query(&self, parsed: &ListArgs, filter: Condition) -> SelectStatement {
        let d = &self.ctx.descriptor;
        let primary = d.entity_name();
        let mut q = assemble(d, filter);
        for (col, dir) in &parsed.order {
            q.order_by_expr(d.aliases().resolve(col, primary).expr(), dir.clone());
        }
        // without a key in the ordering, pages may overlap or skip rows
        if !parsed.order.iter().any(|(col, _)| d.keys().contains(col)) {
            for key in d.keys() {
                q.order_by_expr(QualifiedColumn::new(primary, key).expr(), Order::Asc);
            }
        }
        q.limit(parsed.limit).offset((parsed.page - 1).saturating_mul(parsed.limit));
        q
    }

    async fn query(&self, args: &Record, parsed: &ListArgs, tx: Option<&DatabaseTransaction>) -> Result<ListResult, ActionError> {
        let d = &self.ctx.descriptor;
        let runner = self.ctx.runner(tx);
        let filter = self.filter(args);
        let rows_q = self.result_query(parsed, filter.clone());
        let count_q = assemble_count(d, filter);
        let (rows, total) = futures::try_join!(runner.fetch_all(&rows_q), runner.count(&count_q))?;
        let window = self.ctx.config.list.local_page_window;
        let listed = ListResult::paginate(rows, total, parsed.page, parsed.limit, window);
        self.ctx.typed_hook(HookSlot::OnListResult, listed, args)
    }

    /// One page of rows matching `args`.
    ///
    /// Query failures are logged and reported as an empty page rather than
    /// returned to the caller.
    #[tracing::instrument(
        name = "list",
        skip_all,
        fields(entity = %self.ctx.descriptor.entity_name())
    )]
    pub async fn list(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> ListResult {
        let parsed = self.parse_args(args);
        let started = std::time::Instant::now();
        match self.query(args, &parsed, tx).await {
            Ok(listed) => {
                tracing::debug!(
                    total = listed.total,
                    page = parsed.page,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "listed"
                );
                listed
            }
            Err(err) => {
                tracing::error!(error = %err, args = %self.ctx.loggable(args), "list query failed");
                ListResult::empty(parsed.page, parsed.limit)
            }
        }
    }
}

#[async_trait]
impl EntityAction for Lister {
    fn name(&self) -> &str {
        "list"
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        to_json(self.list(&args, tx).await)
    }
}

/// `suggest`: a list whose rows are reduced to `{value, label}` pairs.
#[derive(Clone, Debug)]
pub struct Suggester {
    lister: Lister,
}

impl Suggester {
    #[must_use]
    pub fn new(ctx: ActionContext) -> Self {
        Self { lister: Lister::new(ctx) }
    }

    fn tuple(&self, row: &Record) -> SuggestTuple {
        let ctx = self.lister.context();
        if let Some(custom) = ctx.hooks.suggest() {
            return custom(row);
        }
        let d = &ctx.descriptor;
        let joined = || Value::String(aggregate_keys(row, d.keys(), ":"));
        let pick = |key: Option<&str>| match key {
            Some(key) => row.get(key).cloned().unwrap_or(Value::Null),
            None => joined(),
        };
        SuggestTuple {
            value: pick(d.suggest_value_key()),
            label: pick(d.suggest_label_key()),
        }
    }

    /// One page of suggestions; degrades like [`Lister::list`].
    pub async fn suggest(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> ListResult<SuggestTuple> {
        self.lister.list(args, tx).await.map(|row| self.tuple(&row))
    }
}

#[async_trait]
impl EntityAction for Suggester {
    fn name(&self) -> &str {
        "suggest"
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        to_json(self.suggest(&args, tx).await)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn local_pages_near_the_front_start_at_one() {
        assert_eq!(local_pages(3, 12, 10), (1..=10).collect::<Vec<_>>());
        assert_eq!(local_pages(1, 1, 10), vec![1]);
    }

    #[test]
    fn local_pages_center_in_the_middle() {
        assert_eq!(local_pages(22, 100, 10), vec![18, 19, 20, 21, 22, 23, 24, 25, 26, 27]);
    }

    #[test]
    fn local_pages_near_the_back_end_at_last_page() {
        assert_eq!(local_pages(97, 100, 10), (91..=100).collect::<Vec<_>>());
        assert_eq!(local_pages(90, 100, 10), (91..=100).collect::<Vec<_>>());
    }

    #[test]
    fn local_pages_past_the_end_still_window_the_tail() {
        assert_eq!(local_pages(9, 4, 10), vec![1, 2, 3, 4]);
        assert!(local_pages(1, 0, 10).is_empty());
    }

    #[test]
    fn paginate_marks_missing_neighbours_as_none() {
        let single: ListResult<u8> = ListResult::paginate(vec![1, 2], 2, 1, 10, 10);
        assert_eq!(single.total_pages, 1);
        assert_eq!((single.next_page, single.prev_page, single.first_page, single.last_page), (None, None, None, None));

        let middle: ListResult<u8> = ListResult::paginate(Vec::new(), 45, 3, 10, 10);
        assert_eq!(middle.total_pages, 5);
        assert_eq!(middle.next_page, Some(4));
        assert_eq!(middle.prev_page, Some(2));
        assert_eq!(middle.first_page, Some(1));
        assert_eq!(middle.last_page, Some(5));
    }

    #[test]
    fn empty_result_serializes_nulls() {
        let v = serde_json::to_value(ListResult::<Record>::empty(2, 25)).unwrap();
        assert_eq!(v["currentPage"], 2);
        assert_eq!(v["limit"], 25);
        assert!(v["nextPage"].is_null());
        assert_eq!(v["localPages"], serde_json::json!([]));
    }
}
