//! `iterate`: walk every page of a lister for batch consumers.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lister::Lister;
use crate::config::IterateConfig;
use crate::error::ActionError;
use crate::record::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterateSummary {
    pub pages: u64,
    pub records: u64,
}

#[derive(Clone, Debug)]
pub struct PageIterator {
    lister: Lister,
    config: IterateConfig,
}

impl PageIterator {
    #[must_use]
    pub fn new(lister: Lister) -> Self {
        let config = lister.context().config.iterate;
        Self { lister, config }
    }

    #[must_use]
    pub fn with_config(mut self, config: IterateConfig) -> Self {
        self.config = config;
        self
    }

    /// Hand every page of rows matching `args` to `on_page`, in page order.
    ///
    /// Stops after the last page, when the lister reports the current page as
    /// the next one, or after `max_iterations` pages.
    ///
    /// # Errors
    /// `Timeout` when the walk outlives the configured deadline; any error
    /// returned by `on_page`, which also stops the walk.
    #[tracing::instrument(
        name = "iterate",
        skip_all,
        fields(entity = %self.lister.context().descriptor.entity_name())
    )]
    pub async fn iterate<F, Fut>(&self, args: &Record, on_page: F) -> Result<IterateSummary, ActionError>
    where
        F: FnMut(Vec<Record>) -> Fut,
        Fut: Future<Output = Result<(), ActionError>>,
    {
        let deadline = self.config.timeout;
        tracing::info!(page_limit = self.config.page_limit, "iterating");
        match tokio::time::timeout(deadline, self.walk(args, on_page)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(format!(
                "iterate{} timeout of {} exceeded",
                self.lister.context().descriptor.pascal_name(),
                humantime_serde::re::humantime::format_duration(deadline)
            ))),
        }
    }

    async fn walk<F, Fut>(&self, args: &Record, mut on_page: F) -> Result<IterateSummary, ActionError>
    where
        F: FnMut(Vec<Record>) -> Fut,
        Fut: Future<Output = Result<(), ActionError>>,
    {
        let mut summary = IterateSummary::default();
        let mut page = 1;
        while summary.pages < self.config.max_iterations {
            let mut page_args = args.clone();
            page_args.insert("page".to_owned(), Value::from(page));
            page_args.insert("limit".to_owned(), Value::from(self.config.page_limit));

            let listed = self.lister.list(&page_args, None).await;
            summary.pages += 1;
            summary.records += listed.result.len() as u64;
            on_page(listed.result).await?;

            match listed.next_page {
                None => break,
                Some(next) if next == page => {
                    tracing::warn!(page, "lister returned the current page as the next page");
                    break;
                }
                Some(next) => page = next,
            }
        }
        Ok(summary)
    }
}
