use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::assembly::{ManifestAssembler, ManifestValidator};
use crate::context::SyncContext;
use crate::domain::Manifest;
use crate::error::{Result, SyncError};
use crate::rcrainfo::RcrainfoPort;
use crate::search::{SearchFilters, SearchQueryBuilder};
use crate::storage::Storage;

/// Partition of a batch pull by outcome, each in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResults {
    pub success: Vec<String>,
    pub error: Vec<String>,
}

/// Drives manifest search and batch pulls against RCRAInfo
pub struct SyncOrchestrator {
    username: String,
    rcrainfo: Arc<dyn RcrainfoPort>,
    storage: Arc<dyn Storage>,
    query_builder: SearchQueryBuilder,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("username", &self.username)
            .field("rcrainfo", &"<Arc<dyn RcrainfoPort>>")
            .field("storage", &"<Arc<dyn Storage>>")
            .finish()
    }
}

impl SyncOrchestrator {
    pub fn new(
        username: impl Into<String>,
        rcrainfo: Arc<dyn RcrainfoPort>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            username: username.into(),
            rcrainfo,
            storage,
            query_builder: SearchQueryBuilder::default(),
        }
    }

    pub fn with_query_builder(mut self, query_builder: SearchQueryBuilder) -> Self {
        self.query_builder = query_builder;
        self
    }

    /// Pull each manifest from RCRAInfo and save it.
    ///
    /// Items are independent: a failed fetch or save is logged, recorded
    /// under `error`, and the batch moves on. A tracking number repeated in
    /// the input is pulled once and recorded once.
    #[instrument(skip_all, fields(batch_size = tracking_numbers.len()))]
    pub async fn pull_manifests(&self, tracking_numbers: &[String]) -> PullResults {
        let ctx = SyncContext::new(&self.username);
        info!(run_id = %ctx.run_id, user = %ctx.username, "Starting manifest pull");

        let mut results = PullResults::default();
        let mut seen = HashSet::with_capacity(tracking_numbers.len());
        for mtn in tracking_numbers {
            if !seen.insert(mtn.as_str()) {
                debug!("skipping repeated manifest {}", mtn);
                continue;
            }
            match self.pull_one(&ctx, mtn).await {
                Ok(manifest) => {
                    debug!("pulled manifest {}", manifest.mtn);
                    counter!("trak_manifest_pull_total", "outcome" => "success").increment(1);
                    results.success.push(mtn.clone());
                }
                Err(e) => {
                    warn!("error pulling manifest {}: {}", mtn, e);
                    counter!("trak_manifest_pull_total", "outcome" => "error").increment(1);
                    results.error.push(mtn.clone());
                }
            }
        }

        info!(
            run_id = %ctx.run_id,
            "Finished manifest pull: {} succeeded, {} failed",
            results.success.len(),
            results.error.len()
        );
        results
    }

    async fn pull_one(&self, ctx: &SyncContext, mtn: &str) -> Result<Manifest> {
        let document = self.retrieve_manifest(mtn).await?;
        self.save_manifest(ctx, &document).await
    }

    async fn retrieve_manifest(&self, mtn: &str) -> Result<Value> {
        let response = self.rcrainfo.get_manifest(mtn).await?;
        if response.is_ok() {
            debug!("manifest pulled {}", mtn);
            Ok(response.body)
        } else {
            warn!("error retrieving manifest {}", mtn);
            Err(SyncError::Retrieval {
                mtn: mtn.to_string(),
                body: response.body,
            })
        }
    }

    /// Validate `document` and persist its graph in one transaction.
    /// On any failure the transaction is dropped and nothing is kept.
    #[instrument(skip_all, fields(run_id = %ctx.run_id))]
    pub async fn save_manifest(&self, ctx: &SyncContext, document: &Value) -> Result<Manifest> {
        let payload = ManifestValidator::validate(document)?;
        debug!("manifest data is valid");

        let mut tx = self.storage.begin().await?;
        let manifest = ManifestAssembler::save(ctx, tx.as_mut(), &payload).await?;
        tx.commit().await?;
        Ok(manifest)
    }

    /// Search RCRAInfo for tracking numbers. A non-ok response is an empty
    /// result, not an error.
    #[instrument(skip_all)]
    pub async fn search(&self, filters: &SearchFilters) -> Result<Vec<String>> {
        let query = self.query_builder.build(filters)?;
        debug!("rcrainfo manifest search parameters {:?}", query);

        let response = self.rcrainfo.search_manifests(&query).await?;
        debug!("rcrainfo manifest search response {}", response.body);

        if !response.is_ok() {
            counter!("trak_manifest_search_total", "outcome" => "not_ok").increment(1);
            warn!("manifest search returned status {}", response.status);
            return Ok(Vec::new());
        }
        counter!("trak_manifest_search_total", "outcome" => "ok").increment(1);
        let tracking_numbers: Vec<String> = serde_json::from_value(response.body)?;
        Ok(tracking_numbers)
    }

    /// Search, then pull everything the search found
    pub async fn sync_site(&self, filters: &SearchFilters) -> Result<PullResults> {
        let tracking_numbers = self.search(filters).await?;
        info!("search found {} manifests", tracking_numbers.len());
        Ok(self.pull_manifests(&tracking_numbers).await)
    }
}
