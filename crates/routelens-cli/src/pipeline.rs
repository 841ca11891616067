use futures::stream::{self, StreamExt};
use routelens_ai::{analyze, save_insight, ModelClient};
use routelens_analysis::{
    build_payload, clear_payload_dir, load_payloads, refine, sanitize, save_payload,
};
use routelens_core::{AnalysisPayload, Endpoint, Result, RouteLensError, Settings};
use routelens_parser::{controller_file_for, EndpointScanner, SourceExtractor};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How the selection collaborator narrowed this run.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Every discovered endpoint.
    All,
    /// Endpoints named by their selection id (`"<METHOD> <path> → <handler>"`).
    Ids(Vec<String>),
}

/// Counts reported at the end of a run. Partial success is an expected
/// terminal state, not a failure.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub discovered: usize,
    pub selected: usize,
    pub payloads_written: usize,
    pub extraction_skipped: usize,
    pub insights_written: usize,
    pub model_failures: usize,
    pub unrecoverable_responses: usize,
}

/// Sequences the five analysis stages over a selected route file and a
/// selected subset of endpoints, then drives the fresh-payload review sweep.
pub struct Pipeline {
    settings: Settings,
    scanner: EndpointScanner,
    extractor: SourceExtractor,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            scanner: EndpointScanner::new(),
            extractor: SourceExtractor::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Scan one named route file, or the whole route directory.
    pub async fn discover(&self, route_file: Option<&str>) -> Result<Vec<Endpoint>> {
        match route_file {
            Some(name) => {
                let path = self.resolve_route_file(name)?;
                self.scanner.scan_file(&path).await
            }
            None => self.scanner.scan_dir(&self.settings.paths.routes_dir).await,
        }
    }

    fn resolve_route_file(&self, name: &str) -> Result<PathBuf> {
        let path = self.settings.paths.routes_dir.join(name);
        if !path.exists() {
            return Err(RouteLensError::InvalidSelection(format!(
                "route file '{}' does not exist in {}",
                name,
                self.settings.paths.routes_dir.display()
            )));
        }
        Ok(path)
    }

    /// Apply the selection to the discovered endpoints. Empty selections are
    /// rejected: a run over nothing is a caller mistake, not a no-op.
    pub fn select(&self, endpoints: Vec<Endpoint>, selection: &Selection) -> Result<Vec<Endpoint>> {
        let chosen = match selection {
            Selection::All => endpoints,
            Selection::Ids(ids) => {
                if ids.is_empty() {
                    return Err(RouteLensError::InvalidSelection(
                        "no endpoints selected".to_string(),
                    ));
                }
                endpoints
                    .into_iter()
                    .filter(|e| ids.contains(&e.selection_id()))
                    .collect()
            }
        };
        if chosen.is_empty() {
            return Err(RouteLensError::InvalidSelection(
                "selection matched no discovered endpoints".to_string(),
            ));
        }
        Ok(chosen)
    }

    /// Phase 1: extract, refine, sanitize and persist one payload per
    /// selected endpoint. Extraction misses are skipped with a warning and
    /// counted; persistence failures abort the run.
    pub async fn build_payloads(
        &self,
        endpoints: &[Endpoint],
        keep_existing: bool,
        report: &mut RunReport,
    ) -> Result<()> {
        let payload_dir = self.settings.paths.payload_dir.clone();
        if !keep_existing {
            // Only this run's payloads should be swept in phase 2; stale
            // leftovers must not be double-reviewed.
            clear_payload_dir(&payload_dir).await?;
        }

        for endpoint in endpoints {
            let controller = controller_file_for(Path::new(&endpoint.source_file_ref));
            let function = match self
                .extractor
                .extract_function(&controller, &endpoint.handler_name)
                .await?
            {
                Some(function) => function,
                None => {
                    warn!(
                        "handler '{}' not found in {} (route {}), skipping",
                        endpoint.handler_name,
                        controller.display(),
                        endpoint.selection_id()
                    );
                    report.extraction_skipped += 1;
                    continue;
                }
            };

            let refined = refine(&function);
            let sanitized = sanitize(&refined.cleaned_code);

            let mut metadata = HashMap::new();
            metadata.insert(
                "route_file".to_string(),
                serde_json::json!(endpoint.source_file_ref),
            );
            metadata.insert("summary".to_string(), serde_json::json!(refined.summary));
            metadata.insert(
                "sanitizer_note".to_string(),
                serde_json::json!(sanitized.note),
            );

            let payload = build_payload(
                endpoint,
                &function.name,
                function.is_async,
                function.line_count(),
                &refined,
                &sanitized,
                metadata,
            );
            let path = save_payload(&payload, &payload_dir).await?;
            info!("payload written: {}", path.display());
            report.payloads_written += 1;
        }
        Ok(())
    }

    /// Phase 2: sweep the request-artifact directory and review each payload.
    /// Model calls are independent per payload and may run under a bounded
    /// worker pool; artifacts are keyed per-handler and published atomically,
    /// so parallelism does not change observable results. Exhausted retries
    /// fail that one payload's analysis, never the whole sweep.
    pub async fn review(
        &self,
        client: &dyn ModelClient,
        concurrency: usize,
        report: &mut RunReport,
    ) -> Result<()> {
        let payloads = load_payloads(&self.settings.paths.payload_dir).await?;
        if payloads.is_empty() {
            info!("no fresh payloads to review");
            return Ok(());
        }

        let insights_dir = self.settings.paths.insights_dir.clone();
        let max_attempts = self.settings.model.max_retries;
        let results: Vec<ReviewOutcome> = stream::iter(payloads)
            .map(|(path, payload)| {
                let insights_dir = insights_dir.clone();
                async move { review_one(client, &path, &payload, max_attempts, &insights_dir).await }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        for outcome in results {
            match outcome {
                ReviewOutcome::Saved { recovered } => {
                    report.insights_written += 1;
                    if !recovered {
                        report.unrecoverable_responses += 1;
                    }
                }
                ReviewOutcome::Failed => report.model_failures += 1,
                ReviewOutcome::Fatal(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// The whole state machine: discover, select, persist payloads, then
    /// sweep and review. Zero usable endpoints is still a successful run.
    pub async fn run(
        &self,
        route_file: Option<&str>,
        selection: &Selection,
        client: &dyn ModelClient,
        concurrency: usize,
        keep_existing: bool,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();

        let discovered = self.discover(route_file).await?;
        report.discovered = discovered.len();
        if discovered.is_empty() {
            warn!("no endpoints discovered; nothing to analyze");
            return Ok(report);
        }

        let selected = self.select(discovered, selection)?;
        report.selected = selected.len();

        self.build_payloads(&selected, keep_existing, &mut report)
            .await?;
        self.review(client, concurrency, &mut report).await?;

        info!(
            "run complete: {} payloads, {} insights, {} skipped, {} model failures",
            report.payloads_written,
            report.insights_written,
            report.extraction_skipped,
            report.model_failures
        );
        Ok(report)
    }
}

enum ReviewOutcome {
    Saved { recovered: bool },
    Failed,
    Fatal(RouteLensError),
}

async fn review_one(
    client: &dyn ModelClient,
    path: &Path,
    payload: &AnalysisPayload,
    max_attempts: u32,
    insights_dir: &Path,
) -> ReviewOutcome {
    let handler = &payload.endpoint.handler_name;
    match analyze(client, payload, max_attempts).await {
        Ok(review) => {
            if review.insight.is_error() {
                warn!(
                    "response for '{}' was unrecoverable; saving error-shaped insight",
                    handler
                );
            }
            let recovered = !review.insight.is_error();
            match save_insight(&review.insight, handler, insights_dir).await {
                Ok(saved) => {
                    info!("insight written: {}", saved.display());
                    ReviewOutcome::Saved { recovered }
                }
                Err(e) => ReviewOutcome::Fatal(e),
            }
        }
        Err(e @ RouteLensError::ModelExhausted { .. }) => {
            warn!("analysis of {} failed: {}", path.display(), e);
            ReviewOutcome::Failed
        }
        Err(e) => ReviewOutcome::Fatal(e),
    }
}
