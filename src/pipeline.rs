use crate::cancel::CancellationToken;
use crate::discovery::{self, redact_url_for_log};
use crate::download::{self, DownloadOutcome, SkipReason};
use crate::manifest::RunManifest;
use crate::paths::StorePaths;
use crate::query::Query;
use crate::ratio;
use crate::{DiscoveryError, EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

pub const MAX_TARGET_COUNT: usize = 50;
pub const DEFAULT_TARGET_COUNT: usize = 10;
const DEFAULT_PACING_DELAY_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// What the caller asked for; immutable once a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub target_count: usize,
    pub aspect_ratio_label: String,
    pub tolerance: f64,
}

/// Clamps out-of-range values instead of failing; the query itself is
/// validated during normalization at run start.
pub fn build_search_request(
    query: String,
    target_count: Option<usize>,
    aspect_ratio_label: Option<String>,
    tolerance: Option<f64>,
) -> SearchRequest {
    SearchRequest {
        query,
        target_count: target_count
            .unwrap_or(DEFAULT_TARGET_COUNT)
            .clamp(1, MAX_TARGET_COUNT),
        aspect_ratio_label: aspect_ratio_label
            .unwrap_or_else(|| ratio::UNCONSTRAINED_LABEL.to_string()),
        tolerance: tolerance
            .unwrap_or(ratio::DEFAULT_TOLERANCE)
            .clamp(ratio::MIN_TOLERANCE, ratio::MAX_TOLERANCE),
    }
}

/// Environment knobs for a run. The pacing delay and the endpoint are
/// configuration rather than constants so tests can shrink or redirect
/// them.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub search_endpoint: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub pacing_delay_ms: u64,
}

impl PipelineConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            search_endpoint: discovery::DEFAULT_SEARCH_ENDPOINT.to_string(),
            user_agent: discovery::DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            pacing_delay_ms: DEFAULT_PACING_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Normalizing,
    Discovering,
    Extracting,
    Downloading,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Normalizing => "normalizing",
            RunPhase::Discovering => "discovering",
            RunPhase::Extracting => "extracting",
            RunPhase::Downloading => "downloading",
        }
    }
}

/// Stored paths in completion order plus the cancellation flag the caller
/// needs to tell "canceled with partial results" apart from "completed
/// with fewer results than requested".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub stored: Vec<PathBuf>,
    pub canceled: bool,
    pub requested: usize,
    pub ratio_skips: usize,
    pub duplicate_skips: usize,
    pub failures: usize,
}

impl RunSummary {
    fn empty(requested: usize) -> Self {
        Self {
            stored: Vec::new(),
            canceled: false,
            requested,
            ratio_skips: 0,
            duplicate_skips: 0,
            failures: 0,
        }
    }

    fn canceled_empty(requested: usize) -> Self {
        Self {
            canceled: true,
            ..Self::empty(requested)
        }
    }
}

/// One end-to-end run: normalize, discover, extract, then fetch-convert
/// candidates in order until the target count is reached, the candidates
/// run out, or the token fires. Per-candidate failures never abort the
/// run; a run that yields nothing without being canceled is an error.
pub fn run_search<FProgress, FLog>(
    config: &PipelineConfig,
    request: &SearchRequest,
    manifest_path: Option<&Path>,
    token: &CancellationToken,
    mut on_progress: FProgress,
    mut log_line: FLog,
) -> Result<RunSummary>
where
    FProgress: FnMut(usize, usize),
    FLog: FnMut(&str, &str, serde_json::Value),
{
    token.clear();

    log_line(
        "info",
        "run_begin",
        serde_json::json!({
            "query": request.query,
            "target_count": request.target_count,
            "aspect_ratio_label": request.aspect_ratio_label,
            "tolerance": request.tolerance,
        }),
    );

    log_phase(&mut log_line, RunPhase::Normalizing);
    let query = Query::normalize(&request.query)?;
    let store = StorePaths::new(config.base_dir.clone());
    let folder = store.ensure_query_dir(&query)?;

    let mut agent_config = ureq::Agent::config_builder();
    agent_config = agent_config
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(config.request_timeout_secs)))
        .user_agent(config.user_agent.as_str());
    let agent: ureq::Agent = agent_config.build().into();

    log_phase(&mut log_line, RunPhase::Discovering);
    let html = match discovery::fetch_search_page(&agent, &config.search_endpoint, &query, token) {
        Ok(html) => html,
        Err(DiscoveryError::Canceled) => {
            log_line("info", "run_canceled", serde_json::json!({ "stored": 0 }));
            return Ok(RunSummary::canceled_empty(request.target_count));
        }
        Err(err) => return Err(EngineError::Discovery(err)),
    };
    log_line(
        "info",
        "search_page_fetched",
        serde_json::json!({ "bytes": html.len() }),
    );

    log_phase(&mut log_line, RunPhase::Extracting);
    let candidates = discovery::extract_image_urls(&html, token);
    log_line(
        "info",
        "candidates_extracted",
        serde_json::json!({ "count": candidates.len() }),
    );
    if candidates.is_empty() {
        if token.is_canceled() {
            log_line("info", "run_canceled", serde_json::json!({ "stored": 0 }));
            return Ok(RunSummary::canceled_empty(request.target_count));
        }
        return Err(EngineError::NoCandidates);
    }

    let target = ratio::parse_ratio(&request.aspect_ratio_label);

    log_phase(&mut log_line, RunPhase::Downloading);
    let mut summary = RunSummary::empty(request.target_count);
    let mut manifest = RunManifest::create(manifest_path)?;

    for url in &candidates {
        if token.is_canceled() {
            summary.canceled = true;
            break;
        }
        if summary.stored.len() >= request.target_count {
            break;
        }

        let outcome = download::process_candidate(
            &agent,
            url,
            &folder,
            &query,
            &target,
            request.tolerance,
            token,
        );
        manifest.record(url, &outcome)?;

        match outcome {
            DownloadOutcome::Stored(path) => {
                log_line(
                    "info",
                    "candidate_stored",
                    serde_json::json!({
                        "url": redact_url_for_log(url),
                        "path": path.to_string_lossy(),
                    }),
                );
                summary.stored.push(path);
                on_progress(summary.stored.len(), request.target_count);

                // Pacing applies between attempts that follow a successful
                // store; skipped and failed candidates move on immediately.
                if summary.stored.len() < request.target_count && config.pacing_delay_ms > 0 {
                    thread::sleep(Duration::from_millis(config.pacing_delay_ms));
                }
            }
            DownloadOutcome::Skipped(SkipReason::Canceled) => {
                log_line(
                    "info",
                    "candidate_skipped",
                    serde_json::json!({
                        "url": redact_url_for_log(url),
                        "reason": "canceled",
                    }),
                );
                summary.canceled = true;
                break;
            }
            DownloadOutcome::Skipped(reason) => {
                match reason {
                    SkipReason::RatioMismatch => summary.ratio_skips += 1,
                    SkipReason::Duplicate => summary.duplicate_skips += 1,
                    SkipReason::Canceled => {}
                }
                log_line(
                    "info",
                    "candidate_skipped",
                    serde_json::json!({
                        "url": redact_url_for_log(url),
                        "reason": DownloadOutcome::Skipped(reason).status_label(),
                    }),
                );
            }
            DownloadOutcome::Failed(reason) => {
                summary.failures += 1;
                let outcome = DownloadOutcome::Failed(reason);
                log_line(
                    "warn",
                    "candidate_failed",
                    serde_json::json!({
                        "url": redact_url_for_log(url),
                        "reason": outcome.status_label(),
                        "detail": outcome.detail(),
                    }),
                );
            }
        }
    }

    manifest.finish()?;

    if summary.canceled {
        log_line(
            "info",
            "run_canceled",
            serde_json::json!({ "stored": summary.stored.len() }),
        );
        return Ok(summary);
    }

    if summary.stored.is_empty() {
        log_line(
            "warn",
            "run_failed",
            serde_json::json!({
                "reason": "no_images_stored",
                "ratio_skips": summary.ratio_skips,
                "duplicate_skips": summary.duplicate_skips,
                "failures": summary.failures,
            }),
        );
        return Err(EngineError::DownloadFailed);
    }

    log_line(
        "info",
        "run_completed",
        serde_json::json!({
            "stored": summary.stored.len(),
            "ratio_skips": summary.ratio_skips,
            "duplicate_skips": summary.duplicate_skips,
            "failures": summary.failures,
        }),
    );
    Ok(summary)
}

fn log_phase<FLog>(log_line: &mut FLog, phase: RunPhase)
where
    FLog: FnMut(&str, &str, serde_json::Value),
{
    log_line(
        "info",
        "phase_changed",
        serde_json::json!({ "phase": phase.as_str() }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_clamps_count_and_tolerance() {
        let request = build_search_request("cats".to_string(), Some(500), None, Some(2.0));
        assert_eq!(request.target_count, MAX_TARGET_COUNT);
        assert_eq!(request.tolerance, ratio::MAX_TOLERANCE);
        assert_eq!(request.aspect_ratio_label, ratio::UNCONSTRAINED_LABEL);

        let request = build_search_request("cats".to_string(), Some(0), None, Some(0.0));
        assert_eq!(request.target_count, 1);
        assert_eq!(request.tolerance, ratio::MIN_TOLERANCE);
    }

    #[test]
    fn build_request_uses_defaults_when_unset() {
        let request = build_search_request("cats".to_string(), None, None, None);
        assert_eq!(request.target_count, DEFAULT_TARGET_COUNT);
        assert_eq!(request.tolerance, ratio::DEFAULT_TOLERANCE);
    }

    #[test]
    fn invalid_query_fails_before_any_network_access() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = PipelineConfig::new(dir.path().to_path_buf());
        // Unroutable: reaching the network would hang, not fail fast.
        config.search_endpoint = "http://192.0.2.1:9/images".to_string();

        let request = build_search_request(r#"\/:*?"<>|"#.to_string(), Some(1), None, None);
        let token = CancellationToken::new();
        let result = run_search(&config, &request, None, &token, |_, _| {}, |_, _, _| {});
        assert!(matches!(result, Err(EngineError::InvalidQuery)));
    }
}
