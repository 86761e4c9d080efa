//! Serve events handed to the caller after each resolution.
use serde::{Deserialize, Serialize};

use crate::{merge::ExperimentAssignment, models::Timestamp, BlockedConfig, ResolvedConfig};

/// One wrapper config served (or blocked) for one request.
///
/// This is what the serving layer persists as a serve-log row. It is also where impression
/// counters are bumped: resolution itself never writes anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ServeEvent {
    pub publisher_id: String,
    pub website_id: Option<String>,
    pub config_id: String,
    pub config_version: u64,
    pub matched_rule_id: Option<String>,
    pub blocked: bool,
    #[serde(default)]
    pub experiments: Vec<ExperimentAssignment>,
    pub bucket_key: String,
    pub timestamp: Timestamp,
}

impl ServeEvent {
    pub(crate) fn resolved(
        resolved: &ResolvedConfig,
        website_id: Option<&str>,
        bucket_key: &str,
        timestamp: Timestamp,
    ) -> ServeEvent {
        ServeEvent {
            publisher_id: resolved.publisher_id.clone(),
            website_id: website_id.map(str::to_owned),
            config_id: resolved.config_id.clone(),
            config_version: resolved.config_version,
            matched_rule_id: resolved.audit.matched_rule_id.clone(),
            blocked: false,
            experiments: resolved.audit.experiments.clone(),
            bucket_key: bucket_key.to_owned(),
            timestamp,
        }
    }

    pub(crate) fn blocked(
        blocked: &BlockedConfig,
        website_id: Option<&str>,
        bucket_key: &str,
        timestamp: Timestamp,
    ) -> ServeEvent {
        ServeEvent {
            publisher_id: blocked.publisher_id.clone(),
            website_id: website_id.map(str::to_owned),
            config_id: blocked.config_id.clone(),
            config_version: blocked.config_version,
            matched_rule_id: blocked.matched_rule_id.clone(),
            blocked: true,
            experiments: Vec::new(),
            bucket_key: bucket_key.to_owned(),
            timestamp,
        }
    }
}

/// Receives [`ServeEvent`]s. Implemented for any `Fn(ServeEvent)`.
pub trait ServeLogger {
    #[allow(missing_docs)]
    fn log_serve(&self, event: ServeEvent);
}

pub(crate) struct NoopServeLogger;
impl ServeLogger for NoopServeLogger {
    fn log_serve(&self, _event: ServeEvent) {}
}

impl<T: Fn(ServeEvent)> ServeLogger for T {
    fn log_serve(&self, event: ServeEvent) {
        self(event);
    }
}
