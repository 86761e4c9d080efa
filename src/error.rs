use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading configuration or resolving a request.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A resolution failed because configuration data is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configuration snapshot could not be parsed at all.
    #[error("failed to parse configuration snapshot")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    SnapshotParse(#[source] Arc<serde_json::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::SnapshotParse(Arc::new(value))
    }
}

/// Fatal configuration problems. These abort a single resolution but never the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ConfigError {
    /// Parent links of nested experiments form a cycle.
    #[error("experiment {experiment_id} is reachable from itself through nested test links")]
    #[serde(rename_all = "camelCase")]
    ConfigurationCycle {
        /// The experiment that was reached a second time.
        experiment_id: String,
    },

    /// The nested experiment chain is deeper than the configured bound.
    #[error("nested experiment chain is deeper than {max_depth} levels")]
    #[serde(rename_all = "camelCase")]
    DepthExceeded {
        /// Configured bound.
        max_depth: usize,
    },
}

/// Data problems recovered locally with a deterministic fallback.
///
/// Warnings never fail a resolution. They are recorded in the audit trail of the
/// [`ResolvedConfig`](crate::ResolvedConfig) and logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum DataIntegrityWarning {
    /// Variant traffic percentages do not sum to 100.
    #[serde(rename_all = "camelCase")]
    TrafficMismatch { experiment_id: String, total: u32 },
    /// No variant is flagged as control; the first variant by id stands in.
    #[serde(rename_all = "camelCase")]
    MissingControl { experiment_id: String },
    /// More than one variant is flagged as control; the first by id is used.
    #[serde(rename_all = "camelCase")]
    MultipleControls { experiment_id: String },
    /// A live experiment has no variants and was skipped.
    #[serde(rename_all = "camelCase")]
    EmptyExperiment { experiment_id: String },
    /// A nested experiment's `level` disagrees with its depth in the tree.
    #[serde(rename_all = "camelCase")]
    LevelMismatch {
        experiment_id: String,
        expected: u32,
        found: u32,
    },
    /// Parent links of nested experiments form a cycle. Named by the lowest id on the cycle.
    /// Resolving a config that reaches it fails with [`ConfigError::ConfigurationCycle`].
    #[serde(rename_all = "camelCase")]
    ExperimentCycle { experiment_id: String },
    /// A targeting condition could not be evaluated and was treated as not matching.
    #[serde(rename_all = "camelCase")]
    MalformedCondition {
        rule_id: String,
        attribute: String,
        reason: String,
    },
    /// More than one active default config exists in the same scope; the lowest id is used.
    #[serde(rename_all = "camelCase")]
    DuplicateDefault {
        publisher_id: String,
        website_id: Option<String>,
        config_id: String,
    },
    /// A targeting rule points at a config that is not in the snapshot.
    #[serde(rename_all = "camelCase")]
    OrphanRule { rule_id: String, config_id: String },
    /// A variant overrides a bidder that is not in the merged bidder list.
    #[serde(rename_all = "camelCase")]
    UnknownBidderOverride {
        variant_id: String,
        bidder_code: String,
    },
}

impl std::fmt::Display for DataIntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrafficMismatch {
                experiment_id,
                total,
            } => write!(
                f,
                "experiment {experiment_id}: variant traffic sums to {total}, expected 100"
            ),
            Self::MissingControl { experiment_id } => {
                write!(f, "experiment {experiment_id}: no control variant")
            }
            Self::MultipleControls { experiment_id } => {
                write!(f, "experiment {experiment_id}: more than one control variant")
            }
            Self::EmptyExperiment { experiment_id } => {
                write!(f, "experiment {experiment_id}: no variants")
            }
            Self::LevelMismatch {
                experiment_id,
                expected,
                found,
            } => write!(
                f,
                "experiment {experiment_id}: level is {found}, tree depth is {expected}"
            ),
            Self::ExperimentCycle { experiment_id } => {
                write!(f, "experiment {experiment_id}: parent links form a cycle")
            }
            Self::MalformedCondition {
                rule_id,
                attribute,
                reason,
            } => write!(f, "rule {rule_id}: condition on {attribute:?}: {reason}"),
            Self::DuplicateDefault {
                publisher_id,
                website_id,
                config_id,
            } => write!(
                f,
                "publisher {publisher_id}, website {website_id:?}: several active defaults, using {config_id}"
            ),
            Self::OrphanRule { rule_id, config_id } => {
                write!(f, "rule {rule_id}: unknown config {config_id}")
            }
            Self::UnknownBidderOverride {
                variant_id,
                bidder_code,
            } => write!(
                f,
                "variant {variant_id}: override for bidder {bidder_code:?} which is not configured"
            ),
        }
    }
}
