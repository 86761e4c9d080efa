//! The single pure entry point: request in, wrapper configuration out.
use serde::{Deserialize, Serialize};

use crate::{
    experiments::resolve_experiments,
    merge::merge,
    models::{TargetingRule, Timestamp, WrapperConfig},
    selector::{publisher_default, select, Selection},
    ConfigError, DataIntegrityWarning, RequestContext, ResolvedConfig, Snapshot,
};

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Resolution {
    /// Wrapper settings to serve.
    Resolved(ResolvedConfig),
    /// The wrapper must not initialize for this request.
    Blocked(BlockedConfig),
    /// No config applies. The caller falls back to its built-in behavior.
    NotConfigured,
}

impl Resolution {
    /// The resolved config, if any.
    pub fn resolved(&self) -> Option<&ResolvedConfig> {
        match self {
            Resolution::Resolved(resolved) => Some(resolved),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Resolution::Blocked(_))
    }
}

/// The config that blocked the wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BlockedConfig {
    pub publisher_id: String,
    pub config_id: String,
    pub config_name: String,
    pub config_version: u64,
    pub matched_rule_id: Option<String>,
}

impl BlockedConfig {
    fn new(config: &WrapperConfig, matched_rule: Option<&TargetingRule>) -> BlockedConfig {
        BlockedConfig {
            publisher_id: config.publisher_id.clone(),
            config_id: config.id.clone(),
            config_name: config.name.clone(),
            config_version: config.version,
            matched_rule_id: matched_rule.map(|rule| rule.id.clone()),
        }
    }
}

/// Resolve the wrapper configuration for one request.
///
/// Pure and deterministic: the same snapshot, context, and `now` always produce the same
/// resolution. `now` only decides which experiments are live and never appears in the output.
///
/// A missing snapshot (configuration not loaded yet) resolves to [`Resolution::NotConfigured`].
/// Errors are limited to inconsistent experiment trees; everything else is recovered and
/// reported through [`AuditTrail::warnings`](crate::AuditTrail::warnings).
pub fn resolve(
    snapshot: Option<&Snapshot>,
    publisher_id: &str,
    website_id: Option<&str>,
    context: &RequestContext,
    now: Timestamp,
    max_depth: usize,
) -> Result<Resolution, ConfigError> {
    let Some(snapshot) = snapshot else {
        log::warn!(target: "prebid", publisher_id, website_id:debug; "resolving a request before configuration has been loaded");
        return Ok(Resolution::NotConfigured);
    };

    let configs = snapshot.configs_for(publisher_id, website_id);
    let mut warnings = Vec::new();
    let selection = select(&configs, snapshot.rules_by_config(), context, &mut warnings);

    let (config, matched_rule) = match selection {
        Selection::Matched {
            config,
            matched_rule,
        } => (config, matched_rule),
        Selection::Blocked {
            config,
            matched_rule,
        } => {
            log_warnings(publisher_id, &warnings);
            log::trace!(target: "prebid",
                        publisher_id,
                        website_id:debug,
                        config_id:display = config.id;
                        "wrapper blocked");
            return Ok(Resolution::Blocked(BlockedConfig::new(config, matched_rule)));
        }
        Selection::NotConfigured => {
            log_warnings(publisher_id, &warnings);
            log::trace!(target: "prebid", publisher_id, website_id:debug; "no wrapper config applies");
            return Ok(Resolution::NotConfigured);
        }
    };

    let chain = resolve_experiments(
        snapshot.experiments(),
        &config.id,
        &context.bucket_key,
        now,
        max_depth,
        &mut warnings,
    )
    .inspect_err(|err| {
        log::warn!(target: "prebid",
                   publisher_id,
                   website_id:debug,
                   config_id:display = config.id;
                   "error occurred while resolving experiments: {err}");
    })?;

    let resolved = merge(
        publisher_default(&configs),
        config,
        matched_rule,
        &chain,
        warnings,
    );
    log_warnings(publisher_id, &resolved.audit.warnings);
    log::trace!(target: "prebid",
                publisher_id,
                website_id:debug,
                bucket_key = context.bucket_key.as_str(),
                resolved:serde = resolved;
                "resolved wrapper config");

    Ok(Resolution::Resolved(resolved))
}

fn log_warnings(publisher_id: &str, warnings: &[DataIntegrityWarning]) {
    for warning in warnings {
        log::warn!(target: "prebid", publisher_id, warning:serde; "{warning}");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{resolve, Resolution};
    use crate::{
        models::{
            ConfigStatus, ExperimentNode, ExperimentStatus, TargetingRule, Variant,
            VariantOverrides, WrapperConfig, WrapperSettings,
        },
        ConfigError, RequestContext, Snapshot,
    };

    fn config(id: &str, website_id: Option<&str>, timeout: u32) -> WrapperConfig {
        WrapperConfig {
            id: id.into(),
            name: id.into(),
            publisher_id: "pub".into(),
            website_id: website_id.map(Into::into),
            status: ConfigStatus::Active,
            is_default: true,
            block_wrapper: false,
            version: 1,
            settings: WrapperSettings {
                timeout: Some(timeout),
                ..Default::default()
            },
        }
    }

    fn experiment(id: &str, config_id: &str, parent: Option<(&str, &str)>) -> ExperimentNode {
        ExperimentNode {
            id: id.into(),
            name: id.into(),
            config_id: Some(config_id.into()),
            parent_test_id: parent.map(|(test, _)| test.into()),
            parent_variant_id: parent.map(|(_, variant)| variant.into()),
            level: 0,
            status: ExperimentStatus::Running,
            start_date: None,
            end_date: None,
            variants: vec![Variant {
                id: format!("{id}-v"),
                name: String::new(),
                traffic_percent: 100,
                is_control: true,
                overrides: VariantOverrides {
                    timeout: Some(2000),
                    ..Default::default()
                },
            }],
        }
    }

    #[test]
    fn missing_snapshot_is_not_configured() {
        let resolution = resolve(
            None,
            "pub",
            None,
            &RequestContext::new("v"),
            Utc::now(),
            8,
        );
        assert_eq!(resolution, Ok(Resolution::NotConfigured));
    }

    #[test]
    fn applies_experiment_overrides_on_selected_config() {
        let snapshot = Snapshot::new(
            vec![config("site", Some("w"), 1000)],
            vec![],
            vec![experiment("exp", "site", None)],
        );
        let resolution = resolve(
            Some(&snapshot),
            "pub",
            Some("w"),
            &RequestContext::new("v"),
            Utc::now(),
            8,
        )
        .unwrap();
        let resolved = resolution.resolved().unwrap();
        assert_eq!(resolved.config_id, "site");
        assert_eq!(resolved.settings.timeout, Some(2000));
        assert_eq!(resolved.audit.experiments[0].variant_id, "exp-v");
        assert_eq!(resolved.audit.matched_rule_id, None);
    }

    #[test]
    fn blocked_config_skips_experiments() {
        let mut blocked = config("site", Some("w"), 1000);
        blocked.block_wrapper = true;
        let rule: TargetingRule =
            serde_json::from_str(r#"{"id": "r", "configId": "site", "conditions": []}"#).unwrap();
        // A cyclic tree would fail resolution if experiments were looked at.
        let snapshot = Snapshot::new(
            vec![blocked],
            vec![rule],
            vec![
                experiment("a", "site", Some(("b", "b-v"))),
                experiment("b", "site", Some(("a", "a-v"))),
            ],
        );
        let resolution = resolve(
            Some(&snapshot),
            "pub",
            Some("w"),
            &RequestContext::new("v"),
            Utc::now(),
            8,
        )
        .unwrap();
        match resolution {
            Resolution::Blocked(blocked) => {
                assert_eq!(blocked.config_id, "site");
                assert_eq!(blocked.matched_rule_id.as_deref(), Some("r"));
            }
            other => panic!("expected blocked, got {other:?}"),
        }
    }

    #[test]
    fn cycle_is_an_error() {
        let snapshot = Snapshot::new(
            vec![config("site", None, 1000)],
            vec![],
            vec![
                experiment("a", "site", Some(("b", "b-v"))),
                experiment("b", "site", Some(("a", "a-v"))),
            ],
        );
        let result = resolve(
            Some(&snapshot),
            "pub",
            None,
            &RequestContext::new("v"),
            Utc::now(),
            8,
        );
        assert_eq!(
            result,
            Err(ConfigError::ConfigurationCycle {
                experiment_id: "a".into()
            })
        );
    }

    #[test]
    fn other_publishers_configs_are_invisible() {
        let mut foreign = config("foreign", None, 1000);
        foreign.publisher_id = "someone-else".into();
        let snapshot = Snapshot::new(vec![foreign], vec![], vec![]);
        let resolution = resolve(
            Some(&snapshot),
            "pub",
            None,
            &RequestContext::new("v"),
            Utc::now(),
            8,
        );
        assert_eq!(resolution, Ok(Resolution::NotConfigured));
    }
}
