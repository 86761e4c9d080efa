//! Merging of configuration layers into the final settings served to the wrapper.
//!
//! Precedence, lowest to highest, per field (an unset field never overrides a set one):
//!
//! 1. the publisher-level default config;
//! 2. the selected config (website- or publisher-level);
//! 3. variant overrides in chain order, so nested experiments refine their parents.
//!
//! A matched targeting rule only decides which config is selected; it adds no layer of its own.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    experiments::VariantChain,
    models::{BidderEntry, BidderOverride, TargetingRule, Variant, WrapperConfig, WrapperSettings},
    DataIntegrityWarning,
};

/// Final configuration for one request, with the trail of decisions that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ResolvedConfig {
    pub publisher_id: String,
    /// Website of the selected config. `None` when a publisher-level config was selected.
    pub website_id: Option<String>,
    pub config_id: String,
    pub config_name: String,
    pub config_version: u64,
    pub settings: WrapperSettings,
    pub audit: AuditTrail,
}

impl ResolvedConfig {
    /// Enabled bidders, highest priority first. Equal priorities keep list order.
    pub fn enabled_bidders(&self) -> Vec<&BidderEntry> {
        let mut bidders: Vec<&BidderEntry> =
            self.settings.bidders.iter().filter(|b| b.enabled).collect();
        bidders.sort_by(|a, b| b.priority.cmp(&a.priority));
        bidders
    }
}

/// How a [`ResolvedConfig`] came about. Returned to the caller for serve logs; never persisted
/// here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    /// Rule that selected the config. `None` when the default fallback applied.
    pub matched_rule_id: Option<String>,
    /// Whether the config was selected as a default because no rule matched.
    pub used_default: bool,
    /// Experiment assignments in the order their overrides were applied.
    #[serde(default)]
    pub experiments: Vec<ExperimentAssignment>,
    /// Data problems recovered from during this resolution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<DataIntegrityWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ExperimentAssignment {
    pub experiment_id: String,
    pub experiment_name: String,
    pub level: u32,
    pub variant_id: String,
    pub variant_name: String,
    pub is_control: bool,
}

/// Merge the layers into a [`ResolvedConfig`].
///
/// `publisher_default` is ignored when it is the selected config itself.
pub fn merge(
    publisher_default: Option<&WrapperConfig>,
    selected: &WrapperConfig,
    matched_rule: Option<&TargetingRule>,
    chain: &VariantChain<'_>,
    mut warnings: Vec<DataIntegrityWarning>,
) -> ResolvedConfig {
    let mut settings = WrapperSettings::default();
    if let Some(base) = publisher_default.filter(|base| base.id != selected.id) {
        settings.overlay(&base.settings);
    }
    settings.overlay(&selected.settings);

    let configured: HashSet<String> = settings.bidders.iter().map(|b| b.code.clone()).collect();
    let mut added = HashSet::new();
    for (_, variant) in chain {
        settings.apply_variant(variant, &configured, &mut added, &mut warnings);
    }

    let mut seen = HashSet::new();
    warnings.retain(|warning| seen.insert(warning.clone()));

    ResolvedConfig {
        publisher_id: selected.publisher_id.clone(),
        website_id: selected.website_id.clone(),
        config_id: selected.id.clone(),
        config_name: selected.name.clone(),
        config_version: selected.version,
        settings,
        audit: AuditTrail {
            matched_rule_id: matched_rule.map(|rule| rule.id.clone()),
            used_default: matched_rule.is_none(),
            experiments: chain
                .iter()
                .map(|(node, variant)| ExperimentAssignment {
                    experiment_id: node.id.clone(),
                    experiment_name: node.name.clone(),
                    level: node.level,
                    variant_id: variant.id.clone(),
                    variant_name: variant.name.clone(),
                    is_control: variant.is_control,
                })
                .collect(),
            warnings,
        },
    }
}

impl WrapperSettings {
    /// Apply a config layer on top of `self`. Bidders with the same code are replaced, new ones
    /// appended.
    fn overlay(&mut self, layer: &WrapperSettings) {
        overlay(&mut self.timeout, &layer.timeout);
        overlay(&mut self.price_granularity, &layer.price_granularity);
        overlay(&mut self.custom_price_buckets, &layer.custom_price_buckets);
        overlay(&mut self.send_all_bids, &layer.send_all_bids);
        overlay(&mut self.bidder_sequence, &layer.bidder_sequence);
        overlay(&mut self.floors, &layer.floors);
        overlay(&mut self.user_sync, &layer.user_sync);

        for bidder in &layer.bidders {
            match self.bidders.iter_mut().find(|b| b.code == bidder.code) {
                Some(existing) => *existing = bidder.clone(),
                None => self.bidders.push(bidder.clone()),
            }
        }
    }

    fn apply_variant(
        &mut self,
        variant: &Variant,
        configured: &HashSet<String>,
        added: &mut HashSet<String>,
        warnings: &mut Vec<DataIntegrityWarning>,
    ) {
        let overrides = &variant.overrides;
        overlay(&mut self.timeout, &overrides.timeout);
        overlay(&mut self.price_granularity, &overrides.price_granularity);
        overlay(&mut self.send_all_bids, &overrides.send_all_bids);
        overlay(&mut self.bidder_sequence, &overrides.bidder_sequence);
        overlay(&mut self.floors, &overrides.floors);

        for bidder in &overrides.additional_bidders {
            if configured.contains(&bidder.code) {
                log::debug!(target: "prebid",
                            variant_id:display = variant.id,
                            bidder_code:display = bidder.code;
                            "additional bidder is already configured, skipping");
                continue;
            }
            if added.insert(bidder.code.clone()) {
                self.bidders.push(bidder.clone());
            } else if let Some(existing) = self.bidders.iter_mut().find(|b| b.code == bidder.code)
            {
                // Added by an earlier variant in the chain: the later one wins.
                *existing = bidder.clone();
            }
        }

        for patch in &overrides.bidder_overrides {
            match self.bidders.iter_mut().find(|b| b.code == patch.code) {
                Some(existing) => existing.patch(patch),
                None => warnings.push(DataIntegrityWarning::UnknownBidderOverride {
                    variant_id: variant.id.clone(),
                    bidder_code: patch.code.clone(),
                }),
            }
        }
    }
}

impl BidderEntry {
    fn patch(&mut self, patch: &BidderOverride) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        overlay(&mut self.timeout, &patch.timeout);
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(params) = &patch.params {
            match (&mut self.params, params) {
                (serde_json::Value::Object(existing), serde_json::Value::Object(update)) => {
                    existing.extend(update.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                (existing, update) => *existing = update.clone(),
            }
        }
    }
}

fn overlay<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if let Some(value) = value {
        *slot = Some(value.clone());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::merge;
    use crate::{
        models::{
            BidderEntry, BidderOverride, ConfigStatus, ExperimentNode, ExperimentStatus,
            PriceGranularity, Variant, VariantOverrides, WrapperConfig, WrapperSettings,
        },
        DataIntegrityWarning,
    };

    fn bidder(code: &str, params: serde_json::Value) -> BidderEntry {
        BidderEntry {
            code: code.into(),
            enabled: true,
            params,
            timeout: None,
            priority: 0,
        }
    }

    fn config(id: &str, website_id: Option<&str>, settings: WrapperSettings) -> WrapperConfig {
        WrapperConfig {
            id: id.into(),
            name: id.into(),
            publisher_id: "pub".into(),
            website_id: website_id.map(Into::into),
            status: ConfigStatus::Active,
            is_default: website_id.is_none(),
            block_wrapper: false,
            version: 3,
            settings,
        }
    }

    fn experiment(id: &str, level: u32) -> ExperimentNode {
        ExperimentNode {
            id: id.into(),
            name: id.into(),
            config_id: None,
            parent_test_id: None,
            parent_variant_id: None,
            level,
            status: ExperimentStatus::Running,
            start_date: None,
            end_date: None,
            variants: vec![],
        }
    }

    fn variant(id: &str, overrides: VariantOverrides) -> Variant {
        Variant {
            id: id.into(),
            name: id.into(),
            traffic_percent: 100,
            is_control: false,
            overrides,
        }
    }

    #[test]
    fn website_fields_override_publisher_defaults() {
        let publisher = config(
            "pub-default",
            None,
            WrapperSettings {
                timeout: Some(800),
                price_granularity: Some(PriceGranularity::Medium),
                send_all_bids: Some(true),
                ..Default::default()
            },
        );
        let website = config(
            "site",
            Some("site"),
            WrapperSettings {
                timeout: Some(1500),
                ..Default::default()
            },
        );

        let resolved = merge(Some(&publisher), &website, None, &vec![], vec![]);
        assert_eq!(resolved.settings.timeout, Some(1500));
        // unset fields fall through to the publisher default
        assert_eq!(
            resolved.settings.price_granularity,
            Some(PriceGranularity::Medium)
        );
        assert_eq!(resolved.settings.send_all_bids, Some(true));
        assert_eq!(resolved.config_id, "site");
        assert_eq!(resolved.website_id.as_deref(), Some("site"));
        assert_eq!(resolved.config_version, 3);
        assert!(resolved.audit.used_default);
    }

    #[test]
    fn config_bidders_merge_by_code() {
        let publisher = config(
            "pub-default",
            None,
            WrapperSettings {
                bidders: vec![
                    bidder("appnexus", json!({"placementId": 1})),
                    bidder("rubicon", json!({"accountId": 7})),
                ],
                ..Default::default()
            },
        );
        let website = config(
            "site",
            Some("site"),
            WrapperSettings {
                bidders: vec![
                    bidder("rubicon", json!({"accountId": 9})),
                    bidder("ix", json!({"siteId": "x"})),
                ],
                ..Default::default()
            },
        );

        let resolved = merge(Some(&publisher), &website, None, &vec![], vec![]);
        let codes: Vec<&str> = resolved
            .settings
            .bidders
            .iter()
            .map(|b| b.code.as_str())
            .collect();
        assert_eq!(codes, vec!["appnexus", "rubicon", "ix"]);
        assert_eq!(resolved.settings.bidders[1].params, json!({"accountId": 9}));
    }

    #[test]
    fn nested_variant_overrides_parent_variant() {
        let base = config(
            "cfg",
            None,
            WrapperSettings {
                timeout: Some(800),
                ..Default::default()
            },
        );
        let parent_exp = experiment("timeout-test", 0);
        let child_exp = experiment("refine", 1);
        let parent = variant(
            "t-1000",
            VariantOverrides {
                timeout: Some(1000),
                send_all_bids: Some(false),
                ..Default::default()
            },
        );
        let child = variant(
            "t-1200",
            VariantOverrides {
                timeout: Some(1200),
                ..Default::default()
            },
        );

        let chain = vec![(&parent_exp, &parent), (&child_exp, &child)];
        let resolved = merge(None, &base, None, &chain, vec![]);
        assert_eq!(resolved.settings.timeout, Some(1200));
        assert_eq!(resolved.settings.send_all_bids, Some(false));
        assert_eq!(resolved.audit.experiments.len(), 2);
        assert_eq!(resolved.audit.experiments[0].variant_id, "t-1000");
        assert_eq!(resolved.audit.experiments[1].level, 1);
    }

    #[test]
    fn bidder_overrides_patch_without_duplicating() {
        let base = config(
            "cfg",
            None,
            WrapperSettings {
                bidders: vec![bidder("appnexus", json!({"placementId": 1, "reserve": 0.1}))],
                ..Default::default()
            },
        );
        let exp = experiment("exp", 0);
        let v = variant(
            "v",
            VariantOverrides {
                bidder_overrides: vec![BidderOverride {
                    code: "appnexus".into(),
                    params: Some(json!({"reserve": 0.5})),
                    timeout: Some(500),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );

        let resolved = merge(None, &base, None, &vec![(&exp, &v)], vec![]);
        assert_eq!(resolved.settings.bidders.len(), 1);
        let appnexus = &resolved.settings.bidders[0];
        assert_eq!(appnexus.params, json!({"placementId": 1, "reserve": 0.5}));
        assert_eq!(appnexus.timeout, Some(500));
        assert!(appnexus.enabled);
    }

    #[test]
    fn override_of_unknown_bidder_is_reported() {
        let base = config("cfg", None, WrapperSettings::default());
        let exp = experiment("exp", 0);
        let v = variant(
            "v",
            VariantOverrides {
                bidder_overrides: vec![BidderOverride {
                    code: "openx".into(),
                    enabled: Some(false),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );

        let resolved = merge(None, &base, None, &vec![(&exp, &v)], vec![]);
        assert!(resolved.settings.bidders.is_empty());
        assert_eq!(
            resolved.audit.warnings,
            vec![DataIntegrityWarning::UnknownBidderOverride {
                variant_id: "v".into(),
                bidder_code: "openx".into()
            }]
        );
    }

    #[test]
    fn additional_bidders_skip_configured_codes() {
        let base = config(
            "cfg",
            None,
            WrapperSettings {
                bidders: vec![bidder("appnexus", json!({"placementId": 1}))],
                ..Default::default()
            },
        );
        let exp = experiment("exp", 0);
        let v = variant(
            "v",
            VariantOverrides {
                additional_bidders: vec![
                    bidder("appnexus", json!({"placementId": 2})),
                    bidder("pubmatic", json!({"publisherId": "p"})),
                ],
                ..Default::default()
            },
        );

        let resolved = merge(None, &base, None, &vec![(&exp, &v)], vec![]);
        let bidders = &resolved.settings.bidders;
        assert_eq!(bidders.len(), 2);
        assert_eq!(bidders[0].params, json!({"placementId": 1}));
        assert_eq!(bidders[1].code, "pubmatic");
    }

    #[test]
    fn later_chain_addition_wins() {
        let base = config("cfg", None, WrapperSettings::default());
        let root = experiment("root", 0);
        let child = experiment("child", 1);
        let first = variant(
            "first",
            VariantOverrides {
                additional_bidders: vec![bidder("pubmatic", json!({"publisherId": "a"}))],
                ..Default::default()
            },
        );
        let second = variant(
            "second",
            VariantOverrides {
                additional_bidders: vec![bidder("pubmatic", json!({"publisherId": "b"}))],
                ..Default::default()
            },
        );

        let resolved = merge(
            None,
            &base,
            None,
            &vec![(&root, &first), (&child, &second)],
            vec![],
        );
        assert_eq!(resolved.settings.bidders.len(), 1);
        assert_eq!(
            resolved.settings.bidders[0].params,
            json!({"publisherId": "b"})
        );
    }

    #[test]
    fn selected_default_is_not_layered_twice() {
        let default = config(
            "pub-default",
            None,
            WrapperSettings {
                bidders: vec![bidder("appnexus", json!({}))],
                ..Default::default()
            },
        );
        let resolved = merge(Some(&default), &default, None, &vec![], vec![]);
        assert_eq!(resolved.settings.bidders.len(), 1);
    }

    #[test]
    fn enabled_bidders_by_priority() {
        let mut low = bidder("low", json!({}));
        low.priority = 1;
        let mut high = bidder("high", json!({}));
        high.priority = 5;
        let mut off = bidder("off", json!({}));
        off.enabled = false;
        let base = config(
            "cfg",
            None,
            WrapperSettings {
                bidders: vec![low, off, high],
                ..Default::default()
            },
        );
        let resolved = merge(None, &base, None, &vec![], vec![]);
        let codes: Vec<&str> = resolved
            .enabled_bidders()
            .iter()
            .map(|b| b.code.as_str())
            .collect();
        assert_eq!(codes, vec!["high", "low"]);
    }

    #[test]
    fn duplicate_warnings_are_collapsed() {
        let base = config("cfg", None, WrapperSettings::default());
        let warning = DataIntegrityWarning::MissingControl {
            experiment_id: "e".into(),
        };
        let resolved = merge(None, &base, None, &vec![], vec![warning.clone(), warning]);
        assert_eq!(resolved.audit.warnings.len(), 1);
    }
}
