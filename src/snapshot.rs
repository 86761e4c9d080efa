//! Immutable view of all wrapper configuration, as loaded from storage.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Deserialize;

use crate::{
    bucketer::TrafficSplit,
    experiments::ExperimentArena,
    models::{ExperimentNode, TargetingRule, TryParse, WrapperConfig},
    DataIntegrityWarning, Result,
};

/// Wire format of a snapshot. Each entry is parsed on its own so a single malformed entry does
/// not take the rest down with it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotWire {
    #[serde(default)]
    configs: Vec<TryParse<WrapperConfig>>,
    #[serde(default)]
    rules: Vec<TryParse<TargetingRule>>,
    #[serde(default)]
    experiments: Vec<TryParse<ExperimentNode>>,
}

/// Everything a resolution reads: configs, targeting rules, and experiments.
///
/// A snapshot is never mutated. Refreshing configuration means building a new one and swapping
/// it into the [`ConfigurationStore`](crate::ConfigurationStore).
#[derive(Debug, Default)]
pub struct Snapshot {
    configs: Vec<WrapperConfig>,
    /// publisher id -> indices into `configs`.
    configs_by_publisher: HashMap<String, Vec<usize>>,
    /// Rules grouped by `config_id`. May contain groups for unknown configs; those never match.
    rules_by_config: HashMap<String, Vec<TargetingRule>>,
    experiments: ExperimentArena,
}

impl Snapshot {
    #[allow(missing_docs)]
    pub fn new(
        configs: Vec<WrapperConfig>,
        rules: Vec<TargetingRule>,
        experiments: Vec<ExperimentNode>,
    ) -> Snapshot {
        let mut rules_by_config: HashMap<String, Vec<TargetingRule>> = HashMap::new();
        for rule in rules {
            rules_by_config
                .entry(rule.config_id.clone())
                .or_default()
                .push(rule);
        }
        let mut configs_by_publisher: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, config) in configs.iter().enumerate() {
            configs_by_publisher
                .entry(config.publisher_id.clone())
                .or_default()
                .push(index);
        }
        Snapshot {
            configs,
            configs_by_publisher,
            rules_by_config,
            experiments: ExperimentArena::new(experiments),
        }
    }

    /// Parse a snapshot from JSON.
    ///
    /// Fails only when the document as a whole is not a snapshot. Entries that fail to parse are
    /// skipped with a warning.
    ///
    /// ```
    /// # use prebid_config::Snapshot;
    /// let snapshot = Snapshot::from_json(br#"{
    ///     "configs": [{"id": "c1", "publisherId": "p1", "status": "active", "isDefault": true}],
    ///     "rules": [],
    ///     "experiments": []
    /// }"#).unwrap();
    /// assert_eq!(snapshot.configs().len(), 1);
    /// ```
    pub fn from_json(bytes: &[u8]) -> Result<Snapshot> {
        let wire: SnapshotWire = serde_json::from_slice(bytes)?;
        Ok(Snapshot::new(
            parsed("config", wire.configs),
            parsed("rule", wire.rules),
            parsed("experiment", wire.experiments),
        ))
    }

    #[allow(missing_docs)]
    pub fn configs(&self) -> &[WrapperConfig] {
        &self.configs
    }

    #[allow(missing_docs)]
    pub fn rules_by_config(&self) -> &HashMap<String, Vec<TargetingRule>> {
        &self.rules_by_config
    }

    #[allow(missing_docs)]
    pub fn experiments(&self) -> &ExperimentArena {
        &self.experiments
    }

    /// Configs eligible for a request: the publisher's publisher-level configs plus, when
    /// `website_id` is given, that website's configs. Status is not checked here.
    pub fn configs_for(&self, publisher_id: &str, website_id: Option<&str>) -> Vec<&WrapperConfig> {
        self.configs_by_publisher
            .get(publisher_id)
            .into_iter()
            .flatten()
            .map(|&index| &self.configs[index])
            .filter(|config| match config.website_id.as_deref() {
                None => true,
                Some(id) => website_id == Some(id),
            })
            .collect()
    }

    /// Check load-time invariants. The result is sorted and free of duplicates.
    ///
    /// Resolution recovers from each of these on its own; this is for reporting them once per
    /// refresh instead of once per request.
    pub fn validate(&self) -> Vec<DataIntegrityWarning> {
        let mut warnings = Vec::new();

        let mut nodes: Vec<&ExperimentNode> = self.experiments.nodes().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        for node in nodes {
            TrafficSplit::new(node, &mut warnings);

            let parent = node
                .parent_test_id
                .as_deref()
                .and_then(|id| self.experiments.get(id));
            if let Some(parent) = parent {
                let expected = parent.level.saturating_add(1);
                if node.level != expected {
                    warnings.push(DataIntegrityWarning::LevelMismatch {
                        experiment_id: node.id.clone(),
                        expected,
                        found: node.level,
                    });
                }
            }
        }

        warnings.extend(self.experiment_cycles().into_iter().map(|experiment_id| {
            DataIntegrityWarning::ExperimentCycle {
                experiment_id: experiment_id.to_owned(),
            }
        }));

        let mut defaults: BTreeMap<(&str, Option<&str>), Vec<&str>> = BTreeMap::new();
        for config in self.configs.iter().filter(|c| c.is_active() && c.is_default) {
            defaults
                .entry((config.publisher_id.as_str(), config.website_id.as_deref()))
                .or_default()
                .push(config.id.as_str());
        }
        for ((publisher_id, website_id), mut ids) in defaults {
            if ids.len() > 1 {
                ids.sort();
                warnings.push(DataIntegrityWarning::DuplicateDefault {
                    publisher_id: publisher_id.to_owned(),
                    website_id: website_id.map(str::to_owned),
                    config_id: ids[0].to_owned(),
                });
            }
        }

        let known: HashSet<&str> = self.configs.iter().map(|c| c.id.as_str()).collect();
        let mut orphans: Vec<&TargetingRule> = self
            .rules_by_config
            .iter()
            .filter(|(config_id, _)| !known.contains(config_id.as_str()))
            .flat_map(|(_, rules)| rules)
            .collect();
        orphans.sort_by(|a, b| a.id.cmp(&b.id));
        warnings.extend(orphans.into_iter().map(|rule| DataIntegrityWarning::OrphanRule {
            rule_id: rule.id.clone(),
            config_id: rule.config_id.clone(),
        }));

        let mut seen = HashSet::new();
        warnings.retain(|warning| seen.insert(warning.clone()));
        warnings
    }

    /// Lowest experiment id of every parent-link cycle, sorted.
    fn experiment_cycles(&self) -> BTreeSet<&str> {
        let mut cycles = BTreeSet::new();
        for start in self.experiments.nodes() {
            let mut path = vec![start.id.as_str()];
            let mut visited = HashSet::from([start.id.as_str()]);
            let mut parent = start.parent_test_id.as_deref();
            while let Some(id) = parent {
                if id == start.id {
                    if let Some(lowest) = path.iter().min() {
                        cycles.insert(*lowest);
                    }
                    break;
                }
                // A loop that does not pass through `start` is found from its own members.
                if !visited.insert(id) {
                    break;
                }
                let Some(node) = self.experiments.get(id) else {
                    break;
                };
                path.push(node.id.as_str());
                parent = node.parent_test_id.as_deref();
            }
        }
        cycles
    }
}

fn parsed<T>(kind: &str, entries: Vec<TryParse<T>>) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            TryParse::Parsed(value) => Some(value),
            TryParse::ParseFailed(raw) => {
                log::warn!(target: "prebid",
                           kind,
                           id:serde = raw.get("id");
                           "failed to parse snapshot entry, skipping");
                None
            }
        })
        .collect()
}
