//! Resolution of (possibly nested) experiment trees into a chain of variant assignments.
//!
//! Experiments are kept in an arena keyed by id. Parent links are followed by lookup, never by
//! reference, and the walk is bounded both by cycle detection and by a depth limit.
use std::collections::{HashMap, HashSet};

use crate::{
    bucketer,
    models::{ExperimentNode, Timestamp, Variant},
    sharder::{Md5Sharder, Sharder},
    ConfigError, DataIntegrityWarning,
};

/// Assignments applied for one request, root experiments first, each followed by its nested
/// experiments (depth-first).
pub type VariantChain<'a> = Vec<(&'a ExperimentNode, &'a Variant)>;

/// Experiments indexed by id, by associated config, and by parent variant.
#[derive(Debug, Default)]
pub struct ExperimentArena {
    nodes: HashMap<String, ExperimentNode>,
    /// config id -> ids of level-0 experiments, sorted.
    roots: HashMap<String, Vec<String>>,
    /// parent test id -> parent variant id -> child ids, sorted.
    children: HashMap<String, HashMap<String, Vec<String>>>,
}

impl ExperimentArena {
    /// Index `nodes`. When two nodes share an id, the later one wins.
    pub fn new(nodes: impl IntoIterator<Item = ExperimentNode>) -> ExperimentArena {
        let mut by_id = HashMap::new();
        for node in nodes {
            if let Some(previous) = by_id.insert(node.id.clone(), node) {
                log::warn!(target: "prebid",
                           experiment_id:display = previous.id;
                           "duplicate experiment id, keeping the last definition");
            }
        }

        let mut roots: HashMap<String, Vec<String>> = HashMap::new();
        let mut children: HashMap<String, HashMap<String, Vec<String>>> = HashMap::new();
        for node in by_id.values() {
            if let (Some(config_id), 0) = (&node.config_id, node.level) {
                roots
                    .entry(config_id.clone())
                    .or_default()
                    .push(node.id.clone());
            }
            if let (Some(test_id), Some(variant_id)) = (&node.parent_test_id, &node.parent_variant_id)
            {
                children
                    .entry(test_id.clone())
                    .or_default()
                    .entry(variant_id.clone())
                    .or_default()
                    .push(node.id.clone());
            }
        }
        roots.values_mut().for_each(|ids| ids.sort());
        children
            .values_mut()
            .flat_map(|by_variant| by_variant.values_mut())
            .for_each(|ids| ids.sort());

        ExperimentArena {
            nodes: by_id,
            roots,
            children,
        }
    }

    #[allow(missing_docs)]
    pub fn get(&self, id: &str) -> Option<&ExperimentNode> {
        self.nodes.get(id)
    }

    /// All experiments, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &ExperimentNode> {
        self.nodes.values()
    }

    /// Level-0 experiments associated with `config_id`, in id order.
    pub fn roots<'a>(&'a self, config_id: &str) -> impl Iterator<Item = &'a ExperimentNode> {
        self.lookup(self.roots.get(config_id))
    }

    /// Experiments nested under `variant_id` of `test_id`, in id order.
    pub fn children<'a>(
        &'a self,
        test_id: &str,
        variant_id: &str,
    ) -> impl Iterator<Item = &'a ExperimentNode> {
        self.lookup(
            self.children
                .get(test_id)
                .and_then(|by_variant| by_variant.get(variant_id)),
        )
    }

    fn lookup<'a>(&'a self, ids: Option<&'a Vec<String>>) -> impl Iterator<Item = &'a ExperimentNode> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
    }
}

/// Assign the request to variants of every live experiment running on `config_id`, descending
/// into live nested experiments of each assigned variant.
///
/// A node reached again from its own subtree is a [`ConfigError::ConfigurationCycle`]; a chain
/// longer than `max_depth` levels is [`ConfigError::DepthExceeded`].
pub fn resolve_experiments<'a>(
    arena: &'a ExperimentArena,
    config_id: &str,
    bucket_key: &str,
    now: Timestamp,
    max_depth: usize,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> Result<VariantChain<'a>, ConfigError> {
    let mut walk = Walk {
        arena,
        sharder: &Md5Sharder,
        bucket_key,
        now,
        max_depth,
        warnings,
        chain: Vec::new(),
        path: Vec::new(),
        visited: HashSet::new(),
    };
    for root in arena.roots(config_id).filter(|node| node.is_live(now)) {
        walk.visit(root, 0)?;
    }
    Ok(walk.chain)
}

struct Walk<'a, 'w, S> {
    arena: &'a ExperimentArena,
    sharder: &'w S,
    bucket_key: &'w str,
    now: Timestamp,
    max_depth: usize,
    warnings: &'w mut Vec<DataIntegrityWarning>,
    chain: VariantChain<'a>,
    /// Ids from the current root down to the node being visited.
    path: Vec<&'a str>,
    visited: HashSet<&'a str>,
}

impl<'a, S: Sharder> Walk<'a, '_, S> {
    fn visit(&mut self, node: &'a ExperimentNode, depth: usize) -> Result<(), ConfigError> {
        if self.path.contains(&node.id.as_str()) {
            return Err(ConfigError::ConfigurationCycle {
                experiment_id: node.id.clone(),
            });
        }
        if !self.visited.insert(&node.id) {
            // Reached through two parents (e.g., a root that also names a parent). Its overrides
            // are already in the chain.
            log::debug!(target: "prebid",
                        experiment_id:display = node.id;
                        "experiment reached twice, skipping");
            return Ok(());
        }
        if depth >= self.max_depth {
            return Err(ConfigError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        if node.level as usize != depth {
            self.warnings.push(DataIntegrityWarning::LevelMismatch {
                experiment_id: node.id.clone(),
                expected: depth as u32,
                found: node.level,
            });
        }

        let Some(variant) =
            bucketer::assign_with_sharder(self.bucket_key, node, self.sharder, self.warnings)
        else {
            return Ok(());
        };
        self.chain.push((node, variant));

        self.path.push(&node.id);
        let now = self.now;
        for child in self
            .arena
            .children(&node.id, &variant.id)
            .filter(|child| child.is_live(now))
        {
            self.visit(child, depth + 1)?;
        }
        self.path.pop();
        Ok(())
    }
}
