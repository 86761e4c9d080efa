//! Selection of the single wrapper config that applies to a request.
use std::{cmp::Ordering, collections::HashMap};

use crate::{
    models::{ConfigScope, TargetingRule, WrapperConfig},
    DataIntegrityWarning, RequestContext,
};

/// Outcome of config selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection<'a> {
    /// A config applies. `matched_rule` is `None` when the default fallback was used.
    Matched {
        #[allow(missing_docs)]
        config: &'a WrapperConfig,
        #[allow(missing_docs)]
        matched_rule: Option<&'a TargetingRule>,
    },
    /// The winning config blocks the wrapper. Experiments are not resolved.
    Blocked {
        #[allow(missing_docs)]
        config: &'a WrapperConfig,
        #[allow(missing_docs)]
        matched_rule: Option<&'a TargetingRule>,
    },
    /// Neither a rule nor a default config applies.
    NotConfigured,
}

/// Select the winning config among `configs`.
///
/// `configs` must already be scoped to one publisher and one website: publisher-level configs of
/// the publisher plus website-level configs of the requested website.
///
/// 1. Only active configs take part.
/// 2. Among enabled rules that match, the highest priority wins. Ties go to the website-level
///    config, then to the lower config id, then to the lower rule id.
/// 3. Without a matching rule, the website-level default wins over the publisher-level default.
/// 4. A winner with `block_wrapper` yields [`Selection::Blocked`].
pub fn select<'a>(
    configs: &[&'a WrapperConfig],
    rules_by_config: &'a HashMap<String, Vec<TargetingRule>>,
    context: &RequestContext,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> Selection<'a> {
    let active: Vec<&'a WrapperConfig> = configs
        .iter()
        .copied()
        .filter(|config| config.is_active())
        .collect();

    let best_match = active
        .iter()
        .flat_map(|&config| {
            rules_by_config
                .get(&config.id)
                .into_iter()
                .flatten()
                .filter(|rule| rule.enabled)
                .map(move |rule| (config, rule))
        })
        .filter(|(_, rule)| rule.matches_with_warnings(context, warnings))
        .min_by(|a, b| rank(*a, *b));

    let (config, matched_rule) = match best_match {
        Some((config, rule)) => (config, Some(rule)),
        None => match default_config(&active, ConfigScope::Website, warnings)
            .or_else(|| default_config(&active, ConfigScope::Publisher, warnings))
        {
            Some(config) => (config, None),
            None => return Selection::NotConfigured,
        },
    };

    if config.block_wrapper {
        Selection::Blocked {
            config,
            matched_rule,
        }
    } else {
        Selection::Matched {
            config,
            matched_rule,
        }
    }
}

/// The active publisher-level default among `configs`, the base layer for merging.
pub fn publisher_default<'a>(configs: &[&'a WrapperConfig]) -> Option<&'a WrapperConfig> {
    configs
        .iter()
        .copied()
        .filter(|config| {
            config.is_active() && config.is_default && config.scope() == ConfigScope::Publisher
        })
        .min_by(|a, b| a.id.cmp(&b.id))
}

/// Total order over matching (config, rule) pairs; the smallest wins.
fn rank(
    (a_config, a_rule): (&WrapperConfig, &TargetingRule),
    (b_config, b_rule): (&WrapperConfig, &TargetingRule),
) -> Ordering {
    b_rule
        .priority
        .cmp(&a_rule.priority)
        .then_with(|| b_config.scope().cmp(&a_config.scope()))
        .then_with(|| a_config.id.cmp(&b_config.id))
        .then_with(|| a_rule.id.cmp(&b_rule.id))
}

fn default_config<'a>(
    active: &[&'a WrapperConfig],
    scope: ConfigScope,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> Option<&'a WrapperConfig> {
    let mut defaults: Vec<&'a WrapperConfig> = active
        .iter()
        .copied()
        .filter(|config| config.is_default && config.scope() == scope)
        .collect();
    defaults.sort_by(|a, b| a.id.cmp(&b.id));

    let chosen = *defaults.first()?;
    if defaults.len() > 1 {
        warnings.push(DataIntegrityWarning::DuplicateDefault {
            publisher_id: chosen.publisher_id.clone(),
            website_id: chosen.website_id.clone(),
            config_id: chosen.id.clone(),
        });
    }
    Some(chosen)
}
