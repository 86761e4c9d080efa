//! Deterministic assignment of a bucketing key to an experiment variant.
//!
//! The assignment is a pure function of the bucketing key, the experiment id, and the variant set.
//! No per-visitor state is kept anywhere: the same visitor gets the same variant for as long as
//! the experiment's variant list is unchanged.
use crate::{
    models::{ExperimentNode, Variant},
    sharder::{Md5Sharder, Sharder, TOTAL_SHARDS},
    DataIntegrityWarning,
};

/// Assign `bucket_key` to one of the node's variants.
///
/// Returns `None` only for a node without variants. Traffic that does not sum to 100 is clamped
/// deterministically (see [`TrafficSplit`]) and reported through `warnings`.
pub fn assign<'a>(
    bucket_key: &str,
    node: &'a ExperimentNode,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> Option<&'a Variant> {
    assign_with_sharder(bucket_key, node, &Md5Sharder, warnings)
}

pub(crate) fn assign_with_sharder<'a>(
    bucket_key: &str,
    node: &'a ExperimentNode,
    sharder: &impl Sharder,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> Option<&'a Variant> {
    let split = TrafficSplit::new(node, warnings)?;
    let shard = sharder.experiment_shard(&node.id, bucket_key);
    Some(split.variant_for(shard))
}

/// Variants of one node laid out over the shard range in id order.
///
/// Clamping rules when percentages do not sum to 100:
/// - a shortfall is added to the control variant (the first variant by id if none is flagged);
/// - an excess is cut off: ranges stop at 100, so the last variants by id lose traffic.
#[derive(Debug)]
pub struct TrafficSplit<'a> {
    /// `(variant, end shard exclusive)`, ascending.
    ranges: Vec<(&'a Variant, u64)>,
    control: &'a Variant,
}

impl<'a> TrafficSplit<'a> {
    /// Lay out the node's variants, recording integrity problems in `warnings`.
    pub fn new(
        node: &'a ExperimentNode,
        warnings: &mut Vec<DataIntegrityWarning>,
    ) -> Option<TrafficSplit<'a>> {
        let mut variants: Vec<&Variant> = node.variants.iter().collect();
        variants.sort_by(|a, b| a.id.cmp(&b.id));

        let Some(&first) = variants.first() else {
            warnings.push(DataIntegrityWarning::EmptyExperiment {
                experiment_id: node.id.clone(),
            });
            return None;
        };

        let mut controls = variants.iter().filter(|v| v.is_control);
        let control = match (controls.next(), controls.next()) {
            (Some(&control), None) => control,
            (Some(&control), Some(_)) => {
                warnings.push(DataIntegrityWarning::MultipleControls {
                    experiment_id: node.id.clone(),
                });
                control
            }
            (None, _) => {
                warnings.push(DataIntegrityWarning::MissingControl {
                    experiment_id: node.id.clone(),
                });
                first
            }
        };

        let total: u32 = variants
            .iter()
            .fold(0u32, |acc, v| acc.saturating_add(v.traffic_percent));
        if total != 100 {
            warnings.push(DataIntegrityWarning::TrafficMismatch {
                experiment_id: node.id.clone(),
                total,
            });
        }
        let shortfall = 100u32.saturating_sub(total);

        let shards_per_percent = TOTAL_SHARDS / 100;
        let mut end = 0u64;
        let ranges = variants
            .into_iter()
            .map(|variant| {
                let mut percent = u64::from(variant.traffic_percent);
                if std::ptr::eq(variant, control) {
                    percent += u64::from(shortfall);
                }
                end = (end + percent * shards_per_percent).min(TOTAL_SHARDS);
                (variant, end)
            })
            .collect();

        Some(TrafficSplit { ranges, control })
    }

    /// Variant whose range contains `shard`.
    pub fn variant_for(&self, shard: u64) -> &'a Variant {
        self.ranges
            .iter()
            .find(|(_, end)| shard < *end)
            .map(|(variant, _)| *variant)
            // Ranges always reach TOTAL_SHARDS after clamping; the fallback only guards shards
            // outside the range.
            .unwrap_or(self.control)
    }

    /// The variant that absorbs clamping.
    pub fn control(&self) -> &'a Variant {
        self.control
    }
}
