use crate::{
    models::{Condition, MatchType, TargetingRule},
    DataIntegrityWarning, RequestContext,
};

impl TargetingRule {
    /// Whether the rule's conditions hold for the request. Ignores `enabled`.
    ///
    /// `ALL` over an empty condition list matches every request (default rules); `ANY` over an
    /// empty list matches nothing.
    pub fn matches(&self, context: &RequestContext) -> bool {
        self.matches_with_warnings(context, &mut Vec::new())
    }

    /// Same as [`TargetingRule::matches`], recording conditions that cannot be evaluated.
    pub(crate) fn matches_with_warnings(
        &self,
        context: &RequestContext,
        warnings: &mut Vec<DataIntegrityWarning>,
    ) -> bool {
        let mut eval = |condition: &Condition| {
            condition.try_evaluate(context).unwrap_or_else(|err| {
                warnings.push(DataIntegrityWarning::MalformedCondition {
                    rule_id: self.id.clone(),
                    attribute: condition.attribute.clone(),
                    reason: err.to_string(),
                });
                false
            })
        };

        match self.match_type {
            MatchType::All => self.conditions.iter().all(|c| eval(c)),
            MatchType::Any => self.conditions.iter().any(|c| eval(c)),
        }
    }
}
