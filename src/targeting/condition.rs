use std::{borrow::Cow, cmp::Ordering};

use regex::RegexBuilder;
use semver::Version;

use crate::{
    context::TargetingAttribute,
    models::{Condition, ConditionOperator, ConditionValue, Value},
    AttributeValue, RequestContext,
};

/// A condition that cannot be evaluated as written. It never matches.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MalformedCondition(pub(crate) String);

impl Condition {
    /// Evaluate the condition against a request. Total: anything that cannot be evaluated is
    /// `false`.
    pub fn evaluate(&self, context: &RequestContext) -> bool {
        self.try_evaluate(context).unwrap_or(false)
    }

    /// Evaluate the condition, reporting conditions that cannot be evaluated as written.
    ///
    /// A missing request attribute is not an error: it simply fails the condition.
    pub fn try_evaluate(&self, context: &RequestContext) -> Result<bool, MalformedCondition> {
        let attribute = TargetingAttribute::parse(&self.attribute);
        let value = context.get(&attribute);
        self.operator.try_eval(
            value.as_deref(),
            &self.value,
            attribute.is_case_insensitive(),
        )
    }
}

impl ConditionOperator {
    /// Applying `Operator` to the values. Returns `false` if the operator cannot be applied or
    /// there's a misconfiguration.
    #[cfg(test)]
    fn eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
        case_insensitive: bool,
    ) -> bool {
        self.try_eval(attribute, condition_value, case_insensitive)
            .unwrap_or(false)
    }

    fn try_eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
        case_insensitive: bool,
    ) -> Result<bool, MalformedCondition> {
        // Validate the condition before looking at the attribute, so that a broken condition is
        // reported even for requests that lack the attribute.
        match self {
            Self::Equals | Self::NotEquals => {
                let expected = single(condition_value, "a scalar value")?;
                let Some(actual) = attribute.and_then(AttributeValue::as_text) else {
                    return Ok(false);
                };
                let equal =
                    fold(&actual, case_insensitive) == fold(&expected.as_text(), case_insensitive);
                Ok(equal == (*self == Self::Equals))
            }

            Self::In | Self::NotIn => {
                let candidates: &[Value] = match condition_value {
                    ConditionValue::Multiple(values) => values,
                    ConditionValue::Single(value) => std::slice::from_ref(value),
                };
                let Some(actual) = attribute.and_then(AttributeValue::as_text) else {
                    return Ok(false);
                };
                let actual = fold(&actual, case_insensitive);
                let is_in = candidates
                    .iter()
                    .any(|candidate| fold(&candidate.as_text(), case_insensitive) == actual);
                Ok(is_in == (*self == Self::In))
            }

            Self::Contains | Self::NotContains => {
                let needle = single(condition_value, "a scalar value")?.as_text();
                let needle = fold(&needle, case_insensitive);
                let contains = match attribute {
                    None | Some(AttributeValue::Null) => return Ok(false),
                    Some(AttributeValue::List(items)) => items
                        .iter()
                        .any(|item| fold(item, case_insensitive) == needle),
                    Some(other) => match other.as_text() {
                        Some(haystack) => fold(&haystack, case_insensitive).contains(&*needle),
                        None => return Ok(false),
                    },
                };
                Ok(contains == (*self == Self::Contains))
            }

            Self::Regex => {
                let pattern = match single(condition_value, "a regex string")? {
                    Value::String(s) => s,
                    _ => return Err(MalformedCondition("expected a regex string".to_owned())),
                };
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(case_insensitive)
                    .build()
                    .map_err(|err| MalformedCondition(format!("invalid regex: {err}")))?;
                let Some(actual) = attribute.and_then(AttributeValue::as_text) else {
                    return Ok(false);
                };
                Ok(regex.is_match(&actual))
            }

            Self::Gte | Self::Gt | Self::Lte | Self::Lt => {
                let expected = single(condition_value, "a number or version")?;
                let Some(ordering) = compare(attribute, expected)? else {
                    return Ok(false);
                };
                Ok(match self {
                    Self::Gt => ordering == Ordering::Greater,
                    Self::Gte => ordering != Ordering::Less,
                    Self::Lt => ordering == Ordering::Less,
                    Self::Lte => ordering != Ordering::Greater,
                    _ => unreachable!("outer match only admits ordering operators"),
                })
            }
        }
    }
}

fn single<'a>(value: &'a ConditionValue, expected: &str) -> Result<&'a Value, MalformedCondition> {
    match value {
        ConditionValue::Single(v) => Ok(v),
        ConditionValue::Multiple(_) => Err(MalformedCondition(format!(
            "expected {expected}, found a list"
        ))),
    }
}

fn fold<'a>(s: &'a str, case_insensitive: bool) -> Cow<'a, str> {
    if case_insensitive {
        Cow::Owned(s.to_lowercase())
    } else {
        Cow::Borrowed(s)
    }
}

/// Order the attribute relative to the condition value. `Ok(None)` when the attribute is absent
/// or not comparable.
fn compare(
    attribute: Option<&AttributeValue>,
    expected: &Value,
) -> Result<Option<Ordering>, MalformedCondition> {
    let condition_version = match expected {
        Value::String(s) => Version::parse(s).ok(),
        _ => None,
    };

    if let Some(condition_version) = condition_version {
        // semver comparison
        let attribute_version = match attribute {
            Some(AttributeValue::String(s)) => Version::parse(s).ok(),
            _ => None,
        };
        return Ok(attribute_version.map(|v| v.cmp(&condition_version)));
    }

    // numeric comparison
    let condition_value: f64 = match expected {
        Value::Number(n) => *n,
        Value::String(s) => s.parse().map_err(|_| {
            MalformedCondition(format!("{s:?} is neither a number nor a version"))
        })?,
        Value::Boolean(_) => {
            return Err(MalformedCondition(
                "expected a number or version, found a boolean".to_owned(),
            ))
        }
    };
    let attribute_value: Option<f64> = match attribute {
        Some(AttributeValue::Number(n)) => Some(*n),
        Some(AttributeValue::String(s)) => s.parse().ok(),
        _ => None,
    };
    Ok(attribute_value.and_then(|v| v.partial_cmp(&condition_value)))
}

#[cfg(test)]
mod tests {
    use crate::{
        models::{Condition, ConditionOperator, Value},
        AttributeValue, RequestContext,
    };

    fn values(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::from(*s)).collect()
    }

    #[test]
    fn equals_ignores_case_for_builtin_attributes() {
        assert!(ConditionOperator::Equals.eval(Some(&"Chrome".into()), &"chrome".into(), true));
        assert!(!ConditionOperator::Equals.eval(Some(&"Chrome".into()), &"chrome".into(), false));
        assert!(ConditionOperator::Equals.eval(Some(&"appnexus".into()), &"appnexus".into(), false));
    }

    #[test]
    fn not_equals_fails_when_attribute_is_missing() {
        assert!(ConditionOperator::NotEquals.eval(Some(&"safari".into()), &"chrome".into(), true));
        assert!(!ConditionOperator::NotEquals.eval(Some(&"Chrome".into()), &"chrome".into(), true));
        assert!(!ConditionOperator::NotEquals.eval(None, &"chrome".into(), true));
    }

    #[test]
    fn equals_with_list_value_is_malformed() {
        let condition = Condition {
            attribute: "geo".into(),
            operator: ConditionOperator::Equals,
            value: values(&["US", "CA"]).into(),
        };
        let ctx = RequestContext::new("v").geo("US");
        assert!(condition.try_evaluate(&ctx).is_err());
        assert!(!condition.evaluate(&ctx));
    }

    #[test]
    fn in_and_not_in() {
        let set = values(&["US", "CA"]).into();
        assert!(ConditionOperator::In.eval(Some(&"us".into()), &set, true));
        assert!(!ConditionOperator::In.eval(Some(&"DE".into()), &set, true));
        assert!(ConditionOperator::NotIn.eval(Some(&"DE".into()), &set, true));
        assert!(!ConditionOperator::NotIn.eval(Some(&"CA".into()), &set, true));

        // NOT_IN fails when attribute is not specified
        assert!(!ConditionOperator::NotIn.eval(None, &set, true));
    }

    #[test]
    fn in_with_scalar_value_is_a_singleton_set() {
        assert!(ConditionOperator::In.eval(Some(&"US".into()), &"US".into(), true));
    }

    #[test]
    fn in_compares_numbers_and_booleans_as_text() {
        assert!(ConditionOperator::In.eval(Some(&42.0.into()), &values(&["42"]).into(), false));
        assert!(ConditionOperator::In.eval(Some(&true.into()), &values(&["true"]).into(), false));
        assert!(!ConditionOperator::In.eval(Some(&1.0.into()), &values(&["true"]).into(), false));
    }

    #[test]
    fn contains_substring_for_strings() {
        assert!(ConditionOperator::Contains.eval(
            Some(&"news.Example.com".into()),
            &"example".into(),
            true
        ));
        assert!(!ConditionOperator::Contains.eval(
            Some(&"news.example.com".into()),
            &"sports".into(),
            true
        ));
        assert!(ConditionOperator::NotContains.eval(
            Some(&"news.example.com".into()),
            &"sports".into(),
            true
        ));
        assert!(!ConditionOperator::NotContains.eval(None, &"sports".into(), true));
    }

    #[test]
    fn contains_membership_for_lists() {
        let segments = AttributeValue::List(vec!["sports".into(), "news".into()]);
        assert!(ConditionOperator::Contains.eval(Some(&segments), &"news".into(), false));
        // membership, not substring
        assert!(!ConditionOperator::Contains.eval(Some(&segments), &"new".into(), false));
        // custom attributes are case-sensitive
        assert!(!ConditionOperator::Contains.eval(Some(&segments), &"News".into(), false));
    }

    #[test]
    fn regex_matches() {
        assert!(ConditionOperator::Regex.eval(
            Some(&"www.example.com".into()),
            &r"^(www\.)?example\.com$".into(),
            true
        ));
        assert!(ConditionOperator::Regex.eval(
            Some(&"WWW.EXAMPLE.COM".into()),
            &r"^(www\.)?example\.com$".into(),
            true
        ));
        assert!(!ConditionOperator::Regex.eval(
            Some(&"example.org".into()),
            &r"^(www\.)?example\.com$".into(),
            true
        ));
        assert!(!ConditionOperator::Regex.eval(None, &"^.*$".into(), true));
    }

    #[test]
    fn malformed_regex_is_false() {
        let condition = Condition {
            attribute: "domain".into(),
            operator: ConditionOperator::Regex,
            value: "([a-z".into(),
        };
        let ctx = RequestContext::new("v").domain("example.com");
        assert!(condition.try_evaluate(&ctx).is_err());
        assert!(!condition.evaluate(&ctx));
    }

    #[test]
    fn unknown_attribute_is_false() {
        let condition = Condition {
            attribute: "planet".into(),
            operator: ConditionOperator::Equals,
            value: "earth".into(),
        };
        assert_eq!(
            condition.try_evaluate(&RequestContext::new("v").geo("US")),
            Ok(false)
        );
    }

    #[test]
    fn numeric_comparison() {
        assert!(ConditionOperator::Gte.eval(Some(&18.0.into()), &18.0.into(), false));
        assert!(!ConditionOperator::Gt.eval(Some(&18.0.into()), &18.0.into(), false));
        assert!(ConditionOperator::Lt.eval(Some(&"17".into()), &18.0.into(), false));
        assert!(ConditionOperator::Lte.eval(Some(&18.0.into()), &"18".into(), false));
        assert!(!ConditionOperator::Lt.eval(None, &18.0.into(), false));
    }

    #[test]
    fn semver_comparison() {
        assert!(ConditionOperator::Gte.eval(Some(&"1.13.0".into()), &"1.5.0".into(), true));
        assert!(!ConditionOperator::Gte.eval(Some(&"1.2.0".into()), &"1.10.0".into(), true));
        assert!(ConditionOperator::Lt.eval(Some(&"0.9.9".into()), &"1.0.0".into(), true));
        assert!(!ConditionOperator::Gt.eval(Some(&"1.0.0".into()), &"1.0.0".into(), true));
    }

    #[test]
    fn browser_version_condition() {
        let condition = Condition {
            attribute: "browserVersion".into(),
            operator: ConditionOperator::Gte,
            value: "120.0.0".into(),
        };
        let mut ctx = RequestContext::new("v");
        ctx.browser_version = Some("121.0.6167".into());
        assert!(condition.evaluate(&ctx));
        ctx.browser_version = Some("119.0.0".into());
        assert!(!condition.evaluate(&ctx));
    }

    #[test]
    fn comparison_against_boolean_is_malformed() {
        let condition = Condition {
            attribute: "pageDepth".into(),
            operator: ConditionOperator::Gt,
            value: true.into(),
        };
        let ctx = RequestContext::new("v").attribute("pageDepth", 3.0);
        assert!(condition.try_evaluate(&ctx).is_err());
    }
}
