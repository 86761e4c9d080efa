//! Configuration data model as authored by the administrative surface.
//!
//! All types mirror the JSON the serving layer reads from storage (`camelCase` fields). The
//! resolver only ever reads them.
use derive_more::From;
use serde::{Deserialize, Serialize};

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
///
/// This isolates errors in a subtree: if one config fails to parse (e.g., it was written by a
/// newer admin release), the rest of the snapshot is still usable.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}
impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// A named bundle of wrapper settings scoped to a publisher and optionally a website.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct WrapperConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub publisher_id: String,
    /// `None` for publisher-level configs.
    #[serde(default)]
    pub website_id: Option<String>,
    pub status: ConfigStatus,
    #[serde(default)]
    pub is_default: bool,
    /// Matching this config means the wrapper must not initialize at all.
    #[serde(default)]
    pub block_wrapper: bool,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub settings: WrapperSettings,
}

impl WrapperConfig {
    #[allow(missing_docs)]
    pub fn scope(&self) -> ConfigScope {
        if self.website_id.is_some() {
            ConfigScope::Website
        } else {
            ConfigScope::Publisher
        }
    }

    #[allow(missing_docs)]
    pub fn is_active(&self) -> bool {
        self.status == ConfigStatus::Active
    }
}

/// Ordered so that the narrower scope compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum ConfigScope {
    Publisher,
    Website,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ConfigStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

/// Wrapper settings. Every field is optional: an unset field never overrides a value set on a
/// lower precedence layer.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WrapperSettings {
    /// Auction timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub price_granularity: Option<PriceGranularity>,
    /// Bucket definition used when `price_granularity` is `custom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_price_buckets: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub send_all_bids: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub bidder_sequence: Option<BidderSequence>,
    /// Prebid floors module configuration, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floors: Option<serde_json::Value>,
    /// Prebid user sync configuration, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_sync: Option<serde_json::Value>,
    /// Ordered bidder list. Entries are merged across layers by bidder code.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bidders: Vec<BidderEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum PriceGranularity {
    Low,
    Medium,
    High,
    Auto,
    Dense,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum BidderSequence {
    Random,
    Fixed,
}

/// A bidder adapter the wrapper should call. Bidder codes are exact, case-sensitive identifiers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BidderEntry {
    pub code: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Adapter-specific parameters.
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
    /// Per-bidder timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// A condition set deciding whether its config applies to a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct TargetingRule {
    pub id: String,
    pub config_id: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub match_type: MatchType,
    /// Higher wins.
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// How the conditions of a [`TargetingRule`] combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    /// Every condition must hold. An empty condition list always matches.
    #[default]
    #[serde(alias = "all")]
    All,
    /// At least one condition must hold. An empty condition list never matches.
    #[serde(alias = "any")]
    Any,
}

/// `Condition` checks that the request `attribute` matches the condition `value` under the given
/// `operator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Condition {
    pub attribute: String,
    pub operator: ConditionOperator,
    pub value: ConditionValue,
}

/// Possible condition operators.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Attribute equals a scalar value.
    Equals,
    /// Attribute is present and differs from a scalar value.
    NotEquals,
    /// Attribute is one of the values. A scalar value is a one-element set.
    In,
    /// Attribute is present and none of the values.
    NotIn,
    /// Substring for string attributes, membership for list attributes.
    Contains,
    /// Attribute is present and does not contain the value.
    NotContains,
    /// Attribute matches a regex. Condition value must be a regex string.
    Regex,
    /// Greater than or equal. Semver when the value parses as a version, numeric otherwise.
    Gte,
    /// Greater than. Semver when the value parses as a version, numeric otherwise.
    Gt,
    /// Less than or equal. Semver when the value parses as a version, numeric otherwise.
    Lte,
    /// Less than. Semver when the value parses as a version, numeric otherwise.
    Lt,
}

/// Scalar condition value.
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum Value {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    pub(crate) fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Value::String(s) => std::borrow::Cow::Borrowed(s),
            Value::Number(n) => std::borrow::Cow::Owned(n.to_string()),
            Value::Boolean(b) => std::borrow::Cow::Owned(b.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum ConditionValue {
    Single(Value),
    Multiple(Vec<Value>),
}

impl<T: Into<Value>> From<T> for ConditionValue {
    fn from(value: T) -> Self {
        Self::Single(value.into())
    }
}
impl<T: Into<Value>> From<Vec<T>> for ConditionValue {
    fn from(value: Vec<T>) -> Self {
        Self::Multiple(value.into_iter().map(Into::into).collect())
    }
}

/// One A/B test node. Root nodes are associated with a config; nested nodes hang off a variant
/// of their parent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ExperimentNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Config this experiment runs on. Set for root nodes.
    #[serde(default)]
    pub config_id: Option<String>,
    #[serde(default)]
    pub parent_test_id: Option<String>,
    #[serde(default)]
    pub parent_variant_id: Option<String>,
    #[serde(default)]
    pub level: u32,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub start_date: Option<Timestamp>,
    #[serde(default)]
    pub end_date: Option<Timestamp>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl ExperimentNode {
    /// Eligible for assignment: running, and `now` within `[start_date, end_date]`.
    pub fn is_live(&self, now: Timestamp) -> bool {
        let forbidden = matches!(self.start_date, Some(t) if now < t)
            || matches!(self.end_date, Some(t) if now > t);
        self.status == ExperimentStatus::Running && !forbidden
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

/// One arm of an experiment.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Variant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Share of traffic, 0 to 100.
    pub traffic_percent: u32,
    #[serde(default)]
    pub is_control: bool,
    #[serde(default)]
    pub overrides: VariantOverrides,
}

/// Settings a variant applies on top of the selected config.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct VariantOverrides {
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub price_granularity: Option<PriceGranularity>,
    #[serde(default)]
    pub send_all_bids: Option<bool>,
    #[serde(default)]
    pub bidder_sequence: Option<BidderSequence>,
    #[serde(default)]
    pub floors: Option<serde_json::Value>,
    /// Field patches for bidders already in the list, matched by code.
    #[serde(default)]
    pub bidder_overrides: Vec<BidderOverride>,
    /// Bidders appended when their code is not configured yet.
    #[serde(default)]
    pub additional_bidders: Vec<BidderEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BidderOverride {
    pub code: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Shallow-merged into the existing params when both are objects.
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub priority: Option<i32>,
}
