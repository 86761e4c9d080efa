//! Per-request targeting attributes.
use std::{borrow::Cow, collections::HashMap};

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Custom request attributes that have no dedicated field on [`RequestContext`].
///
/// # Examples
/// ```
/// # use prebid_config::{Attributes, AttributeValue};
/// let attributes = [
///     ("adUnit".to_owned(), "div-gpt-top".into()),
///     ("pageDepth".to_owned(), 3.0.into()),
///     ("segments".to_owned(), vec!["sports".to_owned(), "news".to_owned()].into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, AttributeValue>;

/// Value of a custom request attribute.
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A list of strings. `contains` checks membership for list attributes.
    List(Vec<String>),
    /// A null value or absence of value.
    Null,
}

impl AttributeValue {
    /// Scalar text form used for comparisons. `None` for lists and nulls.
    pub(crate) fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            AttributeValue::String(s) => Some(Cow::Borrowed(s)),
            AttributeValue::Number(n) => Some(Cow::Owned(n.to_string())),
            AttributeValue::Boolean(b) => Some(Cow::Owned(b.to_string())),
            AttributeValue::List(_) | AttributeValue::Null => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// Attributes of a single ad request. Ephemeral: built by the serving layer, never stored.
///
/// `bucket_key` must be derived from a durable visitor or session identifier so that the same
/// visitor keeps landing in the same experiment variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct RequestContext {
    pub bucket_key: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub geo: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub browser_version: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl RequestContext {
    /// Create a context with only a bucketing key.
    ///
    /// ```
    /// # use prebid_config::RequestContext;
    /// let ctx = RequestContext::new("visitor-42").geo("US").device("mobile");
    /// assert_eq!(ctx.geo.as_deref(), Some("US"));
    /// ```
    pub fn new(bucket_key: impl Into<String>) -> Self {
        RequestContext {
            bucket_key: bucket_key.into(),
            ..Default::default()
        }
    }

    #[allow(missing_docs)]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[allow(missing_docs)]
    pub fn geo(mut self, geo: impl Into<String>) -> Self {
        self.geo = Some(geo.into());
        self
    }

    #[allow(missing_docs)]
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    #[allow(missing_docs)]
    pub fn browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = Some(browser.into());
        self
    }

    #[allow(missing_docs)]
    pub fn os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    #[allow(missing_docs)]
    pub fn browser_version(mut self, version: impl Into<String>) -> Self {
        self.browser_version = Some(version.into());
        self
    }

    #[allow(missing_docs)]
    pub fn os_version(mut self, version: impl Into<String>) -> Self {
        self.os_version = Some(version.into());
        self
    }

    /// Set a custom attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up an attribute through the registry. Empty built-in fields count as absent.
    pub(crate) fn get(&self, attribute: &TargetingAttribute<'_>) -> Option<Cow<'_, AttributeValue>> {
        let field = match attribute {
            TargetingAttribute::Domain => &self.domain,
            TargetingAttribute::Geo => &self.geo,
            TargetingAttribute::Device => &self.device,
            TargetingAttribute::Browser => &self.browser,
            TargetingAttribute::Os => &self.os,
            TargetingAttribute::BrowserVersion => &self.browser_version,
            TargetingAttribute::OsVersion => &self.os_version,
            TargetingAttribute::Custom(name) => {
                return match self.attributes.get(*name) {
                    None | Some(AttributeValue::Null) => None,
                    Some(value) => Some(Cow::Borrowed(value)),
                };
            }
        };
        field
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| Cow::Owned(AttributeValue::String(s.to_owned())))
    }
}

/// Registry of attributes a targeting condition can reference.
///
/// Case sensitivity is a property of the attribute, not of the condition:
///
/// | attribute                                  | comparison       |
/// |--------------------------------------------|------------------|
/// | `domain`, `geo`, `device`, `browser`, `os` | case-insensitive |
/// | `browserVersion`, `osVersion`              | case-insensitive |
/// | anything else (custom attributes)          | case-sensitive   |
///
/// `country` is accepted as an alias of `geo` and `deviceType` as an alias of `device`.
///
/// Custom attributes carry exact identifiers such as bidder codes or ad unit codes, so they are
/// compared verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TargetingAttribute<'a> {
    Domain,
    Geo,
    Device,
    Browser,
    Os,
    BrowserVersion,
    OsVersion,
    /// Looked up in [`RequestContext::attributes`].
    Custom(&'a str),
}

impl<'a> TargetingAttribute<'a> {
    /// Resolve an attribute name as written in a condition.
    pub fn parse(name: &'a str) -> Self {
        match name {
            "domain" => Self::Domain,
            "geo" | "country" => Self::Geo,
            "device" | "deviceType" => Self::Device,
            "browser" => Self::Browser,
            "os" => Self::Os,
            "browserVersion" => Self::BrowserVersion,
            "osVersion" => Self::OsVersion,
            other => Self::Custom(other),
        }
    }

    /// Whether string comparisons on this attribute ignore case.
    pub fn is_case_insensitive(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}
