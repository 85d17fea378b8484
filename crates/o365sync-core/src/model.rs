//! Data model shared by the fetcher, classifier and reconciler
//!
//! Upstream records are decoded into [`EndpointRecord`]s; the classifier turns
//! them into one [`ClassifiedSet`] per [`SetName`].

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Provider service area of an endpoint record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceArea {
    /// Microsoft 365 Common and Office Online
    Common,
    /// Exchange Online
    Exchange,
    /// SharePoint Online and OneDrive for Business
    SharePoint,
    /// Skype for Business Online and Microsoft Teams
    Skype,
    /// Any service area this version does not know about
    #[serde(other)]
    Other,
}

/// Provider traffic category of an endpoint record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EndpointCategory {
    Optimize,
    Default,
    Allow,
    #[default]
    #[serde(other)]
    Unspecified,
}

/// One upstream endpoint record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    /// Record identifier (numeric upstream, kept as text)
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,

    /// Service area this record belongs to
    pub service_area: ServiceArea,

    /// Whether the provider marks the record as required
    #[serde(default)]
    pub required: bool,

    /// Provider traffic category
    #[serde(default)]
    pub category: EndpointCategory,

    /// URL patterns (may contain `*` wildcards)
    #[serde(default)]
    pub urls: BTreeSet<String>,

    /// IPv4/IPv6 prefixes in CIDR text form
    #[serde(default, rename = "ips")]
    pub ip_prefixes: BTreeSet<String>,
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for id, got {}",
            other
        ))),
    }
}

/// URL output category, used both for record bucketing and for naming
/// the URL sets produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlCategory {
    All,
    Optimize,
    Default,
    Allow,
}

impl UrlCategory {
    /// All URL categories in reconciliation order
    pub const ALL: [UrlCategory; 4] = [
        UrlCategory::All,
        UrlCategory::Optimize,
        UrlCategory::Default,
        UrlCategory::Allow,
    ];

    /// The record category feeding this URL set (`None` for `all`)
    pub fn endpoint_category(self) -> Option<EndpointCategory> {
        match self {
            UrlCategory::All => None,
            UrlCategory::Optimize => Some(EndpointCategory::Optimize),
            UrlCategory::Default => Some(EndpointCategory::Default),
            UrlCategory::Allow => Some(EndpointCategory::Allow),
        }
    }

    /// Lower-case configuration key
    pub fn as_str(self) -> &'static str {
        match self {
            UrlCategory::All => "all",
            UrlCategory::Optimize => "optimize",
            UrlCategory::Default => "default",
            UrlCategory::Allow => "allow",
        }
    }

    /// Parse a configuration key
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == key)
    }
}

impl fmt::Display for UrlCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a classified output set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SetName {
    Url(UrlCategory),
    Ipv4,
    Ipv6,
}

impl SetName {
    /// Every set the classifier produces
    pub const ALL: [SetName; 6] = [
        SetName::Url(UrlCategory::All),
        SetName::Url(UrlCategory::Optimize),
        SetName::Url(UrlCategory::Default),
        SetName::Url(UrlCategory::Allow),
        SetName::Ipv4,
        SetName::Ipv6,
    ];

    /// Kind of entries held by sets with this name
    pub fn kind(self) -> SetKind {
        match self {
            SetName::Url(_) => SetKind::Url,
            SetName::Ipv4 | SetName::Ipv6 => SetKind::IpPrefix,
        }
    }
}

impl fmt::Display for SetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetName::Url(category) => write!(f, "{}", category),
            SetName::Ipv4 => f.write_str("ipv4"),
            SetName::Ipv6 => f.write_str("ipv6"),
        }
    }
}

/// Kind of entries in a classified set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    /// Host names / URL patterns
    Url,
    /// CIDR prefixes
    IpPrefix,
}

/// A deduplicated, filtered output collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSet {
    /// Set name (category tag)
    pub name: SetName,
    /// Entries, deduplicated and sorted
    pub entries: BTreeSet<String>,
}

impl ClassifiedSet {
    /// Create an empty set
    pub fn empty(name: SetName) -> Self {
        Self {
            name,
            entries: BTreeSet::new(),
        }
    }

    /// Kind of the entries
    pub fn kind(&self) -> SetKind {
        self.name.kind()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains(entry)
    }
}

/// Classifier output: one set per [`SetName`], always fully populated
pub type ClassifiedSets = BTreeMap<SetName, ClassifiedSet>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_decodes_upstream_shape() {
        let json = r#"{
            "id": 1,
            "serviceArea": "Exchange",
            "serviceAreaDisplayName": "Exchange Online",
            "urls": ["outlook.office.com", "outlook.office365.com"],
            "ips": ["13.107.6.152/31", "2603:1006::/40"],
            "tcpPorts": "80,443",
            "expressRoute": true,
            "category": "Optimize",
            "required": true
        }"#;

        let record: EndpointRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "1");
        assert_eq!(record.service_area, ServiceArea::Exchange);
        assert_eq!(record.category, EndpointCategory::Optimize);
        assert!(record.required);
        assert_eq!(record.urls.len(), 2);
        assert_eq!(record.ip_prefixes.len(), 2);
    }

    #[test]
    fn test_record_optional_fields_default() {
        let json = r#"{"id": "x9", "serviceArea": "Yammer", "required": false}"#;
        let record: EndpointRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "x9");
        assert_eq!(record.service_area, ServiceArea::Other);
        assert_eq!(record.category, EndpointCategory::Unspecified);
        assert!(record.urls.is_empty());
        assert!(record.ip_prefixes.is_empty());
    }

    #[test]
    fn test_url_category_keys() {
        for category in UrlCategory::ALL {
            assert_eq!(UrlCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(UrlCategory::parse("bogus"), None);
    }
}
