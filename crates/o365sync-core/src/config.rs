//! Configuration types for the O365 sync system
//!
//! [`SyncConfig`] is the typed run configuration. It is persisted inside the
//! state document and read once per run. New configurations are produced by
//! [`SyncConfig::merge_json`], a pure merge/validation step that fills absent
//! keys with defaults and reports the first invalid value with its stable
//! numeric tag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{ServiceArea, UrlCategory};
use crate::schedule;

/// Default working directory for lookup-table scratch files
pub const DEFAULT_WORKING_DIRECTORY: &str = "/shared/o365";

/// Upper bound for configured fetch attempts
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Upper bound for the delay between fetch attempts
pub const MAX_RETRY_DELAY_SECS: u64 = 300;

/// Main sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Customer endpoint instance to query
    pub endpoint: CustomerEndpoint,

    /// Service areas to import
    pub service_areas: ServiceAreas,

    /// Policy objects to produce
    pub outputs: Outputs,

    /// URL sets to produce
    #[serde(rename = "o365_categories")]
    pub categories: Categories,

    /// Import only records flagged as required
    pub only_required: bool,

    /// URL suffixes removed from every URL set
    #[serde(default)]
    pub excluded_urls: Vec<String>,

    /// URLs force-added per URL set
    #[serde(default)]
    pub included_urls: BTreeMap<UrlCategory, Vec<String>>,

    /// IP prefix suffixes removed from the IP sets
    #[serde(default)]
    pub excluded_ips: Vec<String>,

    /// Fetch retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// TLS trust settings for upstream requests
    #[serde(default)]
    pub tls: TlsConfig,

    /// Proxy selection for upstream requests
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Logging and scratch-file settings
    #[serde(default)]
    pub system: SystemConfig,

    /// Scheduling settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Default for SyncConfig {
    /// The configuration written by a plain install
    fn default() -> Self {
        Self {
            endpoint: CustomerEndpoint::Worldwide,
            service_areas: ServiceAreas {
                common: true,
                exchange: true,
                sharepoint: true,
                skype: true,
            },
            outputs: Outputs {
                url_categories: true,
                url_lookup_tables: true,
                ip4_lookup_tables: true,
                ip6_lookup_tables: true,
            },
            categories: Categories {
                all: true,
                optimize: true,
                default: true,
                allow: true,
            },
            only_required: true,
            excluded_urls: [
                ".symcd.com",
                ".symcb.com",
                ".entrust.net",
                ".digicert.com",
                ".identrust.com",
                ".verisign.net",
                ".globalsign.net",
                ".globalsign.com",
                ".geotrust.com",
                ".omniroot.com",
                ".letsencrypt.org",
                ".public-trust.com",
                "platform.linkedin.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            included_urls: BTreeMap::new(),
            excluded_ips: Vec::new(),
            retry: RetryPolicy::default(),
            tls: TlsConfig::default(),
            proxy: ProxyConfig::default(),
            system: SystemConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Build a configuration from user-supplied JSON
    ///
    /// Absent blocks and keys take the merge defaults (Common service area,
    /// URL categories output, `all` URL set, required-only). Present keys
    /// are type- and range-checked; the first failure is returned.
    pub fn merge_json(input: &Value) -> Result<Self> {
        let root = input
            .as_object()
            .ok_or_else(|| Error::config("configuration must be a JSON object"))?;

        let endpoint = match root.get("endpoint") {
            None => CustomerEndpoint::Worldwide,
            Some(value) => value
                .as_str()
                .and_then(CustomerEndpoint::parse)
                .ok_or_else(|| {
                    Error::validation(
                        1007,
                        "Endpoint value must be one of: \"Worldwide\", \"USGovDoD\", \
                         \"USGovGCCHigh\", \"China\", or \"Germany\"",
                    )
                })?,
        };

        let areas = block(root, "service_areas", 1006, "Service Areas")?;
        let service_areas = ServiceAreas {
            common: flag(areas, "common", true, 1006, "Service Areas")?,
            exchange: flag(areas, "exchange", false, 1006, "Service Areas")?,
            sharepoint: flag(areas, "sharepoint", false, 1006, "Service Areas")?,
            skype: flag(areas, "skype", false, 1008, "Service Areas")?,
        };

        let outputs = block(root, "outputs", 1009, "Outputs")?;
        let outputs = Outputs {
            url_categories: flag(outputs, "url_categories", true, 1009, "Outputs")?,
            url_lookup_tables: flag(outputs, "url_lookup_tables", false, 1010, "Outputs")?,
            ip4_lookup_tables: flag(outputs, "ip4_lookup_tables", false, 1011, "Outputs")?,
            ip6_lookup_tables: flag(outputs, "ip6_lookup_tables", false, 1012, "Outputs")?,
        };

        let categories = block(root, "o365_categories", 1013, "O365 Categories")?;
        let categories = Categories {
            all: flag(categories, "all", true, 1013, "O365 Categories")?,
            optimize: flag(categories, "optimize", false, 1014, "O365 Categories")?,
            default: flag(categories, "default", false, 1015, "O365 Categories")?,
            allow: flag(categories, "allow", false, 1016, "O365 Categories")?,
        };

        let only_required = match root.get("only_required") {
            None => true,
            Some(value) => value.as_bool().ok_or_else(|| {
                Error::validation(
                    1017,
                    "The \"only_required\" value must be a Boolean true or false",
                )
            })?,
        };

        let excluded_urls = string_list(root.get("excluded_urls"), "excluded_urls")?;
        let excluded_ips = string_list(root.get("excluded_ips"), "excluded_ips")?;
        let included_urls = included_urls(root.get("included_urls"))?;

        let config = Self {
            endpoint,
            service_areas,
            outputs,
            categories,
            only_required,
            excluded_urls,
            included_urls,
            excluded_ips,
            retry: retry_policy(block(root, "retry", 1024, "Retry")?)?,
            tls: tls_config(block(root, "tls", 1028, "TLS")?)?,
            proxy: proxy_config(root.get("proxy"))?,
            system: system_config(block(root, "system", 1018, "System")?)?,
            schedule: schedule_config(block(root, "schedule", 1020, "Schedule")?)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges that the type system does not enforce
    pub fn validate(&self) -> Result<()> {
        if self.system.log_level > 2 {
            return Err(Error::validation(
                1019,
                "The System \"log_level\" value must be an integer between 0 and 2",
            ));
        }

        self.retry.validate()?;
        self.schedule.validate()?;

        if let ProxyConfig::Explicit { url } = &self.proxy {
            validate_proxy_url(url)?;
        }

        validate_url_entries("excluded_urls", &self.excluded_urls)?;
        for urls in self.included_urls.values() {
            validate_url_entries("included_urls", urls)?;
        }

        Ok(())
    }

    /// Included URLs for one URL set (empty when none are configured)
    pub fn included_for(&self, category: UrlCategory) -> &[String] {
        self.included_urls
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Microsoft web service customer endpoint instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEndpoint {
    Worldwide,
    USGovDoD,
    USGovGCCHigh,
    China,
    Germany,
}

impl CustomerEndpoint {
    /// Instance name as used by the web service
    pub fn as_str(self) -> &'static str {
        match self {
            CustomerEndpoint::Worldwide => "Worldwide",
            CustomerEndpoint::USGovDoD => "USGovDoD",
            CustomerEndpoint::USGovGCCHigh => "USGovGCCHigh",
            CustomerEndpoint::China => "China",
            CustomerEndpoint::Germany => "Germany",
        }
    }

    /// Parse an instance name
    pub fn parse(name: &str) -> Option<Self> {
        [
            CustomerEndpoint::Worldwide,
            CustomerEndpoint::USGovDoD,
            CustomerEndpoint::USGovGCCHigh,
            CustomerEndpoint::China,
            CustomerEndpoint::Germany,
        ]
        .into_iter()
        .find(|e| e.as_str() == name)
    }
}

/// Service area selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAreas {
    pub common: bool,
    pub exchange: bool,
    pub sharepoint: bool,
    pub skype: bool,
}

impl ServiceAreas {
    /// Whether records of `area` are imported
    pub fn includes(&self, area: ServiceArea) -> bool {
        match area {
            ServiceArea::Common => self.common,
            ServiceArea::Exchange => self.exchange,
            ServiceArea::SharePoint => self.sharepoint,
            ServiceArea::Skype => self.skype,
            ServiceArea::Other => false,
        }
    }
}

/// Output object selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs {
    /// Create URL categories
    pub url_categories: bool,
    /// Create URL string lookup tables
    pub url_lookup_tables: bool,
    /// Create the IPv4 network lookup table
    pub ip4_lookup_tables: bool,
    /// Create the IPv6 network lookup table
    pub ip6_lookup_tables: bool,
}

impl Outputs {
    /// Whether any URL output is enabled
    pub fn any_url(&self) -> bool {
        self.url_categories || self.url_lookup_tables
    }
}

/// URL set selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    pub all: bool,
    pub optimize: bool,
    pub default: bool,
    pub allow: bool,
}

impl Categories {
    /// Whether the URL set for `category` is produced
    pub fn enabled(&self, category: UrlCategory) -> bool {
        match category {
            UrlCategory::All => self.all,
            UrlCategory::Optimize => self.optimize,
            UrlCategory::Default => self.default,
            UrlCategory::Allow => self.allow,
        }
    }
}

/// Fetch retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per request (0 behaves like 1)
    pub attempts: u32,

    /// Delay between attempts (in seconds)
    pub delay_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_seconds: 5,
        }
    }
}

impl RetryPolicy {
    /// Attempts to make for one request
    ///
    /// Forced (interactive) runs never retry.
    pub fn attempts_for(&self, forced: bool) -> u32 {
        if forced { 1 } else { self.attempts.max(1) }
    }

    /// Delay between attempts
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.attempts > MAX_RETRY_ATTEMPTS || self.delay_seconds > MAX_RETRY_DELAY_SECS {
            return Err(Error::validation(
                1024,
                format!(
                    "Retry \"attempts\" must be between 0 and {} and \"delay_seconds\" between 0 and {}",
                    MAX_RETRY_ATTEMPTS, MAX_RETRY_DELAY_SECS
                ),
            ));
        }
        Ok(())
    }
}

/// TLS trust settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM bundle of additional trusted roots (system roots when `None`)
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,
}

/// Proxy selection for upstream requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProxyConfig {
    /// Connect directly
    None,
    /// Use the upstream proxy configured on the policy store device
    #[default]
    System,
    /// Use the given proxy URL
    Explicit {
        /// Proxy URL (`http://host:port`)
        url: String,
    },
}

/// Logging and scratch-file settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// 0 = warnings only, 1 = normal, 2 = verbose
    pub log_level: u8,

    /// Directory for lookup-table scratch files
    pub working_directory: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: 1,
            working_directory: PathBuf::from(DEFAULT_WORKING_DIRECTORY),
        }
    }
}

/// Scheduler period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulePeriod {
    Weekly,
    #[default]
    Monthly,
}

/// Scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Run weekly or monthly
    pub periods: SchedulePeriod,

    /// Day of week (0 = Sunday) or day of month
    pub run_date: u8,

    /// 24-hour `HH:mm` run time
    pub run_time: String,

    /// Optional `m/d/Y` date before which runs are skipped
    #[serde(default)]
    pub start_date: String,

    /// Optional `HH:mm` time-of-day paired with `start_date`
    #[serde(default)]
    pub start_time: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            periods: SchedulePeriod::Monthly,
            run_date: 1,
            run_time: "04:00".to_string(),
            start_date: String::new(),
            start_time: String::new(),
        }
    }
}

impl ScheduleConfig {
    fn validate(&self) -> Result<()> {
        match self.periods {
            SchedulePeriod::Monthly if !(1..=31).contains(&self.run_date) => {
                return Err(Error::validation(
                    1005,
                    "Schedule \"run_date\" value for period(monthly) must be an integer between 1 and 31",
                ));
            }
            SchedulePeriod::Weekly if self.run_date > 6 => {
                return Err(Error::validation(
                    1003,
                    "Schedule \"run_date\" value for period(weekly) must be an integer between 0 (Sunday) and 6 (Saturday)",
                ));
            }
            _ => {}
        }

        schedule::parse_clock_time("run_time", &self.run_time)?;
        if !self.start_date.is_empty() {
            schedule::parse_start_date(&self.start_date)?;
        }
        if !self.start_time.is_empty() {
            schedule::parse_clock_time("start_time", &self.start_time)?;
        }
        Ok(())
    }
}

/// A present block must be an object; `null` counts as absent
fn block<'a>(
    root: &'a Map<String, Value>,
    key: &str,
    code: u16,
    label: &str,
) -> Result<Option<&'a Map<String, Value>>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(Error::validation(
            code,
            format!("The {} \"{}\" value must be an object", label, key),
        )),
    }
}

fn flag(
    block: Option<&Map<String, Value>>,
    key: &str,
    default: bool,
    code: u16,
    label: &str,
) -> Result<bool> {
    match block.and_then(|b| b.get(key)) {
        None => Ok(default),
        Some(value) => value.as_bool().ok_or_else(|| {
            Error::validation(
                code,
                format!("{} \"{}\" value must be a Boolean true or false", label, key),
            )
        }),
    }
}

fn string_list(value: Option<&Value>, key: &str) -> Result<Vec<String>> {
    let invalid = || {
        Error::validation(
            1025,
            format!("The \"{}\" value must be a list of strings", key),
        )
    };

    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(String::from).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
    }
}

/// A bare list is added to the `all` set; an object maps set names to lists.
fn included_urls(value: Option<&Value>) -> Result<BTreeMap<UrlCategory, Vec<String>>> {
    let mut included = BTreeMap::new();

    match value {
        None | Some(Value::Null) => {}
        Some(list @ Value::Array(_)) => {
            let urls = string_list(Some(list), "included_urls")?;
            if !urls.is_empty() {
                included.insert(UrlCategory::All, urls);
            }
        }
        Some(Value::Object(map)) => {
            for (key, urls) in map {
                let category = UrlCategory::parse(key).ok_or_else(|| {
                    Error::validation(
                        1026,
                        format!(
                            "The \"included_urls\" key \"{}\" must be one of: all, optimize, default, allow",
                            key
                        ),
                    )
                })?;
                included.insert(category, string_list(Some(urls), "included_urls")?);
            }
        }
        Some(_) => {
            return Err(Error::validation(
                1025,
                "The \"included_urls\" value must be a list of strings or an object of lists",
            ));
        }
    }

    Ok(included)
}

fn retry_policy(block: Option<&Map<String, Value>>) -> Result<RetryPolicy> {
    let defaults = RetryPolicy::default();
    let number = |key: &str, default: u64| -> Result<u64> {
        match block.and_then(|b| b.get(key)) {
            None => Ok(default),
            Some(value) => value.as_u64().ok_or_else(|| {
                Error::validation(
                    1024,
                    format!("Retry \"{}\" value must be a non-negative integer", key),
                )
            }),
        }
    };

    let attempts = number("attempts", u64::from(defaults.attempts))?;
    let attempts = u32::try_from(attempts)
        .map_err(|_| Error::validation(1024, "Retry \"attempts\" value is too large"))?;

    Ok(RetryPolicy {
        attempts,
        delay_seconds: number("delay_seconds", defaults.delay_seconds)?,
    })
}

fn tls_config(block: Option<&Map<String, Value>>) -> Result<TlsConfig> {
    match block.and_then(|b| b.get("ca_bundle")) {
        None | Some(Value::Null) => Ok(TlsConfig::default()),
        Some(Value::String(path)) if !path.is_empty() => Ok(TlsConfig {
            ca_bundle: Some(PathBuf::from(path)),
        }),
        Some(Value::String(_)) => Ok(TlsConfig::default()),
        Some(_) => Err(Error::validation(
            1028,
            "The TLS \"ca_bundle\" value must be a path or null",
        )),
    }
}

/// URL entries end up inside quoted store commands and table lines
fn validate_url_entries(key: &str, entries: &[String]) -> Result<()> {
    match entries
        .iter()
        .find(|e| e.contains(|c: char| c == '"' || c == '\\' || c.is_whitespace()))
    {
        Some(entry) => Err(Error::validation(
            1030,
            format!(
                "The \"{}\" entry {:?} must be a host name without quotes or whitespace",
                key, entry
            ),
        )),
        None => Ok(()),
    }
}

fn proxy_config(value: Option<&Value>) -> Result<ProxyConfig> {
    let invalid = |detail: &str| {
        Error::validation(
            1027,
            format!(
                "The \"proxy\" value {}: expected {{\"mode\": \"none\" | \"system\" | \"explicit\", \"url\": ...}}",
                detail
            ),
        )
    };

    let Some(value) = value else {
        return Ok(ProxyConfig::default());
    };
    let map = value.as_object().ok_or_else(|| invalid("is not an object"))?;

    match map.get("mode").and_then(Value::as_str) {
        None | Some("system") => Ok(ProxyConfig::System),
        Some("none") => Ok(ProxyConfig::None),
        Some("explicit") => {
            let url = map
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("is missing \"url\""))?;
            validate_proxy_url(url)?;
            Ok(ProxyConfig::Explicit {
                url: url.to_string(),
            })
        }
        Some(_) => Err(invalid("has an unknown mode")),
    }
}

fn validate_proxy_url(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::validation(
            1027,
            format!("The proxy url must use an http:// or https:// scheme. Got: {}", url),
        ))
    }
}

fn system_config(block: Option<&Map<String, Value>>) -> Result<SystemConfig> {
    let defaults = SystemConfig::default();

    let log_level = match block.and_then(|b| b.get("log_level")) {
        None => defaults.log_level,
        Some(value) => {
            let level = value.as_u64().ok_or_else(|| {
                Error::validation(
                    1018,
                    "The System \"log_level\" value must be an integer between 0 and 2",
                )
            })?;
            u8::try_from(level).ok().filter(|l| *l <= 2).ok_or_else(|| {
                Error::validation(
                    1019,
                    "The System \"log_level\" value must be an integer between 0 and 2",
                )
            })?
        }
    };

    let working_directory = match block.and_then(|b| b.get("working_directory")) {
        Some(Value::String(dir)) if !dir.is_empty() => PathBuf::from(dir),
        None => defaults.working_directory,
        Some(_) => {
            return Err(Error::validation(
                1029,
                "The System \"working_directory\" value must be a non-empty path",
            ));
        }
    };

    Ok(SystemConfig {
        log_level,
        working_directory,
    })
}

fn schedule_config(block: Option<&Map<String, Value>>) -> Result<ScheduleConfig> {
    let defaults = ScheduleConfig::default();
    let get = |key: &str| block.and_then(|b| b.get(key));

    let periods = match get("periods") {
        None => defaults.periods,
        Some(value) => match value.as_str() {
            Some("monthly") => SchedulePeriod::Monthly,
            Some("weekly") => SchedulePeriod::Weekly,
            _ => {
                return Err(Error::validation(
                    1020,
                    "The Schedule \"periods\" value must be one of: \"monthly\" or \"weekly\"",
                ));
            }
        },
    };

    let (type_code, range) = match periods {
        SchedulePeriod::Monthly => (1004, 1..=31),
        SchedulePeriod::Weekly => (1002, 0..=6),
    };
    let run_date = match get("run_date") {
        None => defaults.run_date,
        Some(Value::String(s)) if s.is_empty() => defaults.run_date,
        Some(value) => {
            let day = value.as_u64().ok_or_else(|| {
                Error::validation(
                    type_code,
                    format!(
                        "Schedule \"run_date\" value for period({}) must be an integer",
                        period_name(periods)
                    ),
                )
            })?;
            u8::try_from(day)
                .ok()
                .filter(|d| range.contains(d))
                .ok_or_else(|| {
                    Error::validation(
                        type_code + 1,
                        format!(
                            "Schedule \"run_date\" value for period({}) must be between {} and {}",
                            period_name(periods),
                            range.start(),
                            range.end()
                        ),
                    )
                })?
        }
    };

    let text = |key: &str, default: String| -> Result<String> {
        match get(key) {
            None => Ok(default),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(Error::validation(
                if key == "start_date" { 1023 } else { 1021 },
                format!("Schedule \"{}\" value must be a string", key),
            )),
        }
    };

    let mut run_time = text("run_time", defaults.run_time)?;
    if run_time.is_empty() {
        run_time = ScheduleConfig::default().run_time;
    }

    Ok(ScheduleConfig {
        periods,
        run_date,
        run_time,
        start_date: text("start_date", String::new())?,
        start_time: text("start_time", String::new())?,
    })
}

fn period_name(period: SchedulePeriod) -> &'static str {
    match period {
        SchedulePeriod::Monthly => "monthly",
        SchedulePeriod::Weekly => "weekly",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_takes_merge_defaults() {
        let config = SyncConfig::merge_json(&json!({})).unwrap();

        assert_eq!(config.endpoint, CustomerEndpoint::Worldwide);
        assert!(config.service_areas.common);
        assert!(!config.service_areas.exchange);
        assert!(config.outputs.url_categories);
        assert!(!config.outputs.url_lookup_tables);
        assert!(!config.outputs.ip4_lookup_tables);
        assert!(config.categories.all);
        assert!(!config.categories.optimize);
        assert!(config.only_required);
        assert!(config.excluded_urls.is_empty());
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.proxy, ProxyConfig::System);
        assert_eq!(config.schedule, ScheduleConfig::default());
    }

    #[test]
    fn test_default_document_is_valid() {
        let config = SyncConfig::default();
        config.validate().unwrap();

        let round = serde_json::to_value(&config).unwrap();
        assert_eq!(SyncConfig::merge_json(&round).unwrap(), config);
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = SyncConfig::merge_json(&json!({"endpoint": "Mars"})).unwrap_err();
        assert_eq!(err.code(), 1007);
    }

    #[test]
    fn test_flag_type_codes() {
        let cases = [
            (json!({"service_areas": {"exchange": "yes"}}), 1006),
            (json!({"service_areas": {"skype": 1}}), 1008),
            (json!({"outputs": {"url_categories": "x"}}), 1009),
            (json!({"outputs": {"ip6_lookup_tables": "x"}}), 1012),
            (json!({"o365_categories": {"allow": "x"}}), 1016),
            (json!({"only_required": "x"}), 1017),
        ];

        for (input, code) in cases {
            assert_eq!(SyncConfig::merge_json(&input).unwrap_err().code(), code, "{}", input);
        }
    }

    #[test]
    fn test_log_level_codes() {
        let err = SyncConfig::merge_json(&json!({"system": {"log_level": "x"}})).unwrap_err();
        assert_eq!(err.code(), 1018);
        let err = SyncConfig::merge_json(&json!({"system": {"log_level": 3}})).unwrap_err();
        assert_eq!(err.code(), 1019);
    }

    #[test]
    fn test_schedule_codes() {
        let weekly = |date: Value| json!({"schedule": {"periods": "weekly", "run_date": date}});
        let monthly = |date: Value| json!({"schedule": {"periods": "monthly", "run_date": date}});

        assert_eq!(SyncConfig::merge_json(&weekly(json!("x"))).unwrap_err().code(), 1002);
        assert_eq!(SyncConfig::merge_json(&weekly(json!(7))).unwrap_err().code(), 1003);
        assert_eq!(SyncConfig::merge_json(&monthly(json!("x"))).unwrap_err().code(), 1004);
        assert_eq!(SyncConfig::merge_json(&monthly(json!(0))).unwrap_err().code(), 1005);

        let err = SyncConfig::merge_json(&json!({"schedule": {"periods": "daily"}})).unwrap_err();
        assert_eq!(err.code(), 1020);
        let err = SyncConfig::merge_json(&json!({"schedule": {"run_time": "4pm"}})).unwrap_err();
        assert_eq!(err.code(), 1021);
        let err = SyncConfig::merge_json(&json!({"schedule": {"start_date": "2021-01-01"}}))
            .unwrap_err();
        assert_eq!(err.code(), 1023);
    }

    #[test]
    fn test_empty_run_date_uses_default() {
        let config =
            SyncConfig::merge_json(&json!({"schedule": {"run_date": "", "run_time": ""}})).unwrap();
        assert_eq!(config.schedule.run_date, 1);
        assert_eq!(config.schedule.run_time, "04:00");
    }

    #[test]
    fn test_included_urls_forms() {
        let config =
            SyncConfig::merge_json(&json!({"included_urls": ["a.example.com"]})).unwrap();
        assert_eq!(config.included_for(UrlCategory::All), ["a.example.com".to_string()]);
        assert!(config.included_for(UrlCategory::Optimize).is_empty());

        let config = SyncConfig::merge_json(
            &json!({"included_urls": {"optimize": ["b.example.com"]}}),
        )
        .unwrap();
        assert_eq!(config.included_for(UrlCategory::Optimize), ["b.example.com".to_string()]);

        let err = SyncConfig::merge_json(&json!({"included_urls": {"bogus": []}})).unwrap_err();
        assert_eq!(err.code(), 1026);
        let err = SyncConfig::merge_json(&json!({"excluded_urls": [1, 2]})).unwrap_err();
        assert_eq!(err.code(), 1025);
    }

    #[test]
    fn test_retry_bounds() {
        let config =
            SyncConfig::merge_json(&json!({"retry": {"attempts": 0, "delay_seconds": 1}})).unwrap();
        assert_eq!(config.retry.attempts_for(false), 1);

        let err = SyncConfig::merge_json(&json!({"retry": {"attempts": 11}})).unwrap_err();
        assert_eq!(err.code(), 1024);
    }

    #[test]
    fn test_forced_runs_never_retry() {
        let policy = RetryPolicy {
            attempts: 5,
            delay_seconds: 1,
        };
        assert_eq!(policy.attempts_for(false), 5);
        assert_eq!(policy.attempts_for(true), 1);
    }

    #[test]
    fn test_proxy_modes() {
        let config = SyncConfig::merge_json(&json!({"proxy": {"mode": "none"}})).unwrap();
        assert_eq!(config.proxy, ProxyConfig::None);

        let config = SyncConfig::merge_json(
            &json!({"proxy": {"mode": "explicit", "url": "http://10.1.1.1:3128"}}),
        )
        .unwrap();
        assert_eq!(
            config.proxy,
            ProxyConfig::Explicit {
                url: "http://10.1.1.1:3128".to_string()
            }
        );

        let err = SyncConfig::merge_json(&json!({"proxy": {"mode": "explicit"}})).unwrap_err();
        assert_eq!(err.code(), 1027);
    }

    #[test]
    fn test_service_area_selection() {
        let config = SyncConfig::merge_json(&json!({"service_areas": {"exchange": true}})).unwrap();
        assert!(config.service_areas.includes(ServiceArea::Common));
        assert!(config.service_areas.includes(ServiceArea::Exchange));
        assert!(!config.service_areas.includes(ServiceArea::Skype));
        assert!(!config.service_areas.includes(ServiceArea::Other));
    }

    #[test]
    fn test_non_object_blocks_are_rejected() {
        let cases = [
            (json!({"service_areas": true}), 1006),
            (json!({"outputs": true}), 1009),
            (json!({"o365_categories": ["all"]}), 1013),
            (json!({"retry": 3}), 1024),
            (json!({"tls": "/etc/ssl/ca.pem"}), 1028),
            (json!({"system": 1}), 1018),
            (json!({"schedule": "weekly"}), 1020),
        ];

        for (input, code) in cases {
            assert_eq!(SyncConfig::merge_json(&input).unwrap_err().code(), code, "{}", input);
        }

        let config = SyncConfig::merge_json(&json!({"outputs": null})).unwrap();
        assert!(config.outputs.url_categories);
    }

    #[test]
    fn test_path_values_are_validated() {
        let err = SyncConfig::merge_json(&json!({"tls": {"ca_bundle": 5}})).unwrap_err();
        assert_eq!(err.code(), 1028);
        assert!(err.is_config());

        let err =
            SyncConfig::merge_json(&json!({"system": {"working_directory": ""}})).unwrap_err();
        assert_eq!(err.code(), 1029);
        let err =
            SyncConfig::merge_json(&json!({"system": {"working_directory": false}})).unwrap_err();
        assert_eq!(err.code(), 1029);

        let config =
            SyncConfig::merge_json(&json!({"tls": {"ca_bundle": "/etc/ssl/ca.pem"}})).unwrap();
        assert_eq!(config.tls.ca_bundle, Some(PathBuf::from("/etc/ssl/ca.pem")));
    }

    #[test]
    fn test_url_entries_must_be_plain_host_names() {
        let err = SyncConfig::merge_json(&json!({"included_urls": ["bad\"host.example.com"]}))
            .unwrap_err();
        assert_eq!(err.code(), 1030);

        let err = SyncConfig::merge_json(
            &json!({"included_urls": {"optimize": ["two words.example.com"]}}),
        )
        .unwrap_err();
        assert_eq!(err.code(), 1030);

        let err =
            SyncConfig::merge_json(&json!({"excluded_urls": [".example.com\t"]})).unwrap_err();
        assert_eq!(err.code(), 1030);

        let config =
            SyncConfig::merge_json(&json!({"included_urls": ["*.errorreporting.example.com"]}))
                .unwrap();
        assert_eq!(config.included_for(UrlCategory::All).len(), 1);
    }
}
