//! Endpoint classification
//!
//! Turns the upstream records into one deduplicated [`ClassifiedSet`] per
//! [`SetName`]. Disabled outputs yield empty sets, never missing keys.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::model::{ClassifiedSet, ClassifiedSets, EndpointRecord, SetName, UrlCategory};

/// Classify `records` according to `config`
///
/// 1. Records pass when they are required (or `only_required` is off) and
///    their service area is selected.
/// 2. Their URLs feed `all` and the set matching their category; their
///    prefixes feed `ipv4`/`ipv6` by form.
/// 3. Included URLs are added per set, bypassing step 1.
/// 4. Entries matching an exclusion suffix are removed. URL matching is
///    case-insensitive; IP matching is a plain string suffix.
pub fn classify(records: &[EndpointRecord], config: &SyncConfig) -> ClassifiedSets {
    let mut sets: ClassifiedSets = SetName::ALL
        .into_iter()
        .map(|name| (name, ClassifiedSet::empty(name)))
        .collect();

    let url_categories: Vec<UrlCategory> = if config.outputs.any_url() {
        UrlCategory::ALL
            .into_iter()
            .filter(|c| config.categories.enabled(*c))
            .collect()
    } else {
        Vec::new()
    };
    let ipv4 = config.outputs.ip4_lookup_tables;
    let ipv6 = config.outputs.ip6_lookup_tables;

    let eligible = records.iter().filter(|record| {
        (!config.only_required || record.required)
            && config.service_areas.includes(record.service_area)
    });

    let mut considered = 0usize;
    for record in eligible {
        considered += 1;

        for category in &url_categories {
            let matches = match category.endpoint_category() {
                None => true,
                Some(wanted) => record.category == wanted,
            };
            if matches {
                insert_urls(&mut sets, *category, record.urls.iter().map(String::as_str));
            }
        }

        for prefix in &record.ip_prefixes {
            let name = if prefix.contains(':') {
                SetName::Ipv6
            } else {
                SetName::Ipv4
            };
            let enabled = match name {
                SetName::Ipv6 => ipv6,
                _ => ipv4,
            };
            if enabled {
                insert(&mut sets, name, prefix.clone());
            }
        }
    }
    debug!("{} of {} records eligible", considered, records.len());

    for category in &url_categories {
        insert_urls(
            &mut sets,
            *category,
            config.included_for(*category).iter().map(String::as_str),
        );
    }

    let url_suffixes: Vec<String> = config
        .excluded_urls
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect();
    let ip_suffixes: Vec<&str> = config
        .excluded_ips
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();

    for set in sets.values_mut() {
        match set.name {
            SetName::Url(_) => set
                .entries
                .retain(|entry| !url_suffixes.iter().any(|s| entry.ends_with(s.as_str()))),
            SetName::Ipv4 | SetName::Ipv6 => set
                .entries
                .retain(|entry| !ip_suffixes.iter().any(|s| entry.ends_with(s))),
        }
    }

    let count = |name: SetName| sets.get(&name).map_or(0, ClassifiedSet::len);
    info!(
        "Classified: all={} optimize={} default={} allow={} ipv4={} ipv6={}",
        count(SetName::Url(UrlCategory::All)),
        count(SetName::Url(UrlCategory::Optimize)),
        count(SetName::Url(UrlCategory::Default)),
        count(SetName::Url(UrlCategory::Allow)),
        count(SetName::Ipv4),
        count(SetName::Ipv6)
    );

    sets
}

fn insert_urls<'u>(
    sets: &mut ClassifiedSets,
    category: UrlCategory,
    urls: impl Iterator<Item = &'u str>,
) {
    let lowered: BTreeSet<String> = urls
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_lowercase)
        .collect();
    if let Some(set) = sets.get_mut(&SetName::Url(category)) {
        set.entries.extend(lowered);
    }
}

fn insert(sets: &mut ClassifiedSets, name: SetName, entry: String) {
    if let Some(set) = sets.get_mut(&name) {
        set.entries.insert(entry);
    }
}
