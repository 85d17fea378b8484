//! Policy store reconciliation
//!
//! Every managed object is rebuilt from its classified set on each run:
//! URL categories get their full rule list replaced, lookup tables are
//! pointed at a freshly written source file. Nothing is diffed.
//!
//! Rejections from the store abort immediately; the reconciler never retries.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::{ClassifiedSet, ClassifiedSets, SetName, UrlCategory};
use crate::traits::{DefaultAction, PolicyStore, TableKind, UrlRule};

/// Container holding every managed object
pub const CONTAINER_NAME: &str = "o365_update";

/// Store object name for a classified set
///
/// URL categories and URL lookup tables share the same names.
pub fn object_name(set: SetName) -> &'static str {
    match set {
        SetName::Url(UrlCategory::All) => "Office_365_Managed_All",
        SetName::Url(UrlCategory::Optimize) => "Office_365_Managed_Optimized",
        SetName::Url(UrlCategory::Default) => "Office_365_Managed_Default",
        SetName::Url(UrlCategory::Allow) => "Office_365_Managed_Allow",
        SetName::Ipv4 => "Office_365_Managed_IPv4",
        SetName::Ipv6 => "Office_365_Managed_IPv6",
    }
}

/// URL category rules for `entries`
///
/// The first rule is the `https://<version>/` marker. Each entry then yields
/// an `https://` and an `http://` rule; wildcard entries are glob rules.
pub fn url_rules<'e>(entries: impl IntoIterator<Item = &'e String>, version: &str) -> Vec<UrlRule> {
    let mut rules = vec![version_marker(version)];

    for entry in entries {
        for scheme in ["https", "http"] {
            let pattern = format!("{}://{}/", scheme, entry);
            rules.push(if entry.contains('*') {
                UrlRule::glob(pattern)
            } else {
                UrlRule::exact(pattern)
            });
        }
    }

    rules
}

fn version_marker(version: &str) -> UrlRule {
    UrlRule::exact(format!("https://{}/", version))
}

/// String lookup table source: `"<entry>" := "",` per line, wildcards removed
pub fn render_string_table(set: &ClassifiedSet) -> String {
    let entries: BTreeSet<String> = set.entries.iter().map(|e| e.replace('*', "")).collect();
    entries
        .iter()
        .map(|e| format!("\"{}\" := \"\",\n", e))
        .collect()
}

/// IP lookup table source: `network <prefix>,` per line
pub fn render_ip_table(set: &ClassifiedSet) -> String {
    set.entries
        .iter()
        .map(|e| format!("network {},\n", e))
        .collect()
}

/// Objects written by one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// URL categories replaced
    pub url_categories: Vec<String>,
    /// Lookup tables replaced
    pub lookup_tables: Vec<String>,
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} URL categories, {} lookup tables",
            self.url_categories.len(),
            self.lookup_tables.len()
        )
    }
}

/// Applies classified sets to a [`PolicyStore`]
pub struct Reconciler<'a> {
    store: &'a dyn PolicyStore,
    working_directory: PathBuf,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler writing table sources under `working_directory`
    pub fn new(store: &'a dyn PolicyStore, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            store,
            working_directory: working_directory.into(),
        }
    }

    /// Rebuild every enabled output from `sets`
    pub async fn reconcile(
        &self,
        sets: &ClassifiedSets,
        config: &SyncConfig,
        version: &str,
    ) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let outputs = &config.outputs;

        if !(outputs.any_url() || outputs.ip4_lookup_tables || outputs.ip6_lookup_tables) {
            info!("No outputs enabled, nothing to reconcile");
            return Ok(summary);
        }

        self.store.ensure_container().await?;

        let url_sets = UrlCategory::ALL
            .into_iter()
            .filter(|c| config.categories.enabled(*c))
            .map(|c| set_for(sets, SetName::Url(c)))
            .collect::<Result<Vec<_>>>()?;

        if outputs.url_categories {
            for set in &url_sets {
                let name = object_name(set.name);
                self.reconcile_category(name, set, version).await?;
                summary.url_categories.push(name.to_string());
            }
        }

        if outputs.url_lookup_tables {
            for set in &url_sets {
                let name = object_name(set.name);
                self.reconcile_table(name, TableKind::String, &render_string_table(set))
                    .await?;
                summary.lookup_tables.push(name.to_string());
            }
        }

        for (enabled, set_name) in [
            (outputs.ip4_lookup_tables, SetName::Ipv4),
            (outputs.ip6_lookup_tables, SetName::Ipv6),
        ] {
            if enabled {
                let set = set_for(sets, set_name)?;
                let name = object_name(set_name);
                self.reconcile_table(name, TableKind::Ip, &render_ip_table(set))
                    .await?;
                summary.lookup_tables.push(name.to_string());
            }
        }

        info!("Reconciled {}", summary);
        Ok(summary)
    }

    async fn reconcile_category(&self, name: &str, set: &ClassifiedSet, version: &str) -> Result<()> {
        if !self.store.category_exists(name).await? {
            debug!("Creating URL category {}", name);
            self.store
                .create_or_replace_url_category(name, &[version_marker(version)], DefaultAction::Allow)
                .await?;
        }

        let rules = url_rules(&set.entries, version);
        debug!("Replacing URL category {} with {} rules", name, rules.len());
        self.store
            .create_or_replace_url_category(name, &rules, DefaultAction::Allow)
            .await
    }

    /// Write `content` to the working directory, point the table at it,
    /// then remove the file whatever the outcome
    async fn reconcile_table(&self, name: &str, kind: TableKind, content: &str) -> Result<()> {
        let path = self.working_directory.join(name);
        fs::write(&path, content).await.map_err(|e| {
            Error::reconcile(
                format!("write {}", path.display()),
                format!("failed to write lookup table source: {}", e),
            )
        })?;

        let result = self.point_table(name, kind, &path).await;

        if let Err(e) = fs::remove_file(&path).await {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
        result
    }

    async fn point_table(&self, name: &str, kind: TableKind, path: &Path) -> Result<()> {
        let exists = self.store.lookup_table_exists(name).await?;
        debug!(
            "{} {} lookup table {}",
            if exists { "Replacing" } else { "Creating" },
            kind,
            name
        );
        self.store
            .create_or_replace_lookup_table(name, kind, path)
            .await
    }

    /// Delete every managed object and the container
    ///
    /// Objects that do not exist are skipped by the store.
    pub async fn remove_all(&self) -> Result<()> {
        for category in UrlCategory::ALL {
            self.store
                .delete_url_category(object_name(SetName::Url(category)))
                .await?;
        }
        for set in SetName::ALL {
            self.store.delete_lookup_table(object_name(set)).await?;
        }
        self.store.delete_container().await?;

        info!("Removed all managed policy objects");
        Ok(())
    }
}

fn set_for(sets: &ClassifiedSets, name: SetName) -> Result<&ClassifiedSet> {
    sets.get(&name).ok_or_else(|| {
        Error::reconcile(
            "prepare",
            format!("no classified set named {}", name),
        )
    })
}
