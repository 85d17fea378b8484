// # Policy Store Trait
//
// Defines the interface to the device configuration store that holds the
// managed URL categories and lookup tables.
//
// ## Implementations
//
// - tmsh: `o365sync-tmsh` crate
// - Tests: in-memory recording stores
//
// ## Object model
//
// All managed objects live inside one container. A URL category is a named
// list of [`UrlRule`]s with a default action. A lookup table is a named
// string or IP table whose content is loaded from a file on the local disk.
// Every create-or-replace call replaces the whole object; there are no
// incremental edits.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// How a URL rule matches a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// The pattern must equal the URL
    Exact,
    /// The pattern may contain `*` wildcards
    Glob,
}

impl MatchType {
    /// Store keyword for this match type
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Exact => "exact-match",
            MatchType::Glob => "glob-match",
        }
    }
}

/// One URL category rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRule {
    /// URL pattern (`https://host/`)
    pub pattern: String,
    /// Match semantics
    pub match_type: MatchType,
}

impl UrlRule {
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            match_type: MatchType::Exact,
        }
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            match_type: MatchType::Glob,
        }
    }
}

/// Action applied to traffic matching a URL category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultAction {
    #[default]
    Allow,
    Block,
}

impl DefaultAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DefaultAction::Allow => "allow",
            DefaultAction::Block => "block",
        }
    }
}

/// Content type of a lookup table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Host name keys
    String,
    /// Network prefix keys
    Ip,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::String => "string",
            TableKind::Ip => "ip",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for policy store implementations
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Issue store commands for the managed container and its objects
/// - ✅ Read the table source file passed to `create_or_replace_lookup_table`
///
/// ## Forbidden Capabilities
/// - ❌ Decide which objects to write (owned by the `Reconciler`)
/// - ❌ Delete or rewrite table source files (owned by the `Reconciler`)
/// - ❌ Retry rejected operations
///
/// Any rejection is reported as `Err(Error::Reconcile)` carrying the
/// store's output.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Create the managed container if it does not exist
    async fn ensure_container(&self) -> Result<(), crate::Error>;

    /// Whether a URL category with this name exists
    async fn category_exists(&self, name: &str) -> Result<bool, crate::Error>;

    /// Create the category, or replace all of its rules
    async fn create_or_replace_url_category(
        &self,
        name: &str,
        rules: &[UrlRule],
        default_action: DefaultAction,
    ) -> Result<(), crate::Error>;

    /// Whether a lookup table with this name exists
    async fn lookup_table_exists(&self, name: &str) -> Result<bool, crate::Error>;

    /// Create the table, or point it at new content loaded from `source`
    async fn create_or_replace_lookup_table(
        &self,
        name: &str,
        kind: TableKind,
        source: &Path,
    ) -> Result<(), crate::Error>;

    /// Upstream proxy configured on the device, as `http://host:port`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(url))`: A proxy is configured
    /// - `Ok(None)`: No proxy is configured
    async fn upstream_proxy(&self) -> Result<Option<String>, crate::Error>;

    /// Delete a URL category (no-op when absent)
    async fn delete_url_category(&self, name: &str) -> Result<(), crate::Error>;

    /// Delete a lookup table and its backing content (no-op when absent)
    async fn delete_lookup_table(&self, name: &str) -> Result<(), crate::Error>;

    /// Delete the managed container (no-op when absent)
    async fn delete_container(&self) -> Result<(), crate::Error>;
}
