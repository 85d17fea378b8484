//! Test doubles and common utilities for contract tests
//!
//! This module provides in-process fakes for the collaborator traits. Every
//! fake is cheaply cloneable and clones share their recorded calls, so a test
//! can hand one clone to the engine and inspect the other.

#![allow(dead_code)]

use o365sync_core::config::SyncConfig;
use o365sync_core::error::{Error, Result};
use o365sync_core::model::{EndpointCategory, EndpointRecord, ServiceArea};
use o365sync_core::traits::{
    DefaultAction, HttpResponse, HttpTransport, PolicyStore, TableKind, UrlRule,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Version token used by most tests
pub const VERSION: &str = "2021010100";

/// One scripted transport reply
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    TransportError(String),
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Reply::Status(200, body.into())
    }
}

#[derive(Debug, Default)]
struct Route {
    queue: VecDeque<Reply>,
    fallback: Option<Reply>,
    calls: usize,
}

impl Route {
    fn next(&mut self) -> Option<Reply> {
        self.calls += 1;
        self.queue.pop_front().or_else(|| self.fallback.clone())
    }
}

/// A transport answering the version and endpoint-list routes from scripts
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    version: Arc<Mutex<Route>>,
    endpoints: Arc<Mutex<Route>>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport publishing `version` and `records` for every instance
    pub fn serving(version: &str, records: &str) -> Self {
        let transport = Self::new();
        transport.version_always(Reply::ok(version_body(version)));
        transport.endpoints_always(Reply::ok(records));
        transport
    }

    /// Queue replies for the version route
    pub fn script_version(&self, replies: impl IntoIterator<Item = Reply>) {
        self.version.lock().unwrap().queue.extend(replies);
    }

    /// Reply used for the version route once the queue is empty
    pub fn version_always(&self, reply: Reply) {
        self.version.lock().unwrap().fallback = Some(reply);
    }

    /// Queue replies for the endpoint-list route
    pub fn script_endpoints(&self, replies: impl IntoIterator<Item = Reply>) {
        self.endpoints.lock().unwrap().queue.extend(replies);
    }

    /// Reply used for the endpoint-list route once the queue is empty
    pub fn endpoints_always(&self, reply: Reply) {
        self.endpoints.lock().unwrap().fallback = Some(reply);
    }

    pub fn version_calls(&self) -> usize {
        self.version.lock().unwrap().calls
    }

    pub fn endpoint_calls(&self) -> usize {
        self.endpoints.lock().unwrap().calls
    }

    /// Every requested URL, in order
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.urls.lock().unwrap().push(url.to_string());

        let route = if url.contains("/version") {
            &self.version
        } else if url.contains("/endpoints/") {
            &self.endpoints
        } else {
            return Ok(HttpResponse::new(404, "not found"));
        };

        match route.lock().unwrap().next() {
            Some(Reply::Status(status, body)) => Ok(HttpResponse::new(status, body)),
            Some(Reply::TransportError(message)) => Err(Error::fetch(message)),
            None => Err(Error::fetch("no scripted reply")),
        }
    }
}

/// A managed URL category as held by the fake store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCategory {
    pub rules: Vec<UrlRule>,
    pub default_action: DefaultAction,
}

/// A managed lookup table as held by the fake store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTable {
    pub kind: TableKind,
    pub content: String,
}

#[derive(Debug, Default)]
struct StoreState {
    container: bool,
    categories: BTreeMap<String, StoredCategory>,
    tables: BTreeMap<String, StoredTable>,
    operations: Vec<String>,
    reject: Option<String>,
    proxy: Option<String>,
}

/// A policy store keeping its objects in memory and logging every call
///
/// Lookup-table content is read from the source file at call time.
#[derive(Debug, Clone, Default)]
pub struct RecordingPolicyStore {
    state: Arc<Mutex<StoreState>>,
    writes: Arc<AtomicUsize>,
}

impl RecordingPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every operation whose log entry starts with `prefix`
    pub fn reject_operations(&self, prefix: &str) {
        self.state.lock().unwrap().reject = Some(prefix.to_string());
    }

    /// Proxy reported by `upstream_proxy`
    pub fn set_proxy(&self, proxy: &str) {
        self.state.lock().unwrap().proxy = Some(proxy.to_string());
    }

    pub fn has_container(&self) -> bool {
        self.state.lock().unwrap().container
    }

    pub fn category(&self, name: &str) -> Option<StoredCategory> {
        self.state.lock().unwrap().categories.get(name).cloned()
    }

    pub fn table(&self, name: &str) -> Option<StoredTable> {
        self.state.lock().unwrap().tables.get(name).cloned()
    }

    pub fn category_names(&self) -> Vec<String> {
        self.state.lock().unwrap().categories.keys().cloned().collect()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state.lock().unwrap().tables.keys().cloned().collect()
    }

    /// Log of every call, e.g. `replace_category Office_365_Managed_All`
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Number of mutating calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of all objects, for end-state comparisons
    pub fn snapshot(
        &self,
    ) -> (bool, BTreeMap<String, StoredCategory>, BTreeMap<String, StoredTable>) {
        let state = self.state.lock().unwrap();
        (state.container, state.categories.clone(), state.tables.clone())
    }

    fn log(&self, operation: String, mutating: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let rejected = state
            .reject
            .as_deref()
            .is_some_and(|prefix| operation.starts_with(prefix));
        state.operations.push(operation.clone());

        if rejected {
            return Err(Error::reconcile(operation, "rejected by test store"));
        }
        if mutating {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PolicyStore for RecordingPolicyStore {
    async fn ensure_container(&self) -> Result<()> {
        self.log("ensure_container".to_string(), true)?;
        self.state.lock().unwrap().container = true;
        Ok(())
    }

    async fn category_exists(&self, name: &str) -> Result<bool> {
        self.log(format!("category_exists {}", name), false)?;
        Ok(self.state.lock().unwrap().categories.contains_key(name))
    }

    async fn create_or_replace_url_category(
        &self,
        name: &str,
        rules: &[UrlRule],
        default_action: DefaultAction,
    ) -> Result<()> {
        self.log(format!("replace_category {}", name), true)?;
        self.state.lock().unwrap().categories.insert(
            name.to_string(),
            StoredCategory {
                rules: rules.to_vec(),
                default_action,
            },
        );
        Ok(())
    }

    async fn lookup_table_exists(&self, name: &str) -> Result<bool> {
        self.log(format!("table_exists {}", name), false)?;
        Ok(self.state.lock().unwrap().tables.contains_key(name))
    }

    async fn create_or_replace_lookup_table(
        &self,
        name: &str,
        kind: TableKind,
        source: &Path,
    ) -> Result<()> {
        self.log(format!("replace_table {}", name), true)?;
        let content = std::fs::read_to_string(source)
            .map_err(|e| Error::reconcile(format!("replace_table {}", name), e.to_string()))?;
        self.state
            .lock()
            .unwrap()
            .tables
            .insert(name.to_string(), StoredTable { kind, content });
        Ok(())
    }

    async fn upstream_proxy(&self) -> Result<Option<String>> {
        self.log("upstream_proxy".to_string(), false)?;
        Ok(self.state.lock().unwrap().proxy.clone())
    }

    async fn delete_url_category(&self, name: &str) -> Result<()> {
        self.log(format!("delete_category {}", name), true)?;
        self.state.lock().unwrap().categories.remove(name);
        Ok(())
    }

    async fn delete_lookup_table(&self, name: &str) -> Result<()> {
        self.log(format!("delete_table {}", name), true)?;
        self.state.lock().unwrap().tables.remove(name);
        Ok(())
    }

    async fn delete_container(&self) -> Result<()> {
        self.log("delete_container".to_string(), true)?;
        self.state.lock().unwrap().container = false;
        Ok(())
    }
}

/// Version list body publishing `version` for every instance
pub fn version_body(version: &str) -> String {
    serde_json::json!([
        {"instance": "Worldwide", "latest": version},
        {"instance": "USGovDoD", "latest": version},
        {"instance": "USGovGCCHigh", "latest": version},
        {"instance": "China", "latest": version},
        {"instance": "Germany", "latest": version}
    ])
    .to_string()
}

/// The single Exchange record used by the classification tests
pub fn exchange_record_body() -> String {
    serde_json::json!([{
        "id": 1,
        "serviceArea": "Exchange",
        "serviceAreaDisplayName": "Exchange Online",
        "urls": ["foo.example.com"],
        "ips": ["10.0.0.0/24"],
        "tcpPorts": "443",
        "expressRoute": true,
        "category": "Optimize",
        "required": true
    }])
    .to_string()
}

/// A small upstream list covering every service area and category
pub fn mixed_records_body() -> String {
    serde_json::json!([
        {"id": 1, "serviceArea": "Exchange", "category": "Optimize", "required": true,
         "urls": ["outlook.office.com", "outlook.office365.com"],
         "ips": ["13.107.6.152/31", "2603:1006::/40"]},
        {"id": 2, "serviceArea": "SharePoint", "category": "Optimize", "required": true,
         "urls": ["*.sharepoint.com"], "ips": ["13.107.136.0/22"]},
        {"id": 3, "serviceArea": "Skype", "category": "Allow", "required": true,
         "urls": ["*.lync.com"], "ips": ["52.112.0.0/14"]},
        {"id": 4, "serviceArea": "Common", "category": "Default", "required": false,
         "urls": ["*.office.net", "ocsp.digicert.com"]},
        {"id": 5, "serviceArea": "Common", "category": "Allow", "required": true,
         "urls": ["login.microsoftonline.com", "Login.MicrosoftOnline.com"],
         "ips": ["20.190.128.0/18"]},
        {"id": 6, "serviceArea": "Common", "category": "Default", "required": true}
    ])
    .to_string()
}

/// Build an endpoint record in code
pub fn record(
    area: ServiceArea,
    category: EndpointCategory,
    required: bool,
    urls: &[&str],
    ips: &[&str],
) -> EndpointRecord {
    EndpointRecord {
        id: "1".to_string(),
        service_area: area,
        required,
        category,
        urls: urls.iter().map(|u| u.to_string()).collect(),
        ip_prefixes: ips.iter().map(|i| i.to_string()).collect(),
    }
}

/// Configuration for the classification tests: Exchange only,
/// required-only, `all` + `optimize` sets, URL categories and IPv4/IPv6 tables
pub fn exchange_config() -> SyncConfig {
    SyncConfig::merge_json(&serde_json::json!({
        "service_areas": {"common": false, "exchange": true},
        "outputs": {
            "url_categories": true,
            "ip4_lookup_tables": true,
            "ip6_lookup_tables": true
        },
        "o365_categories": {"all": true, "optimize": true},
        "only_required": true
    }))
    .unwrap()
}

/// `config` with its working directory moved under `dir`
pub fn in_dir(mut config: SyncConfig, dir: &Path) -> SyncConfig {
    config.system.working_directory = dir.to_path_buf();
    config
}
