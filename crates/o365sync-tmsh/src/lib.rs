// # tmsh Policy Store
//
// This crate provides the `PolicyStore` implementation that manages URL
// categories and lookup tables through the `tmsh` command shell.
//
// ## Trust Level: Untrusted (Policy Store)
//
// **Allowed Capabilities**:
// - ✅ Run `tmsh` commands for the `o365_update` application service and
//   the objects inside it
// - ✅ Parse tmsh output
//
// **Forbidden Capabilities**:
// - ❌ Retry rejected commands (the run aborts instead)
// - ❌ Write or delete table source files (owned by the Reconciler)
//
// ## Object Layout
//
// - Container: `sys application service o365_update`
// - URL categories: `sys url-db url-category o365_update.app/<name>`
// - Lookup tables: `sys file data-group o365_update.app/<name>` plus the
//   `ltm data-group external` of the same name that references it
//
// ## Output Handling
//
// Output containing `was not found` means the object does not exist. Listings
// and deletes are otherwise judged by exit status alone; their output echoes
// stored URLs verbatim. Mutating commands are also rejected when tmsh prints
// a coded error line (`01070734:3: ...`) or a syntax error.

pub mod executor;

use async_trait::async_trait;
use o365sync_core::reconciler::CONTAINER_NAME;
use o365sync_core::traits::{DefaultAction, MatchType, PolicyStore, TableKind, UrlRule};
use o365sync_core::{Error, Result};
use std::path::Path;

pub use executor::{CommandExecutor, CommandOutput, RealCommandExecutor};

/// Default tmsh binary
pub const TMSH_PATH: &str = "tmsh";

/// Marker printed by tmsh for missing objects
const NOT_FOUND: &str = "was not found";

/// tmsh-backed policy store
pub struct TmshPolicyStore {
    executor: Box<dyn CommandExecutor>,
    tmsh_path: String,
}

impl std::fmt::Debug for TmshPolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmshPolicyStore")
            .field("tmsh_path", &self.tmsh_path)
            .finish()
    }
}

impl Default for TmshPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TmshPolicyStore {
    /// Create a store running the system `tmsh`
    pub fn new() -> Self {
        Self::with_executor(Box::new(RealCommandExecutor::new()))
    }

    /// Create a store running commands through `executor`
    pub fn with_executor(executor: Box<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            tmsh_path: TMSH_PATH.to_string(),
        }
    }

    /// Use another tmsh binary
    pub fn with_tmsh_path(mut self, path: impl Into<String>) -> Self {
        self.tmsh_path = path.into();
        self
    }

    /// Run one tmsh command and return its output
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        tracing::debug!("tmsh {}", command);

        let args = vec!["-q".to_string(), "-c".to_string(), command.to_string()];
        self.executor
            .execute(&self.tmsh_path, &args)
            .await
            .map_err(|e| Error::reconcile(operation_name(command), format!("failed to run tmsh: {}", e)))
    }

    /// Run a mutating command; a failed exit or error text is a rejection
    async fn apply(&self, command: &str) -> Result<()> {
        let output = self.run(command).await?;
        if !output.success || has_error_text(&output) {
            return Err(Error::reconcile(operation_name(command), output.combined()));
        }
        Ok(())
    }

    /// Run a `list` command; `was not found` means absent
    async fn exists(&self, object: &str) -> Result<bool> {
        let command = format!("list {}", object);
        let output = self.run(&command).await?;
        let text = output.combined();

        if text.contains(NOT_FOUND) {
            return Ok(false);
        }
        if !output.success {
            return Err(Error::reconcile(operation_name(&command), text));
        }
        Ok(true)
    }

    /// Run a `delete` command; absent objects are skipped
    async fn delete(&self, object: &str) -> Result<()> {
        let command = format!("delete {}", object);
        let output = self.run(&command).await?;
        let text = output.combined();

        if text.contains(NOT_FOUND) {
            tracing::debug!("{} already absent", object);
            return Ok(());
        }
        if !output.success {
            return Err(Error::reconcile(operation_name(&command), text));
        }
        Ok(())
    }
}

fn container_path() -> String {
    format!("{}.app/{}", CONTAINER_NAME, CONTAINER_NAME)
}

fn object_path(name: &str) -> String {
    format!("{}.app/{}", CONTAINER_NAME, name)
}

fn url_category(name: &str) -> String {
    format!("sys url-db url-category {}", object_path(name))
}

fn file_data_group(name: &str) -> String {
    format!("sys file data-group {}", object_path(name))
}

fn external_data_group(name: &str) -> String {
    format!("ltm data-group external {}", object_path(name))
}

/// Whether tmsh reported an error despite its exit status
///
/// tmsh error lines start with an eight-digit hex code and a severity,
/// e.g. `01020036:3:`.
fn has_error_text(output: &CommandOutput) -> bool {
    output.combined().lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("Syntax Error:") || is_error_code_prefix(line)
    })
}

fn is_error_code_prefix(line: &str) -> bool {
    let mut parts = line.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(code), Some(severity), Some(_)) => {
            code.len() == 8
                && code.bytes().all(|b| b.is_ascii_hexdigit())
                && !severity.is_empty()
                && severity.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

/// First three words of a command, for error reports
fn operation_name(command: &str) -> String {
    command.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

/// tmsh rule list: `{ "https://a/" { type exact-match } ... }`
///
/// Wildcards in glob rules are escaped as `\*`.
pub fn render_rules(rules: &[UrlRule]) -> String {
    let mut rendered = String::from("{");
    for rule in rules {
        let pattern = match rule.match_type {
            MatchType::Glob => rule.pattern.replace('*', "\\*"),
            MatchType::Exact => rule.pattern.clone(),
        };
        rendered.push_str(&format!(
            " \"{}\" {{ type {} }}",
            pattern,
            rule.match_type.as_str()
        ));
    }
    rendered.push_str(" }");
    rendered
}

/// Parse `list sys management-proxy-config` output into `http://ip:port`
pub fn parse_proxy(output: &str) -> Option<String> {
    let mut ip = None;
    let mut port = None;

    for line in output.lines() {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("proxy-ip-addr"), Some(value)) => ip = Some(value.to_string()),
            (Some("proxy-port"), Some(value)) => port = Some(value.to_string()),
            _ => {}
        }
    }

    match (ip, port) {
        (Some(ip), Some(port)) if ip != "none" && port != "none" => {
            let host = if ip.contains(':') {
                format!("[{}]", ip)
            } else {
                ip
            };
            Some(format!("http://{}:{}", host, port))
        }
        _ => None,
    }
}

#[async_trait]
impl PolicyStore for TmshPolicyStore {
    async fn ensure_container(&self) -> Result<()> {
        if self
            .exists(&format!("sys application service {}", container_path()))
            .await?
        {
            return Ok(());
        }

        tracing::info!("Creating application service {}", CONTAINER_NAME);
        self.apply(&format!(
            "create sys application service {} traffic-group traffic-group-local-only device-group none",
            CONTAINER_NAME
        ))
        .await
    }

    async fn category_exists(&self, name: &str) -> Result<bool> {
        self.exists(&url_category(name)).await
    }

    async fn create_or_replace_url_category(
        &self,
        name: &str,
        rules: &[UrlRule],
        default_action: DefaultAction,
    ) -> Result<()> {
        let rules = render_rules(rules);

        if self.category_exists(name).await? {
            self.apply(&format!(
                "modify {} app-service {} urls replace-all-with {} default-action {}",
                url_category(name),
                container_path(),
                rules,
                default_action.as_str()
            ))
            .await
        } else {
            self.apply(&format!(
                "create sys url-db url-category {} display-name {} app-service {} urls replace-all-with {} default-action {}",
                name,
                name,
                container_path(),
                rules,
                default_action.as_str()
            ))
            .await
        }
    }

    async fn lookup_table_exists(&self, name: &str) -> Result<bool> {
        self.exists(&file_data_group(name)).await
    }

    async fn create_or_replace_lookup_table(
        &self,
        name: &str,
        kind: TableKind,
        source: &Path,
    ) -> Result<()> {
        if self.lookup_table_exists(name).await? {
            self.apply(&format!(
                "modify {} source-path file:{}",
                file_data_group(name),
                source.display()
            ))
            .await?;
        } else {
            let separator = match kind {
                TableKind::String => " separator \":=\"",
                TableKind::Ip => "",
            };
            self.apply(&format!(
                "create {}{} source-path file:{} type {}",
                file_data_group(name),
                separator,
                source.display(),
                kind.as_str()
            ))
            .await?;
        }

        if !self.exists(&external_data_group(name)).await? {
            self.apply(&format!(
                "create {} external-file-name {}",
                external_data_group(name),
                object_path(name)
            ))
            .await?;
        }
        Ok(())
    }

    async fn upstream_proxy(&self) -> Result<Option<String>> {
        let command = "list sys management-proxy-config proxy-ip-addr proxy-port";
        let output = self.run(command).await?;
        if !output.success {
            return Err(Error::reconcile(operation_name(command), output.combined()));
        }
        Ok(parse_proxy(&output.stdout))
    }

    async fn delete_url_category(&self, name: &str) -> Result<()> {
        self.delete(&url_category(name)).await
    }

    async fn delete_lookup_table(&self, name: &str) -> Result<()> {
        self.delete(&external_data_group(name)).await?;
        self.delete(&file_data_group(name)).await
    }

    async fn delete_container(&self) -> Result<()> {
        self.delete(&format!("sys application service {}", container_path()))
            .await
    }
}
