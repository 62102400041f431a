// src/catalog.rs
use std::fmt;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::Error;

/// Google Chrome's "all logs" catalog.
pub const ALL_LOG_LIST_URL: &str = "https://www.gstatic.com/ct/log_list/v3/all_logs_list.json";

static CATALOG: OnceCell<LogList> = OnceCell::const_new();

/// The CT log catalog (log list v3 format).
#[derive(Debug, Serialize, Deserialize)]
pub struct LogList {
    pub operators: Vec<Operator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    #[serde(default)]
    pub email: Vec<String>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default)]
    pub description: String,
    pub log_id: Option<String>,
    /// Base64 DER-encoded SubjectPublicKeyInfo used to verify STH signatures.
    pub key: Option<String>,
    #[serde(default)]
    pub url: String,
    pub mmd: Option<u64>,
    #[serde(default)]
    pub state: Option<StateWrapper>,
    pub temporal_interval: Option<TemporalInterval>,
}

impl Log {
    pub fn status(&self) -> LogStatus {
        self.state.as_ref().map_or(LogStatus::Undefined, StateWrapper::status)
    }

    /// The log's public key as raw DER, if the catalog carries one.
    pub fn public_key_der(&self) -> Option<Vec<u8>> {
        let key = self.key.as_ref()?;
        match base64::engine::general_purpose::STANDARD.decode(key) {
            Ok(der) => Some(der),
            Err(e) => {
                debug!("could not decode public key for {}: {}", self.url, e);
                None
            }
        }
    }
}

/// The v3 log list represents state as a one-of object keyed by status name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateWrapper {
    #[serde(default)]
    pub usable: Option<StateTimestamp>,
    #[serde(default)]
    pub readonly: Option<StateTimestamp>,
    #[serde(default)]
    pub retired: Option<StateTimestamp>,
    #[serde(default)]
    pub rejected: Option<StateTimestamp>,
    #[serde(default)]
    pub qualified: Option<StateTimestamp>,
    #[serde(default)]
    pub pending: Option<StateTimestamp>,
}

impl StateWrapper {
    pub fn status(&self) -> LogStatus {
        if self.usable.is_some() {
            LogStatus::Usable
        } else if self.qualified.is_some() {
            LogStatus::Qualified
        } else if self.readonly.is_some() {
            LogStatus::ReadOnly
        } else if self.retired.is_some() {
            LogStatus::Retired
        } else if self.rejected.is_some() {
            LogStatus::Rejected
        } else if self.pending.is_some() {
            LogStatus::Pending
        } else {
            LogStatus::Undefined
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTimestamp {
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalInterval {
    pub start_inclusive: Option<String>,
    pub end_exclusive: Option<String>,
}

/// Lifecycle states a log can be in, also the `--status` filter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogStatus {
    Usable,
    Undefined,
    Retired,
    #[value(name = "readonly")]
    ReadOnly,
    Rejected,
    Pending,
    Qualified,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogStatus::Usable => "Usable",
            LogStatus::Undefined => "Undefined",
            LogStatus::Retired => "Retired",
            LogStatus::ReadOnly => "ReadOnly",
            LogStatus::Rejected => "Rejected",
            LogStatus::Pending => "Pending",
            LogStatus::Qualified => "Qualified",
        };
        write!(f, "{}", name)
    }
}

/// Operator filter values accepted on the command line. The canonical operator
/// record always comes from the fetched catalog; these variants only carry the
/// tokens used to match catalog names at resolve time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OperatorName {
    All,
    Google,
    Cloudflare,
    Digicert,
    Certly,
    Izenpe,
    Wosign,
    Venafi,
    Cnnic,
    Startcom,
    Sectigo,
    Letsencrypt,
    Trustasia,
    Wangshengnan,
    Gdca,
    Bptl,
    Nordunet,
    Sheca,
    Akamai,
    Mattpalmer,
    Uitac,
    Qihoo360,
}

impl OperatorName {
    /// Normalized spellings this filter value matches. The first token is the
    /// CLI spelling; extra tokens cover catalog names that do not normalize to
    /// their common abbreviation.
    fn tokens(&self) -> &'static [&'static str] {
        match self {
            OperatorName::All => &["all"],
            OperatorName::Google => &["google"],
            OperatorName::Cloudflare => &["cloudflare"],
            OperatorName::Digicert => &["digicert"],
            OperatorName::Certly => &["certly"],
            OperatorName::Izenpe => &["izenpe"],
            OperatorName::Wosign => &["wosign"],
            OperatorName::Venafi => &["venafi"],
            OperatorName::Cnnic => &["cnnic"],
            OperatorName::Startcom => &["startcom"],
            OperatorName::Sectigo => &["sectigo"],
            OperatorName::Letsencrypt => &["letsencrypt"],
            OperatorName::Trustasia => &["trustasia"],
            OperatorName::Wangshengnan => &["wangshengnan"],
            OperatorName::Gdca => &["gdca"],
            OperatorName::Bptl => &["bptl", "beijingpuchuangsidatechnologyltd"],
            OperatorName::Nordunet => &["nordunet"],
            OperatorName::Sheca => &["sheca"],
            OperatorName::Akamai => &["akamai"],
            OperatorName::Mattpalmer => &["mattpalmer"],
            OperatorName::Uitac => &["uitac", "upintheairconsulting"],
            OperatorName::Qihoo360 => &["qihoo360"],
        }
    }

    /// Whether `catalog_name` (as spelled in the log list, e.g. "Let's
    /// Encrypt") refers to this operator.
    pub fn matches(&self, catalog_name: &str) -> bool {
        let normalized = normalize(catalog_name);
        self.tokens().contains(&normalized.as_str())
    }
}

impl fmt::Display for OperatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens()[0])
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

/// Fetch the catalog once and cache it for the lifetime of the process.
/// Concurrent first callers share a single fetch.
pub async fn get_catalog() -> Result<&'static LogList, Error> {
    CATALOG.get_or_try_init(|| fetch_log_list(ALL_LOG_LIST_URL)).await
}

pub(crate) async fn fetch_log_list(url: &str) -> Result<LogList, Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .gzip(true)
        .build()
        .map_err(Error::CatalogFetch)?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(Error::CatalogFetch)?
        .error_for_status()
        .map_err(Error::CatalogFetch)?;

    response.json().await.map_err(Error::CatalogFetch)
}

/// Map the operator filter to catalog entries. `all` anywhere in the list
/// selects every operator; a name with no catalog match is an error.
pub async fn resolve_operators(names: &[OperatorName]) -> Result<Vec<&'static Operator>, Error> {
    let catalog = get_catalog().await?;
    resolve_in(catalog, names)
}

pub fn resolve_in<'a>(
    catalog: &'a LogList,
    names: &[OperatorName],
) -> Result<Vec<&'a Operator>, Error> {
    if names.is_empty() || names.contains(&OperatorName::All) {
        return Ok(catalog.operators.iter().collect());
    }
    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        let operator = catalog
            .operators
            .iter()
            .find(|op| name.matches(&op.name))
            .ok_or_else(|| Error::UnknownOperator(name.to_string()))?;
        resolved.push(operator);
    }
    Ok(resolved)
}
