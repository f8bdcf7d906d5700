//! `.env` synthesis for Vite frontends.
//!
//! The file is assembled from independent, ordered text blocks:
//!
//! 1. the `.env` already present in the frontend directory,
//! 2. a generated `VITE_FIREBASE_*` block,
//! 3. the free-form `extraEnv` secret, verbatim.
//!
//! Blocks are concatenated line-wise and never key-merged with each other, so
//! a key repeated in a later block is emitted again and dotenv's
//! last-assignment-wins rule decides the effective value.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Result, ShipyardError};
use crate::paths;
use crate::secret::Secret;
use crate::tree::SourceTree;

pub const PROJECT_ID_KEY: &str = "VITE_FIREBASE_PROJECT_ID";
pub const APP_ID_KEY: &str = "VITE_FIREBASE_APP_ID";
pub const WEBAPP_CONFIG_KEY: &str = "VITE_FIREBASE_WEBAPP_CONFIG";

/// Web app config field → env key, in emission order.
pub const WEBAPP_FIELDS: [(&str, &str); 7] = [
    ("apiKey", "VITE_FIREBASE_API_KEY"),
    ("authDomain", "VITE_FIREBASE_AUTH_DOMAIN"),
    ("projectId", "VITE_FIREBASE_PROJECT_ID"),
    ("storageBucket", "VITE_FIREBASE_STORAGE_BUCKET"),
    ("messagingSenderId", "VITE_FIREBASE_MESSAGING_SENDER_ID"),
    ("appId", "VITE_FIREBASE_APP_ID"),
    ("measurementId", "VITE_FIREBASE_MEASUREMENT_ID"),
];

// ---------------------------------------------------------------------------
// EnvBlock
// ---------------------------------------------------------------------------

/// Ordered `KEY=value` lines. Repeating a key appends another line; the
/// last assignment is the effective one when the file is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvBlock {
    entries: Vec<(String, String)>,
}

impl EnvBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Effective value of `key`: the last assignment wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Render as dotenv lines without a trailing newline.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}={}", format_env_value(v)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

static BARE_VALUE_RE: OnceLock<Regex> = OnceLock::new();

fn bare_value_re() -> &'static Regex {
    BARE_VALUE_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_./:@-]+$").unwrap())
}

/// Emit `value` bare when it is made of safe characters, otherwise as a JSON
/// string literal so it stays on one line.
pub fn format_env_value(value: &str) -> String {
    if bare_value_re().is_match(value) {
        value.to_string()
    } else {
        serde_json::Value::String(value.to_string()).to_string()
    }
}

// ---------------------------------------------------------------------------
// Lenient parser
// ---------------------------------------------------------------------------

static BARE_KEY_RE: OnceLock<Regex> = OnceLock::new();
static TRAILING_COMMA_RE: OnceLock<Regex> = OnceLock::new();

fn bare_key_re() -> &'static Regex {
    BARE_KEY_RE.get_or_init(|| Regex::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)(\s*:)").unwrap())
}

fn trailing_comma_re() -> &'static Regex {
    TRAILING_COMMA_RE.get_or_init(|| Regex::new(r",(\s*[}\]])").unwrap())
}

/// Parse a JSON object, falling back to repairs for JS object-literal style
/// input: bare keys, single quotes and trailing commas.
///
/// Blank input yields an empty map. Input that is still not a JSON object
/// after the repairs fails with [`ShipyardError::ConfigParse`].
pub fn lenient_parse(text: &str) -> Result<Map<String, Value>> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    let value = match serde_json::from_str::<Value>(text) {
        Ok(v) => v,
        Err(_) => {
            let repaired = bare_key_re().replace_all(text, "$1\"$2\"$3");
            let repaired = repaired.replace('\'', "\"");
            let repaired = trailing_comma_re().replace_all(&repaired, "$1");
            serde_json::from_str::<Value>(&repaired)
                .map_err(|e| ShipyardError::ConfigParse(e.to_string()))?
        }
    };
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ShipyardError::ConfigParse(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// WebAppConfig
// ---------------------------------------------------------------------------

/// Firebase web app configuration. Only non-blank string fields survive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebAppConfig {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub measurement_id: Option<String>,
}

impl WebAppConfig {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let field = |name: &str| {
            map.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };
        Self {
            api_key: field("apiKey"),
            auth_domain: field("authDomain"),
            project_id: field("projectId"),
            storage_bucket: field("storageBucket"),
            messaging_sender_id: field("messagingSenderId"),
            app_id: field("appId"),
            measurement_id: field("measurementId"),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self::from_map(&lenient_parse(text)?))
    }

    fn get(&self, field: &str) -> Option<&str> {
        let value = match field {
            "apiKey" => &self.api_key,
            "authDomain" => &self.auth_domain,
            "projectId" => &self.project_id,
            "storageBucket" => &self.storage_bucket,
            "messagingSenderId" => &self.messaging_sender_id,
            "appId" => &self.app_id,
            "measurementId" => &self.measurement_id,
            _ => return None,
        };
        value.as_deref()
    }

    /// `(env key, value)` for every populated field, in mapping order.
    pub fn env_entries(&self) -> Vec<(&'static str, &str)> {
        WEBAPP_FIELDS
            .iter()
            .filter_map(|(field, key)| self.get(field).map(|v| (*key, v)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Plaintext inputs to one `.env` synthesis.
#[derive(Debug, Clone, Default)]
pub struct EnvInputs<'a> {
    pub existing: Option<&'a str>,
    pub project_id: &'a str,
    pub app_id: Option<&'a str>,
    pub webapp_config: Option<&'a str>,
    pub extra_env: Option<&'a str>,
}

/// The generated `VITE_FIREBASE_*` block.
///
/// A provided `app_id` or `webapp_config` is emitted even when blank. The
/// config payload loses surrounding whitespace only, and blank fields inside
/// it derive no keys.
pub fn vite_block(
    project_id: &str,
    app_id: Option<&str>,
    webapp_config: Option<&str>,
) -> Result<EnvBlock> {
    let mut block = EnvBlock::new();
    block.push(PROJECT_ID_KEY, project_id);
    if let Some(app_id) = app_id {
        block.push(APP_ID_KEY, app_id);
    }
    if let Some(raw) = webapp_config.map(str::trim) {
        let config = WebAppConfig::parse(raw)?;
        block.push(WEBAPP_CONFIG_KEY, raw);
        for (key, value) in config.env_entries() {
            block.push(key, value);
        }
    }
    Ok(block)
}

/// Render the complete `.env` text: non-empty blocks joined by newlines with
/// exactly one trailing newline. The existing block keeps its leading lines.
pub fn render_env_file(inputs: &EnvInputs<'_>) -> Result<String> {
    let generated = vite_block(inputs.project_id, inputs.app_id, inputs.webapp_config)?.render();
    let blocks = [
        inputs.existing.map(str::trim_end).unwrap_or_default(),
        generated.as_str(),
        inputs.extra_env.map(str::trim).unwrap_or_default(),
    ];
    let mut out = blocks
        .iter()
        .filter(|b| !b.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    out.push('\n');
    Ok(out)
}

/// Sources for [`synthesize_env`], each optional except the project id.
#[derive(Debug, Clone, Default)]
pub struct EnvSources<'a> {
    pub frontend_dir: Option<&'a str>,
    pub project_id: &'a str,
    pub app_id: Option<&'a str>,
    pub webapp_config: Option<&'a Secret>,
    pub extra_env: Option<&'a Secret>,
}

/// Write `<frontend_dir>/.env` into a new tree. Without a frontend directory
/// the tree is returned unchanged.
pub fn synthesize_env(tree: &SourceTree, sources: &EnvSources<'_>) -> Result<SourceTree> {
    let Some(frontend_dir) = sources.frontend_dir else {
        return Ok(tree.clone());
    };
    let env_path = paths::join(&paths::normalize(frontend_dir)?, paths::DOTENV);

    let existing = match tree.read_file(&env_path) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::debug!(path = %env_path, "no existing .env: {e}");
            None
        }
    };
    let webapp_config = sources.webapp_config.map(Secret::plaintext).transpose()?;
    let extra_env = sources.extra_env.map(Secret::plaintext).transpose()?;

    let content = render_env_file(&EnvInputs {
        existing: existing.as_deref(),
        project_id: sources.project_id,
        app_id: sources.app_id,
        webapp_config,
        extra_env,
    })?;
    tracing::info!(path = %env_path, lines = content.lines().count(), "wrote .env");
    tree.with_new_file(&env_path, content)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
