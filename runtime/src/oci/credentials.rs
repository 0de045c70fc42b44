//! Registry logins in the Docker CLI's `config.json`.
//!
//! `imgload login` writes the same `auths` map `docker login` does, so a
//! login made with either tool serves both. Keys other than `auths`, and
//! fields of an entry other than `auth`, are preserved on write.

use std::path::{Path, PathBuf};

use base64::Engine;
use imgload_core::error::{LoadError, Result};
use serde_json::{Map, Value};

/// Key Docker Hub logins are stored under.
const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";

/// The Docker CLI config file and its `auths` entries.
///
/// Only inline `auth` entries are understood; `credsStore` and
/// `credHelpers` are left alone.
pub struct DockerConfig {
    path: PathBuf,
}

impl DockerConfig {
    /// `$DOCKER_CONFIG/config.json`, or `~/.docker/config.json`.
    pub fn default_path() -> Result<Self> {
        let dir = match std::env::var_os("DOCKER_CONFIG") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| {
                    LoadError::Credential("Cannot determine home directory".to_string())
                })?
                .join(".docker"),
        };
        Ok(Self::new(dir.join("config.json")))
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get `(username, password)` for a registry.
    pub fn get(&self, registry: &str) -> Result<Option<(String, String)>> {
        let config = self.read()?;
        let wanted = normalize_registry(registry);
        let encoded = auths(&config)
            .into_iter()
            .flat_map(|auths| auths.iter())
            .find(|(server, _)| normalize_registry(strip_server_url(server)) == wanted)
            .and_then(|(_, entry)| entry.get("auth"))
            .and_then(Value::as_str);

        match encoded {
            Some(encoded) => decode_auth(encoded).map(Some),
            None => Ok(None),
        }
    }

    /// Save a login for `registry`, replacing any entry that names the same
    /// registry under another alias.
    pub fn store(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        let mut config = self.read()?;
        let wanted = normalize_registry(registry);
        let auths = auths_mut(&mut config, &self.path)?;

        let mut entry = Map::new();
        for server in matching_servers(auths, &wanted) {
            if let Some(Value::Object(old)) = auths.remove(&server) {
                entry = old;
            }
        }
        entry.insert(
            "auth".to_string(),
            Value::String(encode_auth(username, password)),
        );
        auths.insert(server_key(&wanted), Value::Object(entry));

        self.write(&config)
    }

    /// Forget the login for `registry`. Returns true if one existed.
    pub fn remove(&self, registry: &str) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let mut config = self.read()?;
        let wanted = normalize_registry(registry);
        let auths = auths_mut(&mut config, &self.path)?;

        let servers = matching_servers(auths, &wanted);
        for server in &servers {
            auths.remove(server);
        }
        if servers.is_empty() {
            return Ok(false);
        }
        self.write(&config)?;
        Ok(true)
    }

    fn read(&self) -> Result<Value> {
        if !self.path.exists() {
            return Ok(Value::Object(Map::new()));
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            LoadError::Credential(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        if data.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        let config: Value = serde_json::from_str(&data).map_err(|e| {
            LoadError::Credential(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;
        if !config.is_object() {
            return Err(LoadError::Credential(format!(
                "{} is not a JSON object",
                self.path.display()
            )));
        }
        Ok(config)
    }

    /// Replace the file via a sibling temp file.
    fn write(&self, config: &Value) -> Result<()> {
        let fail = |what: &str, path: &Path, e: std::io::Error| {
            LoadError::Credential(format!("Failed to {} {}: {}", what, path.display(), e))
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| fail("create", parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(config)?)
            .map_err(|e| fail("write", &tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| fail("replace", &self.path, e))
    }
}

fn auths(config: &Value) -> Option<&Map<String, Value>> {
    config.get("auths").and_then(Value::as_object)
}

fn auths_mut<'a>(config: &'a mut Value, path: &Path) -> Result<&'a mut Map<String, Value>> {
    let root = config
        .as_object_mut()
        .ok_or_else(|| LoadError::Credential(format!("{} is not a JSON object", path.display())))?;
    root.entry("auths")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| {
            LoadError::Credential(format!("{}: \"auths\" is not an object", path.display()))
        })
}

/// Keys of `auths` that name the normalized registry `wanted`.
fn matching_servers(auths: &Map<String, Value>, wanted: &str) -> Vec<String> {
    auths
        .keys()
        .filter(|server| normalize_registry(strip_server_url(server)) == wanted)
        .cloned()
        .collect()
}

/// Key a new login is written under, as `docker login` names it.
fn server_key(normalized: &str) -> String {
    if normalized == "index.docker.io" {
        DOCKER_HUB_SERVER.to_string()
    } else {
        normalized.to_string()
    }
}

fn encode_auth(username: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password))
}

/// Decode a base64 `user:password` auth field.
fn decode_auth(encoded: &str) -> Result<(String, String)> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| LoadError::Credential(format!("Invalid auth entry: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| LoadError::Credential(format!("Invalid auth entry: {}", e)))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| LoadError::Credential("Invalid auth entry: missing ':'".to_string()))?;
    Ok((username.to_string(), password.to_string()))
}

/// `https://index.docker.io/v1/` → `index.docker.io`
fn strip_server_url(server: &str) -> &str {
    let server = server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"))
        .unwrap_or(server);
    server.split('/').next().unwrap_or(server)
}

/// Docker Hub aliases all map to `index.docker.io`.
fn normalize_registry(registry: &str) -> String {
    let r = strip_server_url(registry.trim()).to_lowercase();
    if r == "docker.io" || r == "registry-1.docker.io" {
        "index.docker.io".to_string()
    } else {
        r
    }
}
