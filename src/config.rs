// Credential resolution. Values are layered: defaults, then an optional
// JSON file, then environment variables, then explicit values (usually CLI
// flags). Empty values never override an earlier layer.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_CODE: &str = "1111";
pub const DEFAULT_ENV_PREFIX: &str = "MIVA_";

/// Fully resolved login data for one store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub store_url: String,
    pub store_code: String,
    /// Overrides `<store_url>/mm5/json.mvc` when set.
    pub json_url: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("store_url", &self.store_url)
            .field("store_code", &self.store_code)
            .field("json_url", &self.json_url)
            .finish()
    }
}

/// One configuration layer. Field names match the JSON config file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigValues {
    pub username: Option<String>,
    pub password: Option<String>,
    pub store_url: Option<String>,
    pub store_code: Option<String>,
    pub json_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    values: ConfigValues,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn merge(slot: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *slot = Some(v);
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder {
            values: ConfigValues {
                store_code: Some(DEFAULT_STORE_CODE.into()),
                ..ConfigValues::default()
            },
        }
    }

    pub fn add_values(mut self, layer: ConfigValues) -> Self {
        merge(&mut self.values.username, layer.username);
        merge(&mut self.values.password, layer.password);
        merge(&mut self.values.store_url, layer.store_url);
        merge(&mut self.values.store_code, layer.store_code);
        merge(&mut self.values.json_url, layer.json_url);
        self
    }

    /// Read `<prefix>USERNAME`, `<prefix>PASSWORD`, `<prefix>STORE_URL`,
    /// `<prefix>STORE_CODE` and `<prefix>JSON_URL` from the process env.
    pub fn add_env(self, prefix: &str) -> Self {
        self.add_env_from(prefix, |key| std::env::var(key).ok())
    }

    pub fn add_env_from<F>(self, prefix: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{prefix}{name}"));
        let layer = ConfigValues {
            username: get("USERNAME"),
            password: get("PASSWORD"),
            store_url: get("STORE_URL"),
            store_code: get("STORE_CODE"),
            json_url: get("JSON_URL"),
        };
        self.add_values(layer)
    }

    /// Merge a JSON config file. A missing file is an error only when
    /// `required` is set.
    pub fn add_file(self, path: &Path, required: bool) -> Result<Self> {
        if !path.exists() {
            if required {
                return Err(Error::Config(format!(
                    "can't read from file {}, it doesn't exist",
                    path.display()
                )));
            }
            return Ok(self);
        }
        let raw = std::fs::read_to_string(path)?;
        let layer: ConfigValues = serde_json::from_str(&raw)?;
        Ok(self.add_values(layer))
    }

    /// Username and password may still be missing; the CLI prompts for the
    /// password before resolving.
    pub fn values(&self) -> &ConfigValues {
        &self.values
    }

    pub fn resolve(self) -> Result<Credentials> {
        let ConfigValues {
            username,
            password,
            store_url,
            store_code,
            json_url,
        } = self.values;
        let require = |value: Option<String>, name: &str| {
            value.ok_or_else(|| Error::Config(format!("missing {name}")))
        };
        Ok(Credentials {
            username: require(username, "username")?,
            password: require(password, "password")?,
            store_url: require(store_url, "store URL")?,
            store_code: store_code.unwrap_or_else(|| DEFAULT_STORE_CODE.into()),
            json_url,
        })
    }
}

/// `~/.miva-deploy.json`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|dir| dir.join(".miva-deploy.json"))
}
