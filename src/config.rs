//! Application config: the `[application]` table of `runxdg.toml`.
//!
//! The file names the shell role to register the surface under, the
//! executable to start, how to start it, and the argument list handed
//! to it. `@port@` and `@token@` inside a parameter are replaced with
//! the session's port and token before launch.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// File name looked up inside the application's install directory.
pub const CONFIG_FILE_NAME: &str = "runxdg.toml";

const PORT_PLACEHOLDER: &str = "@port@";
const TOKEN_PLACEHOLDER: &str = "@token@";

/// Config error. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config path: set AFM_APP_INSTALL_DIR or pass --config")]
    NoConfigPath,
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot find [application]")]
    MissingApplication,
    #[error("no {0} defined in config")]
    MissingField(&'static str),
    #[error("unknown type of launcher: {0:?}")]
    UnknownMethod(String),
}

/// How the target application gets started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchMethod {
    /// fork + exec of `path` with the expanded params.
    #[default]
    Posix,
    /// `start` call on the application framework's session bus service.
    AfmDbus,
    /// Reserved for the framework's websocket API. Launching always fails.
    AfmWebSocket,
}

impl LaunchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Posix => "POSIX",
            Self::AfmDbus => "AFM_DBUS",
            Self::AfmWebSocket => "AFM_WEBSOCKET",
        }
    }
}

impl FromStr for LaunchMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "POSIX" => Ok(Self::Posix),
            "AFM_DBUS" => Ok(Self::AfmDbus),
            "AFM_WEBSOCKET" => Ok(Self::AfmWebSocket),
            other => Err(ConfigError::UnknownMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for LaunchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    application: Option<ApplicationTable>,
}

#[derive(Debug, Deserialize)]
struct ApplicationTable {
    #[serde(default)]
    role: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Vec<String>,
}

/// Validated `[application]` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Logical surface name registered with the shell.
    pub role: String,
    /// Executable path, used as argv[0] for POSIX launches.
    pub path: String,
    pub method: LaunchMethod,
    /// Raw params, placeholders not yet substituted.
    pub params: Vec<String>,
}

impl AppConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text)?;
        tracing::debug!(path = %path.display(), "config parsed");
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let app = file.application.ok_or(ConfigError::MissingApplication)?;

        if app.role.is_empty() {
            return Err(ConfigError::MissingField("role"));
        }
        if app.path.is_empty() {
            return Err(ConfigError::MissingField("path"));
        }

        Ok(Self {
            method: app.method.parse()?,
            role: app.role,
            path: app.path,
            params: app.params,
        })
    }

    /// Argument vector for a POSIX launch: `path` followed by every
    /// param with its placeholders substituted.
    pub fn argv(&self, port: u16, token: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.params.len() + 1);
        argv.push(self.path.clone());
        for param in &self.params {
            let arg = expand_param(param, port, token);
            tracing::debug!(param = %arg, "params");
            argv.push(arg);
        }
        argv
    }
}

/// Substitute every `@port@` and `@token@` in `param`.
pub fn expand_param(param: &str, port: u16, token: &str) -> String {
    param
        .replace(PORT_PLACEHOLDER, &port.to_string())
        .replace(TOKEN_PLACEHOLDER, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[application]
role = "navigation"
path = "/usr/bin/navi"
method = "POSIX"
params = ["--port=@port@", "--token=@token@", "--fullscreen"]
"#;

    #[test]
    fn parse_full_config() {
        let config = AppConfig::parse(FULL).unwrap();
        assert_eq!(config.role, "navigation");
        assert_eq!(config.path, "/usr/bin/navi");
        assert_eq!(config.method, LaunchMethod::Posix);
        assert_eq!(config.params.len(), 3);
    }

    #[test]
    fn method_defaults_to_posix() {
        let config = AppConfig::parse(
            r#"
[application]
role = "video"
path = "/usr/bin/player"
"#,
        )
        .unwrap();
        assert_eq!(config.method, LaunchMethod::Posix);
        assert!(config.params.is_empty());
    }

    #[test]
    fn bus_methods_parse() {
        assert_eq!("AFM_DBUS".parse::<LaunchMethod>().unwrap(), LaunchMethod::AfmDbus);
        assert_eq!(
            "AFM_WEBSOCKET".parse::<LaunchMethod>().unwrap(),
            LaunchMethod::AfmWebSocket
        );
    }

    #[test]
    fn unknown_method_is_rejected() {
        let result = AppConfig::parse(
            r#"
[application]
role = "video"
path = "/usr/bin/player"
method = "SYSTEMD"
"#,
        );
        assert!(matches!(result, Err(ConfigError::UnknownMethod(ref m)) if m == "SYSTEMD"));
    }

    #[test]
    fn empty_role_is_rejected() {
        let result = AppConfig::parse(
            r#"
[application]
role = ""
path = "/usr/bin/player"
"#,
        );
        assert!(matches!(result, Err(ConfigError::MissingField("role"))));
    }

    #[test]
    fn missing_path_is_rejected() {
        let result = AppConfig::parse(
            r#"
[application]
role = "video"
"#,
        );
        assert!(matches!(result, Err(ConfigError::MissingField("path"))));
    }

    #[test]
    fn missing_application_table() {
        let result = AppConfig::parse("[other]\nkey = 1\n");
        assert!(matches!(result, Err(ConfigError::MissingApplication)));
    }

    #[test]
    fn malformed_toml() {
        let result = AppConfig::parse("[application\nrole = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn argv_substitutes_placeholders() {
        let config = AppConfig::parse(FULL).unwrap();
        let argv = config.argv(8080, "s3cret");
        assert_eq!(
            argv,
            vec![
                "/usr/bin/navi".to_string(),
                "--port=8080".to_string(),
                "--token=s3cret".to_string(),
                "--fullscreen".to_string(),
            ]
        );
    }

    #[test]
    fn expand_param_handles_both_placeholders() {
        assert_eq!(
            expand_param("ws://localhost:@port@/api?token=@token@", 1234, "abc"),
            "ws://localhost:1234/api?token=abc"
        );
        assert_eq!(expand_param("plain", 1, "t"), "plain");
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, FULL).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.role, "navigation");
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(&dir.path().join(CONFIG_FILE_NAME));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
