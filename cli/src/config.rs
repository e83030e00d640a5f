//! Configuration management for the mirror.
//!
//! Every setting can come from a command line flag, its environment variable
//! or the TOML configuration file, in that order of precedence, before
//! falling back to a default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name used under the platform data and config directories.
const APP_DIR: &str = "strava-mirror";

/// Sample configuration file printed by `--config-sample`.
pub const SAMPLE: &str = r#"# Strava OAuth 2 client id
client_id = "12345"
# Strava OAuth 2 client secret
client_secret = "SECRET"
# Strava OAuth 2 token store
# token_file = "~/.config/strava-mirror/token.json"
# OAuth 2 HTTP server host
http_host = "127.0.0.1"
# OAuth 2 HTTP server port
http_port = 12345
# SQLite database file
# database = "~/.local/share/strava-mirror/strava.sqlite"
# '_strava4_session' cookie value, needed for GPX downloads
# strava4_session = "..."
# Directory to store GPX files indexed by activity id
# dir_activities = "~/.local/share/strava-mirror/activities"
# Activities in a Strava bulk export backup, linked instead of downloaded
# dir_activities_backup = "/path/to/export/activities"
"#;

/// Settings taken from the command line or the environment.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Settings {
    /// Configuration file [default: <config dir>/strava-mirror/config.toml]
    #[arg(long, env = "STRAVA_MIRROR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "STRAVA_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// Strava OAuth 2 client id
    #[arg(long, env = "STRAVA_CLIENT_ID", global = true, hide_env_values = true)]
    pub client_id: Option<String>,

    /// Strava OAuth 2 client secret
    #[arg(long, env = "STRAVA_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Strava OAuth 2 token store
    #[arg(long, env = "STRAVA_TOKEN_FILE", global = true)]
    pub token_file: Option<PathBuf>,

    /// OAuth 2 HTTP server host [default: 127.0.0.1]
    #[arg(long, env = "HTTP_HOST", global = true)]
    pub http_host: Option<String>,

    /// OAuth 2 HTTP server port [default: 12345]
    #[arg(long, env = "HTTP_PORT", global = true)]
    pub http_port: Option<u16>,

    /// '_strava4_session' cookie value
    #[arg(
        long = "strava4-session",
        env = "STRAVA_COOKIE_STRAVA4_SESSION",
        global = true,
        hide_env_values = true
    )]
    pub strava4_session: Option<String>,

    /// Directory to store GPX files indexed by activity id
    #[arg(long, env = "STRAVA_DIR_ACTIVITIES", global = true)]
    pub dir_activities: Option<PathBuf>,

    /// Activities in a Strava bulk export backup (no need to redownload these)
    #[arg(long, env = "STRAVA_DIR_ACTIVITIES_BACKUP", global = true)]
    pub dir_activities_backup: Option<PathBuf>,
}

/// Contents of the configuration file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database: Option<PathBuf>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_file: Option<PathBuf>,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
    pub strava4_session: Option<String>,
    pub dir_activities: Option<PathBuf>,
    pub dir_activities_backup: Option<PathBuf>,
}

impl FileConfig {
    /// Read a configuration file. A missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No configuration file at {}", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(toml::from_str(&contents)?)
    }
}

/// Resolved mirror configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite database file
    pub database: PathBuf,
    /// Strava OAuth 2 client id
    pub client_id: Option<String>,
    /// Strava OAuth 2 client secret
    pub client_secret: Option<String>,
    /// Strava OAuth 2 token store
    pub token_file: PathBuf,
    /// OAuth 2 loopback listener host
    pub http_host: String,
    /// OAuth 2 loopback listener port
    pub http_port: u16,
    /// Strava web session cookie
    pub strava4_session: Option<String>,
    /// GPX store
    pub dir_activities: PathBuf,
    /// Strava bulk export activities
    pub dir_activities_backup: Option<PathBuf>,
}

/// Client credentials of the registered Strava application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Default location of the configuration file.
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

impl Config {
    /// Load the configuration file named by `settings`, or the default one,
    /// and resolve every setting.
    pub fn load(settings: Settings) -> Result<Self, ConfigError> {
        let file = match settings.config.clone().or_else(default_config_file) {
            Some(path) => FileConfig::load(&path)?,
            None => FileConfig::default(),
        };

        Self::resolve(settings, file)
    }

    /// Merge flags and environment over the configuration file and defaults.
    pub fn resolve(settings: Settings, file: FileConfig) -> Result<Self, ConfigError> {
        let database = match settings.database.or(file.database) {
            Some(path) => path,
            None => data_dir()?.join("strava.sqlite"),
        };

        let token_file = match settings.token_file.or(file.token_file) {
            Some(path) => path,
            None => dirs::config_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join(APP_DIR)
                .join("token.json"),
        };

        let dir_activities = match settings.dir_activities.or(file.dir_activities) {
            Some(path) => path,
            None => data_dir()?.join("activities"),
        };

        Ok(Self {
            database,
            client_id: settings
                .client_id
                .or(file.client_id)
                .filter(|s| !s.is_empty()),
            client_secret: settings
                .client_secret
                .or(file.client_secret)
                .filter(|s| !s.is_empty()),
            token_file,
            http_host: settings
                .http_host
                .or(file.http_host)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            http_port: settings.http_port.or(file.http_port).unwrap_or(12345),
            strava4_session: settings
                .strava4_session
                .or(file.strava4_session)
                .filter(|s| !s.is_empty()),
            dir_activities,
            dir_activities_backup: settings.dir_activities_backup.or(file.dir_activities_backup),
        })
    }

    /// Client credentials, required for anything that talks to the Strava API.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Ok(Credentials {
            client_id: self
                .client_id
                .clone()
                .ok_or(ConfigError::MissingClientId)?,
            client_secret: self
                .client_secret
                .clone()
                .ok_or(ConfigError::MissingClientSecret)?,
        })
    }

    /// Strava web session cookie, required for GPX downloads.
    pub fn strava4_session(&self) -> Result<&str, ConfigError> {
        self.strava4_session
            .as_deref()
            .ok_or(ConfigError::MissingSession)
    }

    /// Redirect URI served by the OAuth 2 loopback listener.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}:{}/code", self.http_host, self.http_port)
    }

    /// Start page of the loopback listener.
    pub fn listener_url(&self) -> String {
        format!("http://{}:{}/", self.http_host, self.http_port)
    }
}

fn data_dir() -> Result<PathBuf, ConfigError> {
    Ok(dirs::data_dir().ok_or(ConfigError::NoDataDir)?.join(APP_DIR))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Strava client id is required (--client-id or STRAVA_CLIENT_ID)")]
    MissingClientId,

    #[error("Strava client secret is required (--client-secret or STRAVA_CLIENT_SECRET)")]
    MissingClientSecret,

    #[error("Strava session cookie is required (--strava4-session or STRAVA_COOKIE_STRAVA4_SESSION)")]
    MissingSession,

    #[error("Cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot determine the user data directory, set --database and --dir-activities")]
    NoDataDir,

    #[error("Cannot determine the user config directory, set --token-file")]
    NoConfigDir,
}
