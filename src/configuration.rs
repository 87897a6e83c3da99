use config::{Config, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

/// The secret shipped in `configurations/base.yaml`.
pub const PLACEHOLDER_JWT_SECRET: &str = "change-me-in-production";

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Production refuses to start with the bundled JWT secret.
    pub fn check_for(&self, environment: &Environment) -> Result<(), config::ConfigError> {
        if matches!(environment, Environment::Production) && self.auth.uses_placeholder_secret() {
            return Err(config::ConfigError::Message(
                "auth.jwt_secret is still the bundled placeholder, set APP_AUTH__JWT_SECRET"
                    .into(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,

    /// Public origin used for share links, robots.txt and the sitemap.
    pub base_url: String,

    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
}

fn default_assets_dir() -> String {
    "public".into()
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub backend: StorageBackend,
    pub username: String,
    pub password: SecretString,
    pub host: String,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,

    pub database_name: String,
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db()
            .database(&self.database_name)
            .log_statements(tracing_log::log::LevelFilter::Trace)
    }

    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .ssl_mode(ssl_mode)
    }
}

#[derive(Deserialize, Clone)]
pub struct AuthSettings {
    pub jwt_secret: SecretString,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub session_hours: i64,

    #[serde(default)]
    pub secure_cookies: bool,
}

impl AuthSettings {
    pub fn uses_placeholder_secret(&self) -> bool {
        self.jwt_secret.expose_secret() == PLACEHOLDER_JWT_SECRET
    }
}

#[derive(Deserialize, Clone)]
pub struct TelemetrySettings {
    pub filter: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            otlp_endpoint: None,
        }
    }
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn to_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("cannot read current dir: {e}")))?;
    let configuration_directory = base_path.join("configurations");
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let settings = Config::builder()
        .add_source(File::from(configuration_directory.join("base")))
        .add_source(File::from(
            configuration_directory.join(environment.to_str()),
        ))
        .add_source(
            // APP_DATABASE__USERNAME sets database.username
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        );

    let settings: Settings = settings.build()?.try_deserialize()?;
    settings.check_for(&environment)?;
    Ok(settings)
}
