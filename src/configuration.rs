use crate::error::ConfigError;

/// Minimum secret length in bytes for HS256 keys
const MIN_SECRET_LENGTH: usize = 32;

/// Longest accepted token lifetime in seconds (365 days)
const MAX_TOKEN_EXPIRY: i64 = 365 * 24 * 60 * 60;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub cookie: CookieSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Production,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT signing settings
///
/// Access and refresh tokens are signed with independent secrets.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry: i64,  // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64, // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

/// Refresh cookie settings
#[derive(serde::Deserialize, Clone)]
pub struct CookieSettings {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_cookie_path")]
    pub path: String,
}

fn default_cookie_path() -> String {
    "/auth".to_string()
}

impl Settings {
    /// Reject configurations that would weaken token security.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()?;

        if self.cookie.name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("cookie.name".to_string()));
        }

        Ok(())
    }
}

impl JwtSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, secret) in [
            ("jwt.access_secret", &self.access_secret),
            ("jwt.refresh_secret", &self.refresh_secret),
        ] {
            if secret.is_empty() {
                return Err(ConfigError::MissingRequired(field.to_string()));
            }
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be at least {} bytes",
                    field, MIN_SECRET_LENGTH
                )));
            }
        }

        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::InvalidValue(
                "jwt.access_secret and jwt.refresh_secret must differ".to_string(),
            ));
        }

        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "token expiries must be positive".to_string(),
            ));
        }

        if self.refresh_token_expiry > MAX_TOKEN_EXPIRY {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.refresh_token_expiry must not exceed {} seconds",
                MAX_TOKEN_EXPIRY
            )));
        }

        if self.access_token_expiry >= self.refresh_token_expiry {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be shorter than jwt.refresh_token_expiry".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load settings from `configuration.yaml` (optional) and `APP_*` environment variables.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings
        .try_deserialize::<Settings>()
        .map_err(ConfigError::from)
}
