use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::domain::RecipientEmail;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub dispatch: DispatchSettings,
    pub storage: StorageSettings,
    pub email_client: EmailClientSettings,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub batch_size: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub pause_seconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub daily_limit: u64,
    #[serde(default)]
    pub attachment_policy: AttachmentPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 3,
            pause_seconds: 5,
            daily_limit: 500,
            attachment_policy: AttachmentPolicy::default(),
        }
    }
}

impl DispatchSettings {
    pub fn pause(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pause_seconds)
    }
}

/// What to do when an attachment cannot be read at send time.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentPolicy {
    /// The whole send fails and is logged as failed.
    #[default]
    FailSend,
    /// The unreadable attachment is dropped and the message goes out without it.
    SkipAttachment,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StorageSettings {
    pub counter_path: PathBuf,
    pub log_path: PathBuf,
    pub templates_path: PathBuf,
}

#[derive(Deserialize, Clone, Debug)]
pub struct EmailClientSettings {
    #[serde(default)]
    pub transport: TransportKind,
    pub base_url: String,
    pub sender_email: String,
    pub authorization_token: SecretString,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
    pub smtp: SmtpSettings,
}

/// Which relay the dispatcher hands mail to.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Postmark-style HTTP API at `base_url`, authenticated with a server token.
    #[default]
    Http,
    /// SMTP relay, logging in as the sender with the sender's own password.
    Smtp,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    #[serde(default)]
    pub security: SmtpSecurity,
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmtpSecurity {
    /// TLS from the first byte, usually port 465.
    #[default]
    Tls,
    /// Plain connection upgraded with STARTTLS, usually port 587.
    StartTls,
    /// No encryption. Only for local relays.
    None,
}

impl EmailClientSettings {
    pub fn sender(&self) -> Result<RecipientEmail, String> {
        RecipientEmail::parse(self.sender_email.clone())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_milliseconds)
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path =
        std::env::current_dir().map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;
    let configuration_directory = base_path.join("configuration");

    // Detect the running environment.
    // Default to `local` if unspecified.
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        // Add in settings from environment variables (with a prefix of APP and '__' as separator)
        // E.g. `APP_DISPATCH__DAILY_LIMIT=100` would set `Settings.dispatch.daily_limit`
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// The possible runtime environment for our application.
#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}
