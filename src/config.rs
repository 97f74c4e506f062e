//! Configuration types.
//!
//! Everything is read from environment variables at startup. `from_lookup`
//! takes an arbitrary key lookup so tests never touch the process env.

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;

/// How outbound messages leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Echo every message to the log instead of calling a provider.
    Console,
    /// Send through SMTP and Twilio.
    Live,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "live" => Ok(Self::Live),
            other => Err(format!("expected `console` or `live`, got `{other}`")),
        }
    }
}

/// What a staff fan-out does when one recipient fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOutPolicy {
    /// Propagate the first failure; later recipients are not attempted.
    #[default]
    AbortOnFirst,
    /// Log each failure and keep going; the call succeeds with whatever was sent.
    CollectAndContinue,
}

impl FromStr for FanOutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::AbortOnFirst),
            "continue" => Ok(Self::CollectAndContinue),
            other => Err(format!("expected `abort` or `continue`, got `{other}`")),
        }
    }
}

/// SMTP relay settings for the email transport.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Provider API key, used as the SMTP password.
    pub api_key: SecretString,
}

/// Twilio settings for the SMS transport.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub messaging_service_sid: String,
    pub status_callback_url: Option<String>,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Port for the inbound webhook server.
    pub http_port: u16,
    /// Optional directory for daily-rotated log files.
    pub log_dir: Option<PathBuf>,
    /// Product name used in templates and boilerplate.
    pub app_name: String,
    /// Base URL for links rendered into templates.
    pub app_base_url: String,
    /// Domain that inbound email is delivered to.
    pub inbound_email_domain: String,
    /// System default sender address.
    pub send_from_email: String,
    /// System default reply-to address.
    pub reply_to_email: String,
    /// System default sender phone.
    pub send_from_phone: Option<String>,
    pub mode: DispatchMode,
    pub fan_out: FanOutPolicy,
    /// Customer-experience survey link. Surveys are disabled without it.
    pub cx_survey_url: Option<String>,
    /// Directory of template files that replace the builtin set.
    pub template_dir: Option<PathBuf>,
    pub smtp: SmtpConfig,
    pub twilio: TwilioConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/civic-dispatch.db"),
            http_port: 8080,
            log_dir: None,
            app_name: "Civic Dispatch".to_string(),
            app_base_url: "http://localhost:8080".to_string(),
            inbound_email_domain: "inbound.example.com".to_string(),
            send_from_email: "no-reply@example.com".to_string(),
            reply_to_email: "no-reply@example.com".to_string(),
            send_from_phone: None,
            mode: DispatchMode::Console,
            fan_out: FanOutPolicy::AbortOnFirst,
            cx_survey_url: None,
            template_dir: None,
            smtp: SmtpConfig {
                host: "smtp.sendgrid.net".to_string(),
                port: 587,
                username: "apikey".to_string(),
                api_key: SecretString::from(String::new()),
            },
            twilio: TwilioConfig {
                account_sid: String::new(),
                auth_token: SecretString::from(String::new()),
                messaging_service_sid: String::new(),
                status_callback_url: None,
            },
        }
    }
}

impl DispatchConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let send_from_email = get("CIVIC_SEND_FROM_EMAIL").unwrap_or(defaults.send_from_email);
        let reply_to_email = get("CIVIC_REPLY_TO_EMAIL").unwrap_or_else(|| send_from_email.clone());

        let mode = match get("CIVIC_DISPATCH_MODE") {
            Some(v) => parse_value("CIVIC_DISPATCH_MODE", &v)?,
            None => defaults.mode,
        };
        let fan_out = match get("CIVIC_FANOUT_POLICY") {
            Some(v) => parse_value("CIVIC_FANOUT_POLICY", &v)?,
            None => defaults.fan_out,
        };
        let http_port = match get("CIVIC_HTTP_PORT") {
            Some(v) => parse_value("CIVIC_HTTP_PORT", &v)?,
            None => defaults.http_port,
        };
        let smtp_port = match get("SMTP_PORT") {
            Some(v) => parse_value("SMTP_PORT", &v)?,
            None => defaults.smtp.port,
        };

        let api_key = get("SENDGRID_API_KEY");
        if mode == DispatchMode::Live && api_key.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "SENDGRID_API_KEY".to_string(),
                hint: "Live dispatch needs email credentials; set CIVIC_DISPATCH_MODE=console to echo instead.".to_string(),
            });
        }

        Ok(Self {
            db_path: get("CIVIC_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            http_port,
            log_dir: get("CIVIC_LOG_DIR").map(PathBuf::from),
            app_name: get("CIVIC_APP_NAME").unwrap_or(defaults.app_name),
            app_base_url: get("CIVIC_APP_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.app_base_url),
            inbound_email_domain: get("CIVIC_INBOUND_EMAIL_DOMAIN")
                .map(|d| d.to_lowercase())
                .unwrap_or(defaults.inbound_email_domain),
            send_from_email,
            reply_to_email,
            send_from_phone: get("CIVIC_SEND_FROM_PHONE"),
            mode,
            fan_out,
            cx_survey_url: get("CIVIC_CX_SURVEY_URL"),
            template_dir: get("CIVIC_TEMPLATE_DIR").map(PathBuf::from),
            smtp: SmtpConfig {
                host: get("SMTP_HOST").unwrap_or(defaults.smtp.host),
                port: smtp_port,
                username: get("SMTP_USERNAME").unwrap_or(defaults.smtp.username),
                api_key: SecretString::from(api_key.unwrap_or_default()),
            },
            twilio: TwilioConfig {
                account_sid: get("TWILIO_ACCOUNT_SID").unwrap_or_default(),
                auth_token: SecretString::from(get("TWILIO_AUTH_TOKEN").unwrap_or_default()),
                messaging_service_sid: get("TWILIO_MESSAGING_SERVICE_SID").unwrap_or_default(),
                status_callback_url: get("TWILIO_STATUS_CALLBACK_URL"),
            },
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_env_uses_defaults() {
        let config = DispatchConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.mode, DispatchMode::Console);
        assert_eq!(config.fan_out, FanOutPolicy::AbortOnFirst);
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.smtp.host, "smtp.sendgrid.net");
        assert!(config.cx_survey_url.is_none());
    }

    #[test]
    fn reply_to_defaults_to_send_from() {
        let config =
            DispatchConfig::from_lookup(lookup(&[("CIVIC_SEND_FROM_EMAIL", "city@gov.test")]))
                .unwrap();
        assert_eq!(config.reply_to_email, "city@gov.test");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = DispatchConfig::from_lookup(lookup(&[("CIVIC_HTTP_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CIVIC_HTTP_PORT"));
    }

    #[test]
    fn invalid_fanout_policy_is_rejected() {
        let err =
            DispatchConfig::from_lookup(lookup(&[("CIVIC_FANOUT_POLICY", "sometimes")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn live_mode_requires_api_key() {
        let err = DispatchConfig::from_lookup(lookup(&[("CIVIC_DISPATCH_MODE", "live")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "SENDGRID_API_KEY"));
    }

    #[test]
    fn live_mode_with_credentials() {
        let config = DispatchConfig::from_lookup(lookup(&[
            ("CIVIC_DISPATCH_MODE", "LIVE"),
            ("SENDGRID_API_KEY", "SG.key"),
            ("CIVIC_FANOUT_POLICY", "continue"),
            ("CIVIC_INBOUND_EMAIL_DOMAIN", "Inbound.City.Gov"),
        ]))
        .unwrap();
        assert_eq!(config.mode, DispatchMode::Live);
        assert_eq!(config.fan_out, FanOutPolicy::CollectAndContinue);
        assert_eq!(config.smtp.api_key.expose_secret(), "SG.key");
        assert_eq!(config.inbound_email_domain, "inbound.city.gov");
    }
}
