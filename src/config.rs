use anyhow::Context;
use serde::Deserialize;

use crate::google::{CredentialSource, ServiceAccountKey};

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

fn default_true() -> bool {
    true
}

fn default_slack_api_base() -> String {
    DEFAULT_SLACK_API_BASE.to_string()
}

fn default_query_timeout_ms() -> u64 {
    10_000
}

/// Storage credentials and target. Accepts the camelCase keys used by the
/// shared secrets document (`accessKeyId`, `secretAccessKey`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    #[serde(rename = "accessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "secretAccessKey")]
    pub secret_access_key: String,
    pub region: String,
    #[serde(rename = "defaultBucket", alias = "nushop_ops_assets")]
    pub default_bucket: String,
    /// S3-compatible endpoint override (MinIO, tests). Does not affect the
    /// returned public URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Mark uploaded objects `public-read`. Returned URLs are only reachable
    /// when this is on.
    #[serde(rename = "publicRead", default = "default_true")]
    pub public_read: bool,
    #[serde(rename = "timeoutSecs", default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub bot_token: String,
    /// Production default channel, and the target of `notify_error`.
    pub errors_channel_id: String,
    /// Every non-production message is redirected here.
    pub test_alerts_channel_id: String,
    pub environment: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BigQueryConfig {
    pub credentials: ServiceAccountKey,
    /// Falls back to the key's `project_id` when unset.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Server-side wait per jobs.query / getQueryResults call.
    #[serde(default = "default_query_timeout_ms")]
    pub timeout_ms: u64,
}

impl BigQueryConfig {
    pub fn new(credentials: ServiceAccountKey) -> Self {
        Self {
            credentials,
            project_id: None,
            location: None,
            timeout_ms: default_query_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleAuthConfig {
    pub credentials: ServiceAccountKey,
    pub scopes: Vec<String>,
    pub impersonate: Option<String>,
}

/// `GOOGLE_*` settings. The key itself is only read by the commands that
/// need it, so a bad key does not break unrelated commands.
#[derive(Debug, Clone)]
pub struct GoogleSettings {
    pub source: CredentialSource,
    pub scopes: Vec<String>,
    pub impersonate: Option<String>,
}

/// Everything the CLI can drive. A section is `None` when its required
/// variables are not set.
#[derive(Debug)]
pub struct AppConfig {
    pub google: Option<GoogleSettings>,
    pub s3: Option<S3Config>,
    /// `file://<dir>` or `memory://`: write uploads there instead of S3.
    pub upload_sink_url: Option<String>,
    pub slack: Option<SlackConfig>,
    pub bigquery_project_id: Option<String>,
    pub bigquery_location: Option<String>,
}

impl AppConfig {
    fn credentials(&self) -> anyhow::Result<(&GoogleSettings, ServiceAccountKey)> {
        let google = self
            .google
            .as_ref()
            .context("GOOGLE_SERVICE_ACCOUNT is not set")?;
        let key = google
            .source
            .load()
            .context("GOOGLE_SERVICE_ACCOUNT does not hold a usable service account key")?;
        Ok((google, key))
    }

    pub fn google_auth(&self) -> anyhow::Result<GoogleAuthConfig> {
        let (google, credentials) = self.credentials()?;
        Ok(GoogleAuthConfig {
            credentials,
            scopes: google.scopes.clone(),
            impersonate: google.impersonate.clone(),
        })
    }

    pub fn bigquery(&self) -> anyhow::Result<BigQueryConfig> {
        let (_, credentials) = self.credentials()?;
        let mut cfg = BigQueryConfig::new(credentials);
        cfg.project_id = self.bigquery_project_id.clone();
        cfg.location = self.bigquery_location.clone();
        Ok(cfg)
    }
}

fn parse_flag(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => anyhow::bail!("{} must be true or false, got {:?}", name, value),
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();
    load_from(|name| std::env::var(name).ok())
}

/// Build the config from any variable source.
pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<AppConfig> {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let list_var = |name: &str| -> Vec<String> {
        var(name)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    };

    let google = var("GOOGLE_SERVICE_ACCOUNT").map(|setting| GoogleSettings {
        source: CredentialSource::from_setting(&setting),
        scopes: list_var("GOOGLE_SCOPES"),
        impersonate: var("GOOGLE_IMPERSONATE"),
    });

    let s3 = match (
        var("AWS_ACCESS_KEY_ID"),
        var("AWS_SECRET_ACCESS_KEY"),
        var("AWS_REGION"),
        var("S3_DEFAULT_BUCKET"),
    ) {
        (Some(access_key_id), Some(secret_access_key), Some(region), Some(default_bucket)) => {
            let public_read = match var("S3_PUBLIC_READ") {
                Some(v) => parse_flag("S3_PUBLIC_READ", &v)?,
                None => true,
            };
            let timeout_secs = match var("S3_TIMEOUT_SECS") {
                Some(v) => Some(v.trim().parse::<u64>().with_context(|| {
                    format!("S3_TIMEOUT_SECS must be a whole number of seconds, got {:?}", v)
                })?),
                None => None,
            };
            Some(S3Config {
                access_key_id,
                secret_access_key,
                region,
                default_bucket,
                endpoint: var("S3_ENDPOINT"),
                public_read,
                timeout_secs,
            })
        }
        _ => None,
    };

    let slack = match (
        var("SLACK_BOT_TOKEN"),
        var("SLACK_ERRORS_CHANNEL_ID"),
        var("SLACK_TEST_ALERTS_CHANNEL_ID"),
    ) {
        (Some(bot_token), Some(errors_channel_id), Some(test_alerts_channel_id)) => {
            Some(SlackConfig {
                bot_token,
                errors_channel_id,
                test_alerts_channel_id,
                environment: var("APP_ENV").unwrap_or_else(|| "development".into()),
                api_base: var("SLACK_API_BASE").unwrap_or_else(default_slack_api_base),
            })
        }
        _ => None,
    };

    Ok(AppConfig {
        google,
        s3,
        upload_sink_url: var("UPLOAD_SINK_URL"),
        slack,
        bigquery_project_id: var("BIGQUERY_PROJECT_ID"),
        bigquery_location: var("BIGQUERY_LOCATION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY_JSON: &str = include_str!("../tests/fixtures/service_account.json");

    fn load_vars(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_from(|name| vars.get(name).cloned())
    }

    const S3_VARS: [(&str, &str); 4] = [
        ("AWS_ACCESS_KEY_ID", "AKID"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
        ("AWS_REGION", "us-east-1"),
        ("S3_DEFAULT_BUCKET", "assets"),
    ];

    #[test]
    fn test_s3_config_from_camel_case_document() {
        let cfg: S3Config = serde_json::from_value(serde_json::json!({
            "accessKeyId": "AKID",
            "secretAccessKey": "secret",
            "region": "us-east-1",
            "nushop_ops_assets": "ops-assets"
        }))
        .unwrap();
        assert_eq!(cfg.default_bucket, "ops-assets");
        assert!(cfg.public_read);
        assert!(cfg.endpoint.is_none());
    }

    #[test]
    fn test_slack_config_defaults_api_base() {
        let cfg: SlackConfig = serde_json::from_value(serde_json::json!({
            "bot_token": "xoxb-1",
            "errors_channel_id": "CERR",
            "test_alerts_channel_id": "CTEST",
            "environment": "staging"
        }))
        .unwrap();
        assert_eq!(cfg.api_base, DEFAULT_SLACK_API_BASE);
    }

    #[test]
    fn test_bigquery_config_defaults() {
        let key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        let cfg = BigQueryConfig::new(key);
        assert_eq!(cfg.timeout_ms, 10_000);
        assert!(cfg.project_id.is_none());
    }

    #[test]
    fn test_missing_sections_are_none() {
        let cfg = load_vars(&[]).unwrap();
        assert!(cfg.google.is_none());
        assert!(cfg.s3.is_none());
        assert!(cfg.slack.is_none());
        assert!(cfg.google_auth().is_err());
    }

    #[test]
    fn test_s3_section_defaults() {
        let cfg = load_vars(&S3_VARS).unwrap();
        let s3 = cfg.s3.unwrap();
        assert!(s3.public_read);
        assert_eq!(s3.timeout_secs, None);
    }

    #[test]
    fn test_bad_s3_timeout_is_an_error() {
        let mut vars = S3_VARS.to_vec();
        vars.push(("S3_TIMEOUT_SECS", "thirty"));
        let err = load_vars(&vars).unwrap_err();
        assert!(err.to_string().contains("S3_TIMEOUT_SECS"), "error: {:#}", err);

        let mut vars = S3_VARS.to_vec();
        vars.push(("S3_TIMEOUT_SECS", "30"));
        assert_eq!(load_vars(&vars).unwrap().s3.unwrap().timeout_secs, Some(30));
    }

    #[test]
    fn test_bad_public_read_flag_is_an_error() {
        let mut vars = S3_VARS.to_vec();
        vars.push(("S3_PUBLIC_READ", "maybe"));
        assert!(load_vars(&vars).is_err());

        let mut vars = S3_VARS.to_vec();
        vars.push(("S3_PUBLIC_READ", "False"));
        assert!(!load_vars(&vars).unwrap().s3.unwrap().public_read);
    }

    #[test]
    fn test_bad_google_key_only_fails_google_commands() {
        let mut vars = vec![
            ("GOOGLE_SERVICE_ACCOUNT", "{\"type\": \"service_account\"}"),
            ("SLACK_BOT_TOKEN", "xoxb-1"),
            ("SLACK_ERRORS_CHANNEL_ID", "CERR"),
            ("SLACK_TEST_ALERTS_CHANNEL_ID", "CTEST"),
        ];
        vars.extend(S3_VARS);
        let cfg = load_vars(&vars).unwrap();

        assert!(cfg.slack.is_some());
        assert!(cfg.s3.is_some());
        let err = cfg.google_auth().unwrap_err();
        assert!(format!("{:#}", err).contains("missing client_email"), "error: {:#}", err);
        assert!(cfg.bigquery().is_err());
    }

    #[test]
    fn test_google_sections_from_inline_key() {
        let cfg = load_vars(&[
            ("GOOGLE_SERVICE_ACCOUNT", KEY_JSON),
            ("GOOGLE_SCOPES", "scope/a, scope/b"),
            ("GOOGLE_IMPERSONATE", "admin@example.com"),
            ("BIGQUERY_LOCATION", "EU"),
        ])
        .unwrap();

        let google = cfg.google_auth().unwrap();
        assert_eq!(google.scopes, vec!["scope/a", "scope/b"]);
        assert_eq!(google.impersonate.as_deref(), Some("admin@example.com"));

        let bigquery = cfg.bigquery().unwrap();
        assert_eq!(bigquery.location.as_deref(), Some("EU"));
        assert!(bigquery.project_id.is_none());
    }
}
