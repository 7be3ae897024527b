use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use automation_shared::config::{self, AppConfig};
use automation_shared::google::{CredentialIssuer, Principal, ScopeSet};
use automation_shared::notification::SlackNotifier;
use automation_shared::storage::{ObjectStoreSink, ObjectUploader};
use automation_shared::warehouse::BigQueryClient;

mod cli;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "automation_shared=info".into()),
    );

    // Logs go to stderr so command output on stdout stays clean.
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let (json_layer, text_layer) = if json {
        (
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
            None,
        )
    } else {
        (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_tracing();

    let cfg = config::load()?;

    let result = run(cfg, args.command).await;
    if let Err(ref e) = result {
        tracing::error!(error = %format!("{:#}", e), "command failed");
    }
    result
}

async fn run(cfg: AppConfig, command: cli::Commands) -> anyhow::Result<()> {
    match command {
        cli::Commands::Token { scopes, impersonate } => {
            let google = cfg.google_auth()?;
            let scopes = if scopes.is_empty() { google.scopes } else { scopes };
            let scopes = ScopeSet::new(scopes).context("pass --scope or set GOOGLE_SCOPES")?;
            let subject = impersonate
                .or(google.impersonate)
                .map(Principal::new)
                .transpose()?;

            let issuer = CredentialIssuer::new(google.credentials, scopes);
            let token = issuer.issue_token(subject.as_ref()).await?;
            println!("{}", token.secret());
        }
        cli::Commands::Upload { file, key, bucket } => {
            let s3 = cfg.s3.context(
                "S3 is not configured: set AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_REGION and S3_DEFAULT_BUCKET",
            )?;
            let body = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;

            let uploader = match cfg.upload_sink_url.as_deref() {
                Some(url) => {
                    let sink = ObjectStoreSink::from_url(url)?;
                    tracing::info!(url, "object uploader: using local sink");
                    ObjectUploader::with_sink(Arc::new(sink), s3.region, s3.default_bucket)
                }
                None => ObjectUploader::new(s3)?,
            };
            let url = uploader
                .upload(Bytes::from(body), &key, bucket.as_deref())
                .await?;
            println!("{}", url);
        }
        cli::Commands::Notify {
            message,
            error,
            channel,
        } => {
            let slack = cfg.slack.context(
                "Slack is not configured: set SLACK_BOT_TOKEN, SLACK_ERRORS_CHANNEL_ID and SLACK_TEST_ALERTS_CHANNEL_ID",
            )?;
            let notifier = SlackNotifier::new(slack);
            match notifier.notify(&message, error, channel.as_deref()).await {
                Some(receipt) => println!("{}", receipt.ts),
                None => tracing::warn!("message was not delivered"),
            }
        }
        cli::Commands::Query { sql, output } => {
            let client = BigQueryClient::connect(cfg.bigquery()?).await?;
            let csv = client.query(&sql).await?.to_csv();

            match output {
                Some(path) => tokio::fs::write(&path, csv)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => std::io::stdout()
                    .write_all(csv.as_bytes())
                    .context("failed to write to stdout")?,
            }
        }
    }
    Ok(())
}
