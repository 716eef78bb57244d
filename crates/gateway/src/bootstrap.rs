//! AppState construction extracted from `main.rs`.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use mm_domain::config::{Config, ConfigSeverity};
use mm_platform::HttpPlatformClient;
use mm_providers::OpenAiCompatProvider;
use mm_store::{FileHistoryStore, FsMediaStore, JsonProfileStore};

use crate::runtime::{Collaborators, Pipeline, PipelineSettings};
use crate::state::AppState;

/// Validate config, initialize every collaborator and return a fully
/// wired [`AppState`].
pub async fn build_app_state(
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let state_path = &config.storage.state_path;

    // ── Stores ───────────────────────────────────────────────────────
    let history = Arc::new(
        FileHistoryStore::new(state_path).context("initializing history store")?,
    );
    let media = Arc::new(
        FsMediaStore::new(
            state_path,
            &config.server.public_base_url,
            signing_key(&config.storage.signing_secret_env),
        )
        .context("initializing media store")?,
    );
    let profiles = Arc::new(
        JsonProfileStore::open(state_path).context("initializing profile store")?,
    );

    // ── External services ────────────────────────────────────────────
    let platform = Arc::new(
        HttpPlatformClient::from_config(&config.platform)
            .context("initializing platform client")?,
    );
    let generator = Arc::new(
        OpenAiCompatProvider::from_config(&config.llm).context("initializing LLM provider")?,
    );
    tracing::info!(
        provider = %config.llm.provider_id,
        model = %config.llm.model,
        "LLM provider ready"
    );

    // ── Pipeline ─────────────────────────────────────────────────────
    let settings = PipelineSettings::from_config(&config).context("pipeline settings")?;
    tracing::info!(
        timezone = %settings.timezone.name(),
        indicator_delay_ms = settings.indicator_delay.as_millis() as u64,
        deliver_reply = settings.deliver_reply,
        persist_reply = settings.persist_reply,
        "pipeline ready"
    );
    let pipeline = Arc::new(Pipeline::new(
        Collaborators {
            platform,
            generator,
            history,
            media: media.clone(),
            profiles,
        },
        settings,
    ));

    let channel_secret: Option<Arc<[u8]>> =
        env_secret(&config.platform.channel_secret_env).map(|s| Arc::from(s.into_bytes()));
    if channel_secret.is_none() {
        tracing::warn!(
            env_var = %config.platform.channel_secret_env,
            "channel secret not set, webhook signatures will NOT be verified"
        );
    }

    Ok(AppState {
        config,
        pipeline,
        media,
        channel_secret,
        shutdown,
    })
}

fn env_secret(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// HMAC key for signed media URLs.  Without a configured secret, links
/// stop verifying when the process restarts.
fn signing_key(var: &str) -> Vec<u8> {
    match env_secret(var) {
        Some(secret) => secret.into_bytes(),
        None => {
            tracing::warn!(
                env_var = %var,
                "media signing secret not set, using an ephemeral key"
            );
            let mut key = uuid::Uuid::new_v4().as_bytes().to_vec();
            key.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
            key
        }
    }
}
