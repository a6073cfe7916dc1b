use crate::{
    classifier::Classifier,
    completion::{AzureOpenAiClient, AzureOpenAiConfig},
    config::Config,
    email::{AcsEmailClient, ConnectionString},
    secrets::{self, SecretStore},
    state::{AppState, NotificationSettings, UpstreamInfo},
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

pub const DEFAULT_API_VERSION: &str = "2025-01-01-preview";
pub const DEFAULT_DEPLOYMENT: &str = "gpt-4o";

/// Build secrets store.
///
/// If `secrets_file` is provided, secrets resolve from: file -> env.
pub fn build_secrets_store(secrets_file: Option<PathBuf>) -> Result<Arc<dyn SecretStore>> {
    let secrets: Arc<dyn SecretStore> = if let Some(path) = &secrets_file {
        let file_store = secrets::EnvFileStore::load(path)?;
        Arc::new(secrets::CompositeStore::new(vec![
            Box::new(file_store),
            Box::new(secrets::EnvStore),
        ]))
    } else {
        Arc::new(secrets::EnvStore)
    };

    Ok(secrets)
}

/// Resolve a secret that the relay cannot run without.
pub fn require(secrets: &Arc<dyn SecretStore>, key: &str) -> Result<String> {
    match secrets.get(key) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => anyhow::bail!("required secret missing or empty in secrets store ({})", key),
    }
}

pub fn completion_config(
    secrets: &Arc<dyn SecretStore>,
    config: &Config,
) -> Result<AzureOpenAiConfig> {
    Ok(AzureOpenAiConfig {
        endpoint: require(secrets, secrets::AZURE_OPENAI_ENDPOINT)?,
        api_key: require(secrets, secrets::AZURE_OPENAI_API_KEY)?,
        api_version: secrets
            .get(secrets::AZURE_OPENAI_API_VERSION)
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        deployment: secrets
            .get(secrets::AZURE_DEPLOYMENT_NAME)
            .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
        timeout: config.completion.timeout(),
    })
}

/// Build the shared application state: both upstream clients plus request policy.
pub fn build_state(config: &Config, secrets: &Arc<dyn SecretStore>) -> Result<AppState> {
    let completion_cfg = completion_config(secrets, config)?;
    let completion =
        AzureOpenAiClient::new(&completion_cfg).context("building completion client")?;

    let system_prompt = require(secrets, secrets::AZURE_OPENAI_SYSTEM_PROMPT)?;

    let connection: ConnectionString = require(secrets, secrets::ACS_CONNECTION_STRING)?
        .parse()
        .with_context(|| format!("parsing {}", secrets::ACS_CONNECTION_STRING))?;
    let email = AcsEmailClient::new(connection).context("building email client")?;
    let sender_address = require(secrets, secrets::ACS_SENDER_ADDRESS)?;

    let allowed_origin = secrets
        .get(secrets::BANTAI_ALLOWED_ORIGIN)
        .unwrap_or_else(|| config.server.allowed_origin.clone());

    if completion_cfg.timeout.is_none() {
        warn!("no completion timeout configured; requests wait on the completion service indefinitely");
    }

    info!(
        deployment = %completion_cfg.deployment,
        api_version = %completion_cfg.api_version,
        allowed_origin = %allowed_origin,
        notifications = config.notification.enabled,
        "relay configured"
    );

    Ok(AppState {
        classifier: Classifier::new(
            Arc::new(completion),
            system_prompt,
            config.completion.sampling,
        ),
        email: Arc::new(email),
        notifications: NotificationSettings {
            enabled: config.notification.enabled,
            sender_address,
        },
        allowed_origin,
        upstream: UpstreamInfo {
            deployment: completion_cfg.deployment,
            api_version: completion_cfg.api_version,
            timeout_secs: config.completion.timeout_secs,
        },
    })
}
