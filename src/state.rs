use crate::{classifier::Classifier, email::EmailService};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub sender_address: String,
}

/// Non-secret facts about the upstream deployment, reported by `/status`.
#[derive(Clone, Debug, Default)]
pub struct UpstreamInfo {
    pub deployment: String,
    pub api_version: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Clone)]
pub struct AppState {
    pub classifier: Classifier,
    pub email: Arc<dyn EmailService>,
    pub notifications: NotificationSettings,
    pub allowed_origin: String,
    pub upstream: UpstreamInfo,
}
