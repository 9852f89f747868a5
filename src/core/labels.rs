//! 欺诈标签解析 - 外部服务查询，失败即降级为无标签

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudLabel {
    pub id: i64,
    pub name: String,
    pub class_id: u32,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, alias = "createAt")]
    pub created_at: Option<String>,
}

impl FraudLabel {
    fn new(id: i64, name: &str, class_id: u32, color: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            class_id,
            color: Some(color.to_string()),
            created_at: Some("2024-01-01".to_string()),
        }
    }
}

static DEFAULT_LABELS: Lazy<Vec<FraudLabel>> = Lazy::new(|| {
    vec![
        FraudLabel::new(1, "Fake Logo", 0, "#FF0000"),
        FraudLabel::new(2, "Altered Text", 1, "#FFA500"),
        FraudLabel::new(3, "Counterfeit Product", 2, "#FFFF00"),
        FraudLabel::new(4, "Manipulated Image", 3, "#00FF00"),
        FraudLabel::new(5, "Forged Document", 4, "#0000FF"),
        FraudLabel::new(6, "Suspicious Pattern", 5, "#800080"),
    ]
});

/// Best-effort class id -> fraud label lookup. Never fails; absence is a normal answer.
pub trait LabelResolver: Send + Sync {
    fn resolve(&self, class_id: u32) -> Option<FraudLabel>;
}

pub struct CatalogLabelResolver {
    by_class: HashMap<u32, FraudLabel>,
}

impl CatalogLabelResolver {
    pub fn new(labels: Vec<FraudLabel>) -> Self {
        Self {
            by_class: labels.into_iter().map(|l| (l.class_id, l)).collect(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_LABELS.clone())
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl LabelResolver for CatalogLabelResolver {
    fn resolve(&self, class_id: u32) -> Option<FraudLabel> {
        self.by_class.get(&class_id).cloned()
    }
}

#[derive(Debug, Error)]
enum LabelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid label payload: {0}")]
    Json(#[from] serde_json::Error),
}

struct LabelCache {
    labels: HashMap<u32, FraudLabel>,
    /// Last fetch attempt, successful or not.
    checked_at: Option<Instant>,
}

/// Fetches the label table from the external label service and keeps it for `ttl`.
pub struct HttpLabelResolver {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    ttl: Duration,
    cache: Mutex<LabelCache>,
}

impl HttpLabelResolver {
    pub fn new(base_url: &str, api_key: Option<String>, ttl: Duration, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("⚠️ Label client builder failed ({}), using defaults", e);
                Client::new()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            ttl,
            cache: Mutex::new(LabelCache {
                labels: HashMap::new(),
                checked_at: None,
            }),
        }
    }

    fn fetch_labels(&self) -> Result<Vec<FraudLabel>, LabelError> {
        let mut request = self.client.get(format!("{}/fraud-labels", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let body = request.send()?.error_for_status()?.text()?;
        parse_labels(&body)
    }

    fn is_fresh(&self, cache: &LabelCache) -> bool {
        cache
            .checked_at
            .map(|at| at.elapsed() < self.ttl)
            .unwrap_or(false)
    }
}

impl LabelResolver for HttpLabelResolver {
    fn resolve(&self, class_id: u32) -> Option<FraudLabel> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !self.is_fresh(&cache) {
            match self.fetch_labels() {
                Ok(labels) => {
                    debug!("Fetched {} fraud labels from {}", labels.len(), self.base_url);
                    cache.labels = labels.into_iter().map(|l| (l.class_id, l)).collect();
                }
                Err(e) => {
                    // stale entries stay; no retry until the ttl runs out
                    warn!("⚠️ Fraud label lookup failed: {}", e);
                }
            }
            cache.checked_at = Some(Instant::now());
        }

        cache.labels.get(&class_id).cloned()
    }
}

fn parse_labels(body: &str) -> Result<Vec<FraudLabel>, LabelError> {
    Ok(serde_json::from_str(body)?)
}

pub fn resolver_from_config(config: &ServiceConfig) -> Box<dyn LabelResolver> {
    match &config.label_service_url {
        Some(url) => {
            info!("🏷️ Using fraud label service at {}", url);
            Box::new(HttpLabelResolver::new(
                url,
                config.label_api_key.clone(),
                Duration::from_secs(config.label_cache_ttl_secs),
                Duration::from_secs(config.label_timeout_secs),
            ))
        }
        None => {
            info!("🏷️ No label service configured, using built-in catalogue");
            Box::new(CatalogLabelResolver::with_defaults())
        }
    }
}
