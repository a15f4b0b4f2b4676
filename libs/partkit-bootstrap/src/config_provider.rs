use crate::config::AppConfig;
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Read access to configuration for parts.
pub trait ConfigProvider: Send + Sync {
    /// Raw configuration of a part, if any.
    fn get_part_config(&self, part_name: &str) -> Option<&serde_json::Value>;

    /// A top-level section (`server`, `store`, `logging`) as JSON.
    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value>;
}

pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn from_arc(config: Arc<AppConfig>) -> Self {
        Self(config)
    }

    pub fn inner(&self) -> &AppConfig {
        &self.0
    }
}

impl ConfigProvider for AppConfigProvider {
    fn get_part_config(&self, part_name: &str) -> Option<&serde_json::Value> {
        self.0.parts.get(part_name)
    }

    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "server" => serde_json::to_value(&self.0.server).ok(),
            "store" => serde_json::to_value(&self.0.store).ok(),
            "logging" => self
                .0
                .logging
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            _ => None,
        }
    }
}

/// Typed configuration of a part; a part without configuration gets `T::default()`.
pub fn part_config<T: DeserializeOwned + Default>(
    provider: &dyn ConfigProvider,
    part_name: &str,
) -> anyhow::Result<T> {
    match provider.get_part_config(part_name) {
        Some(raw) => serde_json::from_value(raw.clone())
            .with_context(|| format!("Invalid configuration for part '{part_name}'")),
        None => Ok(T::default()),
    }
}
