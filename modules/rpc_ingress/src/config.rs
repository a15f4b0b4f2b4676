use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcIngressConfig {
    /// Address to bind; port 0 picks a free port.
    pub bind_addr: String,
    /// Mount point of `/{endpoint}/{operation}`; empty or `/` mounts at the root.
    pub path_prefix: String,
    pub body_limit_bytes: usize,
    pub request_timeout_secs: u64,
    pub cors_enabled: bool,
}

impl Default for RpcIngressConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8087".to_string(),
            path_prefix: "/rpc".to_string(),
            body_limit_bytes: 1024 * 1024,
            request_timeout_secs: 30,
            cors_enabled: false,
        }
    }
}

impl RpcIngressConfig {
    /// Prefix without trailing slash; `None` when mounted at the root.
    pub fn mount_point(&self) -> Option<String> {
        let trimmed = self.path_prefix.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        Some(if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_point_normalization() {
        let with = |p: &str| RpcIngressConfig {
            path_prefix: p.into(),
            ..Default::default()
        };
        assert_eq!(with("/rpc").mount_point().as_deref(), Some("/rpc"));
        assert_eq!(with("api/").mount_point().as_deref(), Some("/api"));
        assert_eq!(with("/").mount_point(), None);
        assert_eq!(with("").mount_point(), None);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let cfg: RpcIngressConfig =
            serde_json::from_value(serde_json::json!({"bind_addr": "0.0.0.0:9000"})).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.path_prefix, "/rpc");
        assert_eq!(cfg.request_timeout_secs, 30);
    }
}
