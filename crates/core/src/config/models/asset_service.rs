use serde::{Deserialize, Serialize};

use crate::models::{AssetInfo, ConnectionParams};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetServiceKind {
    Http,
    Static,
}

/// 静态配置的资产及其连接参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticAssetConfig {
    #[serde(flatten)]
    pub info: AssetInfo,
    #[serde(default)]
    pub connection_params: ConnectionParams,
}

/// 资产服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetServiceConfig {
    pub kind: AssetServiceKind,
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub assets: Vec<StaticAssetConfig>,
}

impl Default for AssetServiceConfig {
    fn default() -> Self {
        Self {
            kind: AssetServiceKind::Static,
            base_url: "http://localhost:8081".to_string(),
            request_timeout_seconds: 10,
            assets: Vec::new(),
        }
    }
}

impl AssetServiceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kind == AssetServiceKind::Http {
            if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
                return Err(anyhow::anyhow!(
                    "资产服务地址必须以http://或https://开头: {}",
                    self.base_url
                ));
            }
            if self.request_timeout_seconds == 0 {
                return Err(anyhow::anyhow!("资产服务请求超时时间必须大于0"));
            }
        }
        Ok(())
    }
}
