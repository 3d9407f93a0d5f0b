use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use collector_core::{
    config::{AssetServiceConfig, AssetServiceKind},
    models::{AssetInfo, ConnectionParams},
    traits::AssetService,
    SchedulerError, SchedulerResult,
};
use reqwest::StatusCode;
use tracing::{debug, warn};

/// 按配置创建资产服务
pub fn create_asset_service(config: &AssetServiceConfig) -> SchedulerResult<Arc<dyn AssetService>> {
    match config.kind {
        AssetServiceKind::Http => Ok(Arc::new(HttpAssetService::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_seconds),
        )?)),
        AssetServiceKind::Static => Ok(Arc::new(StaticAssetService::from_config(config))),
    }
}

/// 通过HTTP访问外部资产服务
pub struct HttpAssetService {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpAssetService {
    pub fn new(base_url: &str, timeout: Duration) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Internal(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> SchedulerResult<reqwest::Response> {
        self.http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                warn!("资产服务请求失败: {} - {}", url, e);
                SchedulerError::TransientIo(format!("资产服务不可达: {e}"))
            })
    }
}

#[async_trait]
impl AssetService for HttpAssetService {
    async fn get_asset_basic_info(&self, asset_id: i64) -> SchedulerResult<Option<AssetInfo>> {
        let url = format!("{}/assets/{}/basic", self.base_url, asset_id);
        let response = self.get(&url, &[]).await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("资产不存在: {}", asset_id);
                Ok(None)
            }
            status if status.is_success() => {
                let info = response.json::<AssetInfo>().await.map_err(|e| {
                    SchedulerError::Serialization(format!("解析资产信息失败: {e}"))
                })?;
                Ok(Some(info))
            }
            status => Err(SchedulerError::TransientIo(format!(
                "获取资产信息失败: HTTP {status}"
            ))),
        }
    }

    async fn get_asset_connection_params(
        &self,
        asset_id: i64,
        protocol: &str,
    ) -> SchedulerResult<ConnectionParams> {
        let url = format!("{}/assets/{}/connection-params", self.base_url, asset_id);
        let response = self.get(&url, &[("protocol", protocol)]).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(ConnectionParams::new()),
            status if status.is_success() => response
                .json::<ConnectionParams>()
                .await
                .map_err(|e| SchedulerError::Serialization(format!("解析连接参数失败: {e}"))),
            status => Err(SchedulerError::TransientIo(format!(
                "获取连接参数失败: HTTP {status}"
            ))),
        }
    }
}

/// 由配置文件提供的静态资产
#[derive(Default)]
pub struct StaticAssetService {
    assets: HashMap<i64, (AssetInfo, ConnectionParams)>,
}

impl StaticAssetService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AssetServiceConfig) -> Self {
        let mut service = Self::new();
        for asset in &config.assets {
            service = service.with_asset(asset.info.clone(), asset.connection_params.clone());
        }
        service
    }

    pub fn with_asset(mut self, info: AssetInfo, connection_params: ConnectionParams) -> Self {
        self.assets.insert(info.id, (info, connection_params));
        self
    }
}

#[async_trait]
impl AssetService for StaticAssetService {
    async fn get_asset_basic_info(&self, asset_id: i64) -> SchedulerResult<Option<AssetInfo>> {
        Ok(self.assets.get(&asset_id).map(|(info, _)| info.clone()))
    }

    async fn get_asset_connection_params(
        &self,
        asset_id: i64,
        _protocol: &str,
    ) -> SchedulerResult<ConnectionParams> {
        Ok(self
            .assets
            .get(&asset_id)
            .map(|(_, params)| params.clone())
            .unwrap_or_default())
    }
}
