use async_trait::async_trait;

use crate::{
    models::{AssetInfo, ConnectionParams},
    SchedulerResult,
};

/// 外部资产服务
///
/// 资产不存在返回 `Ok(None)`；服务不可达应返回 `SchedulerError::TransientIo`。
#[async_trait]
pub trait AssetService: Send + Sync {
    async fn get_asset_basic_info(&self, asset_id: i64) -> SchedulerResult<Option<AssetInfo>>;

    async fn get_asset_connection_params(
        &self,
        asset_id: i64,
        protocol: &str,
    ) -> SchedulerResult<ConnectionParams>;
}
