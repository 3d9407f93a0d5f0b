use async_trait::async_trait;

use crate::{
    models::{
        CollectionContext, CollectionResult, ConnectionParams, ConnectionTestResult,
        MetricDefinition,
    },
    SchedulerResult,
};

/// 指标采集器插件接口
///
/// 每种协议的采集实现都需要实现该接口，并在进程启动时注册到
/// [`CollectorRegistry`](crate::CollectorRegistry)。
///
/// `collect` 返回 `Err` 表示采集整体无法进行（连接失败、超时等）；单个指标的失败
/// 应记录在 `CollectionResult` 中，而不是返回错误。
#[async_trait]
pub trait MetricCollector: Send + Sync {
    /// 采集器名称，注册表以名称去重
    fn name(&self) -> &str;

    fn protocol(&self) -> &str;

    fn supported_asset_types(&self) -> Vec<String>;

    async fn collect(&self, context: &mut CollectionContext) -> SchedulerResult<CollectionResult>;

    async fn test_connection(
        &self,
        asset_type: &str,
        params: &ConnectionParams,
    ) -> ConnectionTestResult;

    /// 优先级，数值越小越优先
    fn priority(&self) -> i32 {
        100
    }

    fn supports_batch_collection(&self) -> bool {
        true
    }

    fn supports(&self, protocol: &str, asset_type: &str) -> bool {
        self.protocol().eq_ignore_ascii_case(protocol)
            && self
                .supported_asset_types()
                .iter()
                .any(|t| t.eq_ignore_ascii_case(asset_type))
    }

    fn supports_metric(&self, metric: &MetricDefinition) -> bool {
        self.supports(&metric.collection_method, &metric.category)
    }
}
