use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    models::{ConnectionParams, ConnectionTestResult, MetricDefinition},
    traits::MetricCollector,
    SchedulerError, SchedulerResult,
};

static GLOBAL_REGISTRY: OnceLock<Arc<CollectorRegistry>> = OnceLock::new();

#[derive(Default)]
struct RegistryState {
    /// 按注册顺序保存
    collectors: Vec<Arc<dyn MetricCollector>>,
    by_protocol: HashMap<String, Vec<usize>>,
    by_asset_type: HashMap<String, Vec<usize>>,
}

impl RegistryState {
    fn rebuild_indexes(&mut self) {
        self.by_protocol.clear();
        self.by_asset_type.clear();
        for (idx, collector) in self.collectors.iter().enumerate() {
            self.by_protocol
                .entry(normalize(collector.protocol()))
                .or_default()
                .push(idx);
            for asset_type in collector.supported_asset_types() {
                self.by_asset_type
                    .entry(normalize(&asset_type))
                    .or_default()
                    .push(idx);
            }
        }
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// 采集器注册信息
#[derive(Debug, Clone, Serialize)]
pub struct CollectorInfo {
    pub name: String,
    pub protocol: String,
    pub supported_asset_types: Vec<String>,
    pub priority: i32,
    pub supports_batch_collection: bool,
}

/// 采集器注册表
///
/// 按协议和资产类型建立索引。协议和资产类型的匹配不区分大小写。
/// 同一名称重复注册会替换原有采集器并保留其注册位置。
pub struct CollectorRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
        }
    }

    pub async fn register(&self, collector: Arc<dyn MetricCollector>) {
        let mut state = self.state.write().await;
        let existing = state
            .collectors
            .iter()
            .position(|c| c.name() == collector.name());
        match existing {
            Some(idx) => {
                debug!(collector = collector.name(), "重复注册采集器，替换原有实例");
                state.collectors[idx] = collector;
            }
            None => {
                info!(
                    collector = collector.name(),
                    protocol = collector.protocol(),
                    priority = collector.priority(),
                    "注册采集器"
                );
                state.collectors.push(collector);
            }
        }
        state.rebuild_indexes();
    }

    pub async fn register_batch(&self, collectors: Vec<Arc<dyn MetricCollector>>) {
        for collector in collectors {
            self.register(collector).await;
        }
    }

    /// 查找最适合的采集器
    ///
    /// 协议匹配且支持该资产类型的采集器中取优先级数值最小的一个；
    /// 优先级相同时先注册者胜出。没有匹配时返回 None，由调用方决定如何处理。
    pub async fn find_best_collector(
        &self,
        protocol: &str,
        asset_type: &str,
    ) -> Option<Arc<dyn MetricCollector>> {
        let state = self.state.read().await;
        let asset_type = normalize(asset_type);
        let candidates = state.by_protocol.get(&normalize(protocol))?;
        let supporting = state.by_asset_type.get(&asset_type)?;

        candidates
            .iter()
            .filter(|idx| supporting.contains(*idx))
            .map(|&idx| &state.collectors[idx])
            // min_by_key 在相等时返回第一个元素，即最先注册的
            .min_by_key(|c| c.priority())
            .cloned()
    }

    /// 查找能够采集某个指标的所有采集器，按优先级升序排列
    pub async fn find_collectors_for_metric(
        &self,
        metric: &MetricDefinition,
    ) -> Vec<Arc<dyn MetricCollector>> {
        let state = self.state.read().await;
        let Some(candidates) = state.by_protocol.get(&normalize(&metric.collection_method))
        else {
            return Vec::new();
        };

        let mut matched: Vec<Arc<dyn MetricCollector>> = candidates
            .iter()
            .map(|&idx| state.collectors[idx].clone())
            .filter(|c| c.supports_metric(metric))
            .collect();
        matched.sort_by_key(|c| c.priority());
        matched
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn MetricCollector>> {
        let state = self.state.read().await;
        state.collectors.iter().find(|c| c.name() == name).cloned()
    }

    pub async fn list(&self) -> Vec<CollectorInfo> {
        let state = self.state.read().await;
        state
            .collectors
            .iter()
            .map(|c| CollectorInfo {
                name: c.name().to_string(),
                protocol: c.protocol().to_string(),
                supported_asset_types: c.supported_asset_types(),
                priority: c.priority(),
                supports_batch_collection: c.supports_batch_collection(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.collectors.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 使用最适合的采集器测试连接，没有可用采集器时返回失败结果
    pub async fn test_connection(
        &self,
        protocol: &str,
        asset_type: &str,
        params: &ConnectionParams,
    ) -> ConnectionTestResult {
        match self.find_best_collector(protocol, asset_type).await {
            Some(collector) => collector.test_connection(asset_type, params).await,
            None => ConnectionTestResult::failure(
                "找不到适合的采集器",
                Some(format!("protocol={protocol}, asset_type={asset_type}")),
            ),
        }
    }

    /// 安装进程级注册表，只允许安装一次
    pub fn install_global(registry: CollectorRegistry) -> SchedulerResult<Arc<CollectorRegistry>> {
        let registry = Arc::new(registry);
        GLOBAL_REGISTRY
            .set(registry.clone())
            .map_err(|_| SchedulerError::Internal("采集器注册表已经初始化".to_string()))?;
        Ok(registry)
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionContext, CollectionResult};
    use async_trait::async_trait;
    use chrono::Utc;

    struct StubCollector {
        name: &'static str,
        protocol: &'static str,
        asset_types: Vec<&'static str>,
        priority: i32,
    }

    #[async_trait]
    impl MetricCollector for StubCollector {
        fn name(&self) -> &str {
            self.name
        }

        fn protocol(&self) -> &str {
            self.protocol
        }

        fn supported_asset_types(&self) -> Vec<String> {
            self.asset_types.iter().map(|s| s.to_string()).collect()
        }

        async fn collect(
            &self,
            _context: &mut CollectionContext,
        ) -> SchedulerResult<CollectionResult> {
            Ok(CollectionResult::started(Utc::now()))
        }

        async fn test_connection(
            &self,
            _asset_type: &str,
            _params: &ConnectionParams,
        ) -> ConnectionTestResult {
            ConnectionTestResult::success(self.name)
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn stub(
        name: &'static str,
        protocol: &'static str,
        asset_types: Vec<&'static str>,
        priority: i32,
    ) -> Arc<dyn MetricCollector> {
        Arc::new(StubCollector {
            name,
            protocol,
            asset_types,
            priority,
        })
    }

    #[tokio::test]
    async fn test_find_best_collector_by_priority() {
        let registry = CollectorRegistry::new();
        registry
            .register_batch(vec![
                stub("snmp-generic", "snmp", vec!["server", "network"], 100),
                stub("snmp-fast", "snmp", vec!["server"], 10),
                stub("jdbc", "jdbc", vec!["database"], 1),
            ])
            .await;

        let best = registry.find_best_collector("snmp", "server").await.unwrap();
        assert_eq!(best.name(), "snmp-fast");

        let best = registry.find_best_collector("snmp", "network").await.unwrap();
        assert_eq!(best.name(), "snmp-generic");

        assert!(registry.find_best_collector("snmp", "printer").await.is_none());
        assert!(registry.find_best_collector("ssh", "server").await.is_none());
    }

    #[tokio::test]
    async fn test_priority_tie_first_registered_wins() {
        let registry = CollectorRegistry::new();
        registry.register(stub("first", "http", vec!["server"], 50)).await;
        registry.register(stub("second", "http", vec!["server"], 50)).await;

        let best = registry.find_best_collector("http", "server").await.unwrap();
        assert_eq!(best.name(), "first");
    }

    #[tokio::test]
    async fn test_matching_is_case_insensitive() {
        let registry = CollectorRegistry::new();
        registry.register(stub("snmp", "SNMP", vec!["Server"], 100)).await;

        assert!(registry.find_best_collector("snmp", "server").await.is_some());
        assert!(registry.find_best_collector("Snmp", "SERVER").await.is_some());
    }

    #[tokio::test]
    async fn test_reregistration_is_idempotent() {
        let registry = CollectorRegistry::new();
        registry.register(stub("a", "http", vec!["server"], 100)).await;
        registry.register(stub("b", "http", vec!["server"], 100)).await;
        registry.register(stub("a", "http", vec!["server"], 100)).await;

        assert_eq!(registry.len().await, 2);
        let best = registry.find_best_collector("http", "server").await.unwrap();
        assert_eq!(best.name(), "a");
    }

    #[tokio::test]
    async fn test_find_collectors_for_metric() {
        let registry = CollectorRegistry::new();
        registry
            .register_batch(vec![
                stub("jdbc-slow", "jdbc", vec!["database"], 200),
                stub("jdbc-fast", "jdbc", vec!["database"], 5),
                stub("jdbc-server", "jdbc", vec!["server"], 1),
                stub("http", "http", vec!["database"], 1),
            ])
            .await;

        let metric = MetricDefinition::new(1, "connections", "database", "JDBC");
        let names: Vec<String> = registry
            .find_collectors_for_metric(&metric)
            .await
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["jdbc-fast", "jdbc-slow"]);
    }

    #[tokio::test]
    async fn test_connection_without_collector() {
        let registry = CollectorRegistry::new();
        let result = registry
            .test_connection("snmp", "printer", &ConnectionParams::new())
            .await;
        assert!(!result.success);
        assert!(result.error_detail.unwrap().contains("printer"));
    }

    #[test]
    fn test_global_registry_installs_once() {
        let installed = CollectorRegistry::install_global(CollectorRegistry::new()).unwrap();
        assert!(Arc::ptr_eq(&installed, GLOBAL_REGISTRY.get().unwrap()));
        assert!(matches!(
            CollectorRegistry::install_global(CollectorRegistry::new()),
            Err(SchedulerError::Internal(_))
        ));
    }
}
