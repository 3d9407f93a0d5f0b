//! 测试用采集器
//!
//! - `StaticValueCollector`：按协议映射的路径从固定的值表中取值
//! - `FailingCollector`：采集整体失败
//! - `PanickingCollector`：采集时 panic
//! - `SlowCollector`：采集前等待一段时间

use async_trait::async_trait;
use chrono::Utc;
use collector_core::metric_value::collect_metrics;
use collector_core::models::{
    CollectionContext, CollectionResult, ConnectionParams, ConnectionTestResult,
};
use collector_core::traits::MetricCollector;
use collector_core::{SchedulerError, SchedulerResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 从固定值表中取值的采集器
#[derive(Clone)]
pub struct StaticValueCollector {
    name: String,
    protocol: String,
    asset_types: Vec<String>,
    priority: i32,
    values: HashMap<String, serde_json::Value>,
    calls: Arc<AtomicUsize>,
    last_params: Arc<Mutex<Option<ConnectionParams>>>,
}

impl StaticValueCollector {
    pub fn new(name: &str, protocol: &str, asset_types: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            protocol: protocol.to_string(),
            asset_types: asset_types.iter().map(|t| t.to_string()).collect(),
            priority: 100,
            values: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            last_params: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_value(mut self, path: &str, value: serde_json::Value) -> Self {
        self.values.insert(path.to_string(), value);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 最近一次采集收到的连接参数
    pub fn last_params(&self) -> Option<ConnectionParams> {
        self.last_params.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricCollector for StaticValueCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn supported_asset_types(&self) -> Vec<String> {
        self.asset_types.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn collect(&self, context: &mut CollectionContext) -> SchedulerResult<CollectionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(context.connection_params.clone());

        let mut result = CollectionResult::started(Utc::now());
        collect_metrics(context, &mut result, |_, mapping| {
            self.values
                .get(&mapping.path)
                .cloned()
                .ok_or_else(|| format!("路径不存在: {}", mapping.path))
        });
        Ok(result.complete(Utc::now()))
    }

    async fn test_connection(
        &self,
        _asset_type: &str,
        params: &ConnectionParams,
    ) -> ConnectionTestResult {
        if params.contains_key("unreachable") {
            ConnectionTestResult::failure("连接失败", Some("connection refused".to_string()))
        } else {
            ConnectionTestResult::success("连接成功")
        }
    }
}

/// 采集整体失败的采集器
pub struct FailingCollector {
    protocol: String,
    error: fn() -> SchedulerError,
}

impl FailingCollector {
    pub fn new(protocol: &str, error: fn() -> SchedulerError) -> Self {
        Self {
            protocol: protocol.to_string(),
            error,
        }
    }

    /// 连接被拒绝
    pub fn connection_refused(protocol: &str) -> Self {
        Self::new(protocol, || {
            SchedulerError::TransientIo("connection refused".to_string())
        })
    }
}

#[async_trait]
impl MetricCollector for FailingCollector {
    fn name(&self) -> &str {
        "failing"
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn supported_asset_types(&self) -> Vec<String> {
        vec!["server".to_string(), "database".to_string()]
    }

    async fn collect(&self, _context: &mut CollectionContext) -> SchedulerResult<CollectionResult> {
        Err((self.error)())
    }

    async fn test_connection(&self, _: &str, _: &ConnectionParams) -> ConnectionTestResult {
        ConnectionTestResult::failure("连接失败", Some((self.error)().to_string()))
    }
}

/// 采集时 panic 的采集器
pub struct PanickingCollector {
    protocol: String,
}

impl PanickingCollector {
    pub fn new(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
        }
    }
}

#[async_trait]
impl MetricCollector for PanickingCollector {
    fn name(&self) -> &str {
        "panicking"
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn supported_asset_types(&self) -> Vec<String> {
        vec!["server".to_string()]
    }

    async fn collect(&self, _context: &mut CollectionContext) -> SchedulerResult<CollectionResult> {
        panic!("collector bug");
    }

    async fn test_connection(&self, _: &str, _: &ConnectionParams) -> ConnectionTestResult {
        panic!("collector bug");
    }
}

/// 采集前等待的采集器
pub struct SlowCollector {
    inner: StaticValueCollector,
    delay: Duration,
}

impl SlowCollector {
    pub fn new(inner: StaticValueCollector, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl MetricCollector for SlowCollector {
    fn name(&self) -> &str {
        "slow"
    }

    fn protocol(&self) -> &str {
        self.inner.protocol()
    }

    fn supported_asset_types(&self) -> Vec<String> {
        self.inner.supported_asset_types()
    }

    async fn collect(&self, context: &mut CollectionContext) -> SchedulerResult<CollectionResult> {
        tokio::time::sleep(self.delay).await;
        self.inner.collect(context).await
    }

    async fn test_connection(&self, asset_type: &str, params: &ConnectionParams) -> ConnectionTestResult {
        self.inner.test_connection(asset_type, params).await
    }
}
