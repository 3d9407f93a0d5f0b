use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{MetricData, MetricDefinition, MetricProtocolMapping};

pub type ConnectionParams = serde_json::Map<String, serde_json::Value>;

/// 资产基本信息，由外部资产服务提供
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetInfo {
    pub id: i64,
    pub name: String,
    pub ip: Option<String>,
    pub asset_type: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

/// 单次采集调用的输入
///
/// 每次调用独占一个上下文，不会在线程之间共享。
#[derive(Debug, Clone)]
pub struct CollectionContext {
    pub task_id: i64,
    pub instance_id: i64,
    pub asset: AssetInfo,
    pub metrics: Vec<MetricDefinition>,
    pub protocol_mappings: HashMap<i64, MetricProtocolMapping>,
    pub connection_params: ConnectionParams,
    /// 采集器可用的临时变量
    pub variables: HashMap<String, serde_json::Value>,
}

impl CollectionContext {
    pub fn mapping_for(&self, metric_id: i64) -> Option<&MetricProtocolMapping> {
        self.protocol_mappings.get(&metric_id)
    }

    /// 获取指标的取值路径，没有映射时返回 None
    pub fn metric_path(&self, metric: &MetricDefinition) -> Option<&str> {
        match self.mapping_for(metric.id) {
            Some(mapping) => Some(mapping.path.as_str()),
            None => {
                warn!(
                    metric_id = metric.id,
                    metric_code = %metric.code,
                    "指标没有对应的协议映射"
                );
                None
            }
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.connection_params.get(key).and_then(|v| v.as_str())
    }

    /// 构造带有标准标签的指标值
    pub fn metric_data(&self, metric: &MetricDefinition, value: f64) -> MetricData {
        let mut labels = BTreeMap::new();
        labels.insert("asset_id".to_string(), self.asset.id.to_string());
        labels.insert("asset_name".to_string(), self.asset.name.clone());
        labels.insert("metric_id".to_string(), metric.id.to_string());
        labels.insert("metric_code".to_string(), metric.code.clone());
        if let Some(unit) = &metric.unit {
            labels.insert("unit".to_string(), unit.clone());
        }

        MetricData {
            task_id: self.task_id,
            instance_id: self.instance_id,
            asset_id: self.asset.id,
            metric_id: metric.id,
            metric_code: metric.code.clone(),
            value,
            unit: metric.unit.clone(),
            labels,
            timestamp: Utc::now(),
        }
    }
}

/// 单次采集调用的输出
///
/// 每个指标的成功或失败互相独立：`success_count + fail_count` 等于实际尝试的指标数，
/// 缺少协议映射的指标记为失败而不是忽略。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResult {
    /// 采集是否得以进行，以及至少有一个指标成功
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub metric_data: Vec<MetricData>,
    pub success_count: usize,
    pub fail_count: usize,
    pub metric_errors: BTreeMap<i64, String>,
    pub error_message: Option<String>,
    pub ext_info: HashMap<String, serde_json::Value>,
}

impl CollectionResult {
    pub fn started(start_time: DateTime<Utc>) -> Self {
        Self {
            success: true,
            start_time,
            end_time: None,
            metric_data: Vec::new(),
            success_count: 0,
            fail_count: 0,
            metric_errors: BTreeMap::new(),
            error_message: None,
            ext_info: HashMap::new(),
        }
    }

    /// 采集整体无法进行，例如无法建立连接
    pub fn failure(start_time: DateTime<Utc>, message: impl Into<String>) -> Self {
        let mut result = Self::started(start_time);
        result.success = false;
        result.error_message = Some(message.into());
        result.end_time = Some(Utc::now());
        result
    }

    pub fn add_metric_data(&mut self, data: MetricData) {
        self.metric_data.push(data);
        self.success_count += 1;
    }

    pub fn add_metric_error(&mut self, metric_id: i64, message: impl Into<String>) {
        self.metric_errors.insert(metric_id, message.into());
        self.fail_count += 1;
    }

    pub fn attempted(&self) -> usize {
        self.success_count + self.fail_count
    }

    /// 结束采集并确定整体结果
    ///
    /// 只要有一个指标成功整体即为成功；一个指标都没有成功（包括没有尝试任何指标）时为失败。
    pub fn complete(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        if self.success && self.success_count == 0 {
            self.success = false;
            if self.error_message.is_none() {
                self.error_message = Some(if self.attempted() == 0 {
                    "没有可采集的指标".to_string()
                } else {
                    format!("所有指标采集失败: {}", self.error_summary())
                });
            }
        }
        self
    }

    /// 按实际收集到的数据校正采集器上报的计数和结论
    ///
    /// 成功数以 `metric_data` 为准，之后按 `complete` 的规则确定整体结果。
    /// 采集器已经给出的结束时间保持不变。
    pub fn reconciled(mut self, now: DateTime<Utc>) -> Self {
        self.success_count = self.metric_data.len();
        self.fail_count = self.fail_count.max(self.metric_errors.len());
        let end_time = self.end_time.unwrap_or(now);
        self.complete(end_time)
    }

    /// 指标错误摘要，按指标ID排序
    pub fn error_summary(&self) -> String {
        self.metric_errors
            .iter()
            .map(|(id, message)| format!("指标{id}: {message}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// 连接测试结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    pub error_detail: Option<String>,
    pub details: HashMap<String, serde_json::Value>,
    pub latency_ms: Option<u64>,
}

impl ConnectionTestResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_detail: None,
            details: HashMap::new(),
            latency_ms: None,
        }
    }

    pub fn failure(message: impl Into<String>, error_detail: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_detail,
            details: HashMap::new(),
            latency_ms: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CollectionContext {
        CollectionContext {
            task_id: 1,
            instance_id: 10,
            asset: AssetInfo {
                id: 5,
                name: "db-01".to_string(),
                ip: Some("10.0.0.5".to_string()),
                asset_type: "database".to_string(),
                attributes: HashMap::new(),
            },
            metrics: vec![],
            protocol_mappings: HashMap::new(),
            connection_params: ConnectionParams::new(),
            variables: HashMap::new(),
        }
    }

    #[test]
    fn test_partial_failure_keeps_success() {
        let ctx = context();
        let metric = MetricDefinition::new(1, "cpu", "database", "jdbc");
        let mut result = CollectionResult::started(Utc::now());
        result.add_metric_data(ctx.metric_data(&metric, 0.5));
        result.add_metric_error(2, "无法解析");
        let result = result.complete(Utc::now());

        assert!(result.success);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.fail_count, 1);
        assert_eq!(result.metric_errors.len(), 1);
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_reconciled_corrects_reported_counts() {
        let ctx = context();
        let metric = MetricDefinition::new(1, "cpu", "database", "jdbc");
        let now = Utc::now();

        // 自报成功但没有任何数据
        let mut empty = CollectionResult::started(now);
        empty.success_count = 3;
        let empty = empty.reconciled(now);
        assert!(!empty.success);
        assert_eq!(empty.success_count, 0);
        assert_eq!(empty.end_time, Some(now));
        assert_eq!(empty.error_message.as_deref(), Some("没有可采集的指标"));

        // 直接写入数据而没有计数
        let mut direct = CollectionResult::started(now);
        direct.metric_data.push(ctx.metric_data(&metric, 1.0));
        direct.metric_errors.insert(2, "超时".to_string());
        let direct = direct.reconciled(now);
        assert!(direct.success);
        assert_eq!(direct.success_count, 1);
        assert_eq!(direct.fail_count, 1);

        // 已有的结束时间不被覆盖
        let earlier = now - chrono::Duration::seconds(5);
        let mut finished = CollectionResult::failure(now, "连接失败");
        finished.end_time = Some(earlier);
        let finished = finished.reconciled(now);
        assert_eq!(finished.end_time, Some(earlier));
        assert!(!finished.success);
        assert_eq!(finished.error_message.as_deref(), Some("连接失败"));
    }

    #[test]
    fn test_all_failed_is_failure() {
        let mut result = CollectionResult::started(Utc::now());
        result.add_metric_error(1, "a");
        result.add_metric_error(2, "b");
        let result = result.complete(Utc::now());

        assert!(!result.success);
        assert_eq!(result.attempted(), 2);
        let message = result.error_message.unwrap();
        assert!(message.contains("指标1: a"));
        assert!(message.contains("指标2: b"));
    }

    #[test]
    fn test_nothing_attempted_is_failure() {
        let result = CollectionResult::started(Utc::now()).complete(Utc::now());
        assert!(!result.success);
        assert_eq!(result.attempted(), 0);
    }

    #[test]
    fn test_metric_data_labels() {
        let ctx = context();
        let mut metric = MetricDefinition::new(3, "qps", "database", "jdbc");
        metric.unit = Some("次/秒".to_string());
        let data = ctx.metric_data(&metric, 42.0);

        assert_eq!(data.labels.get("asset_id").map(String::as_str), Some("5"));
        assert_eq!(data.labels.get("asset_name").map(String::as_str), Some("db-01"));
        assert_eq!(data.labels.get("metric_code").map(String::as_str), Some("qps"));
        assert_eq!(data.labels.get("unit").map(String::as_str), Some("次/秒"));
        assert_eq!(data.instance_id, 10);
    }
}
