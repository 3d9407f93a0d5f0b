use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 指标定义，属于外部维护的指标目录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricDefinition {
    pub id: i64,
    pub code: String,
    pub name: String,
    /// 适用的资产类型
    pub category: String,
    pub data_type: String,
    pub unit: Option<String>,
    /// 采集方式，与采集器协议对应
    pub collection_method: String,
    pub description: Option<String>,
    pub enabled: bool,
}

impl MetricDefinition {
    pub fn new(
        id: i64,
        code: impl Into<String>,
        category: impl Into<String>,
        collection_method: impl Into<String>,
    ) -> Self {
        let code = code.into();
        Self {
            id,
            name: code.clone(),
            code,
            category: category.into(),
            data_type: "gauge".to_string(),
            unit: None,
            collection_method: collection_method.into(),
            description: None,
            enabled: true,
        }
    }
}

/// 指标在某个协议下的采集映射
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricProtocolMapping {
    pub id: i64,
    pub metric_id: i64,
    pub protocol: String,
    /// 协议相关的取值路径，如 OID、SQL 或 JSON Pointer
    pub path: String,
    /// 可选的取值转换表达式，如 `value * 100`
    pub expression: Option<String>,
    pub parameters: serde_json::Value,
}

impl MetricProtocolMapping {
    pub fn new(metric_id: i64, protocol: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: 0,
            metric_id,
            protocol: protocol.into(),
            path: path.into(),
            expression: None,
            parameters: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }
}

/// 一个采集到的指标值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricData {
    pub task_id: i64,
    pub instance_id: i64,
    pub asset_id: i64,
    pub metric_id: i64,
    pub metric_code: String,
    pub value: f64,
    pub unit: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}
