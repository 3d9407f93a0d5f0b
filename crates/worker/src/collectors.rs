use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::RequestBuilder;
use tracing::{error, info, warn};

use collector_core::metric_value::collect_metrics;
use collector_core::models::{
    CollectionContext, CollectionResult, ConnectionParams, ConnectionTestResult,
};
use collector_core::traits::MetricCollector;
use collector_core::{SchedulerError, SchedulerResult};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// HTTP/JSON 采集器
///
/// 请求 `url` 连接参数指向的接口，把响应体解析为 JSON，
/// 再按每个指标协议映射的路径取值。
///
/// # 连接参数
///
/// - `url`: 必填
/// - `method`: `GET`（默认）或 `POST`
/// - `headers`: 请求头对象
/// - `body`: POST 请求体
/// - `timeout_seconds`: 请求超时，默认30秒
///
/// 映射路径可以是 JSON Pointer（`/data/cpu/0`），也可以是点分路径（`data.cpu.0`）。
pub struct HttpJsonCollector {
    client: reqwest::Client,
}

impl HttpJsonCollector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn build_request(&self, params: &ConnectionParams) -> SchedulerResult<RequestBuilder> {
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchedulerError::Configuration("连接参数缺少url".to_string()))?;
        let method = params
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET");

        let mut request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            _ => {
                return Err(SchedulerError::Configuration(format!(
                    "不支持的HTTP方法: {method}"
                )))
            }
        };

        let timeout_seconds = params
            .get("timeout_seconds")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        request = request.timeout(Duration::from_secs(timeout_seconds));

        if let Some(headers) = params.get("headers").and_then(|v| v.as_object()) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key.as_str(), value);
                }
            }
        }

        if let Some(body) = params.get("body") {
            request = match body {
                serde_json::Value::String(text) => request.body(text.clone()),
                other => request.json(other),
            };
        }

        Ok(request)
    }
}

impl Default for HttpJsonCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// 把点分路径转换为 JSON Pointer
fn to_pointer(path: &str) -> String {
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path.replace('.', "/"))
    }
}

#[async_trait]
impl MetricCollector for HttpJsonCollector {
    fn name(&self) -> &str {
        "http-json"
    }

    fn protocol(&self) -> &str {
        "http"
    }

    fn supported_asset_types(&self) -> Vec<String> {
        vec![
            "server".to_string(),
            "application".to_string(),
            "middleware".to_string(),
        ]
    }

    async fn collect(&self, context: &mut CollectionContext) -> SchedulerResult<CollectionResult> {
        let start_time = Utc::now();
        let request = self.build_request(&context.connection_params)?;

        let response = request.send().await.map_err(|e| {
            error!(task_id = context.task_id, error = %e, "HTTP采集请求失败");
            SchedulerError::TransientIo(format!("HTTP请求失败: {e}"))
        })?;

        let status_code = response.status().as_u16();
        if !response.status().is_success() {
            return Err(SchedulerError::TransientIo(format!(
                "HTTP请求失败，状态码: {status_code}"
            )));
        }

        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(task_id = context.task_id, error = %e, "HTTP响应不是有效的JSON");
                return Ok(CollectionResult::failure(
                    start_time,
                    format!("响应不是有效的JSON: {e}"),
                ));
            }
        };

        let mut result = CollectionResult::started(start_time);
        collect_metrics(context, &mut result, |_, mapping| {
            body.pointer(&to_pointer(&mapping.path))
                .cloned()
                .ok_or_else(|| format!("JSON路径不存在: {}", mapping.path))
        });
        result
            .ext_info
            .insert("http_status".to_string(), serde_json::json!(status_code));

        let result = result.complete(Utc::now());
        info!(
            task_id = context.task_id,
            instance_id = context.instance_id,
            status = status_code,
            success_count = result.success_count,
            fail_count = result.fail_count,
            "HTTP采集完成"
        );
        Ok(result)
    }

    async fn test_connection(
        &self,
        _asset_type: &str,
        params: &ConnectionParams,
    ) -> ConnectionTestResult {
        let request = match self.build_request(params) {
            Ok(request) => request,
            Err(e) => return ConnectionTestResult::failure("连接参数无效", Some(e.to_string())),
        };

        let started = Instant::now();
        match request.send().await {
            Ok(response) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                let status_code = response.status().as_u16();
                let result = if response.status().is_success() {
                    ConnectionTestResult::success("连接成功")
                } else {
                    ConnectionTestResult::failure(format!("HTTP状态码: {status_code}"), None)
                };
                result
                    .with_detail("status", serde_json::json!(status_code))
                    .with_latency(latency_ms)
            }
            Err(e) => ConnectionTestResult::failure("连接失败", Some(e.to_string()))
                .with_latency(started.elapsed().as_millis() as u64),
        }
    }
}
