//! 执行协调器
//!
//! 定时调度和"立即执行"走同一条路径：
//!
//! 1. 创建并保存运行中的采集实例
//! 2. 按 (协议, 资产类型) 匹配采集器
//! 3. 解析资产信息、连接参数、指标定义和协议映射，构建采集上下文
//! 4. 调用采集器，panic 和超时都在这里被拦截
//! 5. 发送指标数据，按采集结果结束实例
//! 6. 无论结果如何都回写任务的最近执行时间和状态

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use metrics::{counter, histogram};
use tracing::{debug, error, info, instrument, warn};

use collector_core::config::ExecutorConfig;
use collector_core::models::{
    CollectionContext, CollectionResult, CollectorTask, ConnectionParams, ConnectionTestResult,
    InstanceOutcome, TaskInstance, Trigger,
};
use collector_core::traits::{
    AssetService, CollectionExecutor, InstanceRepository, MetricCatalogRepository, MetricSink,
    TaskRepository,
};
use collector_core::{CollectorRegistry, SchedulerError, SchedulerResult};

pub struct ExecutionCoordinator {
    registry: Arc<CollectorRegistry>,
    task_repo: Arc<dyn TaskRepository>,
    instance_repo: Arc<dyn InstanceRepository>,
    metric_catalog: Arc<dyn MetricCatalogRepository>,
    asset_service: Arc<dyn AssetService>,
    metric_sink: Arc<dyn MetricSink>,
    config: ExecutorConfig,
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<CollectorRegistry>,
        task_repo: Arc<dyn TaskRepository>,
        instance_repo: Arc<dyn InstanceRepository>,
        metric_catalog: Arc<dyn MetricCatalogRepository>,
        asset_service: Arc<dyn AssetService>,
        metric_sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            registry,
            task_repo,
            instance_repo,
            metric_catalog,
            asset_service,
            metric_sink,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<CollectorRegistry> {
        &self.registry
    }

    /// 使用最适合的采集器测试连接，采集器 panic 时返回失败结果
    pub async fn test_connection(
        &self,
        protocol: &str,
        asset_type: &str,
        params: &ConnectionParams,
    ) -> ConnectionTestResult {
        let test = self.registry.test_connection(protocol, asset_type, params);
        match AssertUnwindSafe(test).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(protocol, asset_type, error = %message, "连接测试时采集器发生panic");
                ConnectionTestResult::failure("连接测试异常", Some(message))
            }
        }
    }

    /// 步骤 2-4，任何错误都会转换为失败的实例
    async fn run_collection(
        &self,
        task: &CollectorTask,
        instance_id: i64,
    ) -> SchedulerResult<CollectionResult> {
        if !task.is_enabled() {
            return Err(SchedulerError::TaskDisabled { id: task.id });
        }

        let collector = self
            .registry
            .find_best_collector(&task.protocol, &task.task_type)
            .await
            .ok_or_else(|| SchedulerError::CollectorNotFound {
                protocol: task.protocol.clone(),
                asset_type: task.task_type.clone(),
            })?;

        let mut context = self.build_context(task, instance_id).await?;
        debug!(
            task_id = task.id,
            instance_id,
            collector = collector.name(),
            metric_count = context.metrics.len(),
            "开始调用采集器"
        );

        let invocation = AssertUnwindSafe(collector.collect(&mut context)).catch_unwind();
        let outcome = match self.config.collect_timeout(task.interval_seconds) {
            Some(limit) => tokio::time::timeout(limit, invocation).await.map_err(|_| {
                SchedulerError::CollectTimeout {
                    seconds: limit.as_secs(),
                }
            })?,
            None => invocation.await,
        };

        outcome.map_err(|panic| SchedulerError::CollectorPanicked(panic_message(panic.as_ref())))?
    }

    async fn build_context(
        &self,
        task: &CollectorTask,
        instance_id: i64,
    ) -> SchedulerResult<CollectionContext> {
        let asset = self
            .asset_service
            .get_asset_basic_info(task.asset_id)
            .await?
            .ok_or(SchedulerError::AssetNotFound { id: task.asset_id })?;

        let metric_ids = task.metric_ids()?;
        if metric_ids.is_empty() {
            return Err(SchedulerError::Configuration("没有配置采集指标".to_string()));
        }

        let metrics = self.metric_catalog.get_definitions(&metric_ids).await?;
        if metrics.len() < metric_ids.len() {
            warn!(
                task_id = task.id,
                configured = metric_ids.len(),
                loaded = metrics.len(),
                "部分指标不存在或已停用"
            );
        }

        let protocol_mappings = self
            .metric_catalog
            .get_mappings(&metric_ids, &task.protocol)
            .await?
            .into_iter()
            .map(|mapping| (mapping.metric_id, mapping))
            .collect();

        // 任务上的参数逐项覆盖资产服务提供的参数
        let mut connection_params = self
            .asset_service
            .get_asset_connection_params(task.asset_id, &task.protocol)
            .await?;
        connection_params.extend(task.connection_param_map());

        Ok(CollectionContext {
            task_id: task.id,
            instance_id,
            asset,
            metrics,
            protocol_mappings,
            connection_params,
            variables: HashMap::new(),
        })
    }

    /// 步骤 5：转发指标数据，把采集结果转换为实例结果
    async fn record_result(
        &self,
        task: &CollectorTask,
        instance_id: i64,
        result: CollectionResult,
    ) -> InstanceOutcome {
        // 采集器自行构造的结果不一定经过 complete
        let result = result.reconciled(Utc::now());
        if result.fail_count > 0 {
            counter!("collector_metric_errors_total").increment(result.fail_count as u64);
        }

        if !result.metric_data.is_empty() {
            if let Err(e) = self
                .metric_sink
                .send_metric_data_batch(&result.metric_data)
                .await
            {
                error!(task_id = task.id, instance_id, error = %e, "发送指标数据失败");
            }
        }

        let end_time = result.end_time.unwrap_or_else(Utc::now);
        if result.success {
            if result.fail_count > 0 {
                warn!(
                    task_id = task.id,
                    instance_id,
                    success_count = result.success_count,
                    fail_count = result.fail_count,
                    errors = %result.error_summary(),
                    "部分指标采集失败"
                );
            }
            InstanceOutcome::success(end_time, result.metric_data.len() as i64)
        } else {
            let message = result
                .error_message
                .unwrap_or_else(|| "采集失败".to_string());
            InstanceOutcome::failure(
                end_time,
                SchedulerError::MetricCollection(message).instance_message(),
            )
        }
    }

    /// 步骤 6，这里的持久化错误只记录日志
    async fn finalize(&self, task: &CollectorTask, instance_id: i64, outcome: &InstanceOutcome) {
        match self.instance_repo.finish(instance_id, outcome).await {
            Ok(instance) => {
                if let Err(e) = self.metric_sink.send_collection_status(&instance).await {
                    warn!(task_id = task.id, instance_id, error = %e, "发送采集状态失败");
                }
            }
            Err(e) => error!(task_id = task.id, instance_id, error = %e, "结束采集实例失败"),
        }

        if let Err(e) = self
            .task_repo
            .update_last_execution(task.id, outcome.end_time, outcome.status)
            .await
        {
            error!(task_id = task.id, error = %e, "更新任务最近执行状态失败");
        }
    }
}

#[async_trait]
impl CollectionExecutor for ExecutionCoordinator {
    #[instrument(skip(self, task), fields(task_id = task.id, source = %trigger.source))]
    async fn execute(&self, task: &CollectorTask, trigger: Trigger) -> SchedulerResult<i64> {
        // 调度产生的作业在排队期间任务可能已被禁用，重新读取后再决定是否执行
        let latest;
        let task = if trigger.is_scheduled() {
            latest = self
                .task_repo
                .get_by_id(task.id)
                .await?
                .ok_or(SchedulerError::TaskNotFound { id: task.id })?;
            if !latest.is_enabled() {
                info!(task_id = latest.id, "任务已禁用，丢弃调度作业");
                return Err(SchedulerError::TaskDisabled { id: latest.id });
            }
            &latest
        } else {
            task
        };

        let started = Instant::now();
        let instance = self
            .instance_repo
            .create(&TaskInstance::start(
                task.id,
                task.asset_id,
                &trigger,
                Utc::now(),
            ))
            .await?;

        let outcome = match self.run_collection(task, instance.id).await {
            Ok(result) => self.record_result(task, instance.id, result).await,
            Err(e) => {
                warn!(
                    task_id = task.id,
                    instance_id = instance.id,
                    kind = e.kind().label(),
                    error = %e,
                    "采集执行失败"
                );
                InstanceOutcome::failure(Utc::now(), e.instance_message())
            }
        };

        self.finalize(task, instance.id, &outcome).await;

        counter!("collector_executions_total", "status" => outcome.status.as_str()).increment(1);
        histogram!("collector_execution_duration_seconds").record(started.elapsed().as_secs_f64());

        info!(
            task_id = task.id,
            instance_id = instance.id,
            status = %outcome.status,
            data_points = outcome.data_point_count,
            "采集任务执行完成"
        );
        Ok(instance.id)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知的panic".to_string()
    }
}
