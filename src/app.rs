use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use collector_api::{create_app, AppState};
use collector_core::config::AppConfig;
use collector_core::traits::{InstanceRepository, RuleRepository, ScheduleRepository, TaskRepository};
use collector_core::CollectorRegistry;
use collector_dispatcher::{ScheduleAdminService, SchedulingEngine, TriggerEvaluator};
use collector_infrastructure::{create_asset_service, DatabaseManager, SqliteMetricSink};
use collector_worker::{ExecutionCoordinator, ExecutionPool, HttpJsonCollector};
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};
use tracing::{error, info, warn};

/// 执行池排空正在执行的作业的最长等待时间
const POOL_DRAIN_TIMEOUT: Duration = Duration::from_secs(20);

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 调度循环和执行池
    Scheduler,
    /// 仅运行API服务器
    Api,
    /// 运行所有组件
    All,
}

impl AppMode {
    fn runs_scheduler(self) -> bool {
        matches!(self, AppMode::Scheduler | AppMode::All)
    }

    fn runs_api(self) -> bool {
        matches!(self, AppMode::Api | AppMode::All)
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    db: DatabaseManager,
    task_repo: Arc<dyn TaskRepository>,
    schedule_repo: Arc<dyn ScheduleRepository>,
    rule_repo: Arc<dyn RuleRepository>,
    instance_repo: Arc<dyn InstanceRepository>,
    coordinator: Arc<ExecutionCoordinator>,
}

/// 已启动的组件，关闭时按顺序停止
pub struct RunningApplication {
    db: DatabaseManager,
    loops: Vec<JoinHandle<()>>,
    server: Option<JoinHandle<()>>,
    pool: Option<Arc<ExecutionPool>>,
}

impl Application {
    /// 连接实体存储并组装执行协调器
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let db = DatabaseManager::new(&config.database)
            .await
            .context("连接实体存储失败")?;

        let registry = CollectorRegistry::new();
        registry.register(Arc::new(HttpJsonCollector::new())).await;
        let registry = CollectorRegistry::install_global(registry)?;
        info!(collectors = registry.len().await, "采集器注册完成");

        let asset_service =
            create_asset_service(&config.asset_service).context("创建资产服务失败")?;
        let task_repo = db.task_repository();
        let instance_repo = db.instance_repository();

        let coordinator = Arc::new(
            ExecutionCoordinator::new(
                registry,
                task_repo.clone(),
                instance_repo.clone(),
                db.metric_catalog_repository(),
                asset_service,
                Arc::new(SqliteMetricSink::new(db.pool().clone())),
            )
            .with_config(config.executor.clone()),
        );

        Ok(Self {
            schedule_repo: db.schedule_repository(),
            rule_repo: db.rule_repository(),
            task_repo,
            instance_repo,
            coordinator,
            config,
            mode,
            db,
        })
    }

    /// 按运行模式启动调度循环和API服务器
    pub async fn start(self, shutdown: &broadcast::Sender<()>) -> Result<RunningApplication> {
        info!("启动应用程序，模式: {:?}", self.mode);

        let mut running = RunningApplication {
            loops: Vec::new(),
            server: None,
            pool: None,
            db: self.db,
        };

        let evaluator = if self.mode.runs_scheduler() {
            let pool = Arc::new(ExecutionPool::start(
                self.coordinator.clone(),
                &self.config.executor,
            ));
            let engine = SchedulingEngine::new(
                self.config.scheduler.clone(),
                self.task_repo.clone(),
                self.schedule_repo.clone(),
                self.rule_repo.clone(),
                pool.clone(),
            );
            running.loops = engine.start(shutdown);
            running.pool = Some(pool);
            engine.evaluator()
        } else {
            Arc::new(TriggerEvaluator::new(self.config.scheduler.cron_lookback()))
        };

        if self.mode.runs_api() {
            if !self.config.api.enabled {
                warn!("API服务器已在配置中禁用");
            } else {
                let admin = Arc::new(ScheduleAdminService::new(
                    self.task_repo,
                    self.schedule_repo,
                    self.rule_repo,
                    self.coordinator.clone(),
                    evaluator,
                ));
                let state = AppState {
                    admin,
                    instance_repo: self.instance_repo,
                    coordinator: self.coordinator,
                };
                running.server = Some(
                    spawn_api_server(&self.config, state, shutdown.subscribe()).await?,
                );
            }
        }

        Ok(running)
    }
}

async fn spawn_api_server(
    config: &AppConfig,
    state: AppState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<JoinHandle<()>> {
    let app = create_app(state, &config.api);

    let listener = TcpListener::bind(&config.api.bind_address)
        .await
        .with_context(|| format!("绑定地址失败: {}", config.api.bind_address))?;

    info!("API服务器启动在 http://{}", config.api.bind_address);

    Ok(tokio::spawn(async move {
        let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("API服务器收到关闭信号");
        });
        if let Err(e) = graceful.await {
            error!("API服务器运行失败: {}", e);
        }
    }))
}

impl RunningApplication {
    /// 等待所有组件在关闭信号后退出
    pub async fn stop(self) {
        for handle in self.loops {
            if let Err(e) = handle.await {
                error!("调度循环退出异常: {e}");
            }
        }

        if let Some(server) = self.server {
            if let Err(e) = server.await {
                error!("API服务器退出异常: {e}");
            }
            info!("API服务器已停止");
        }

        if let Some(pool) = self.pool {
            pool.shutdown(POOL_DRAIN_TIMEOUT).await;
        }

        self.db.close().await;
        info!("所有组件已停止");
    }
}
