use std::sync::Arc;

use anyhow::{Context, Result};
use automation_api::{create_app, AppState};
use automation_core::{config::AppConfig, traits::StateStore};
use automation_dispatcher::{
    create_classification_policy, create_strategy, ActionPlanEngine, EngineConfig, HealthMonitor,
    IncidentManager, MetricsAggregator, MonitorConfig, PlanRemediation, TaskScheduler,
    TemplateRegistry,
};
use automation_infrastructure::{
    DefaultProbeFactory, InMemoryStore, JsonFileStore, MetricsCollector, StepExecutorRegistry,
};
use axum::Router;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{info, warn};

/// 主应用程序，负责组装各组件并运行HTTP服务
pub struct Application {
    config: AppConfig,
    scheduler: Arc<TaskScheduler>,
    engine: Arc<ActionPlanEngine>,
    monitor: Arc<HealthMonitor>,
    incidents: Arc<IncidentManager>,
    aggregator: Arc<MetricsAggregator>,
}

impl Application {
    /// 创建新的应用实例
    ///
    /// 依次完成：打开存储并读取快照、恢复各组件状态、预注册Worker、
    /// 校验行动计划模板、按配置启用自动修复。
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = create_store(&config).await?;
        let snapshot = store.load_snapshot().await.context("读取状态快照失败")?;
        if !snapshot.is_empty() {
            info!(
                "从存储恢复状态: {} 个Worker, {} 个任务, {} 个行动计划, {} 个健康检查, {} 个故障事件",
                snapshot.workers.len(),
                snapshot.tasks.len(),
                snapshot.plans.len(),
                snapshot.health_checks.len(),
                snapshot.incidents.len()
            );
        }

        let metrics = Arc::new(MetricsCollector::new());

        let strategy = create_strategy(&config.scheduler.dispatch_strategy)?;
        let classification = create_classification_policy(&config.scheduler.classification)?;
        let scheduler = Arc::new(
            TaskScheduler::new(Arc::clone(&store), Arc::clone(&metrics))
                .with_strategy(strategy)
                .with_classification_policy(classification),
        );
        scheduler.restore(snapshot.workers, snapshot.tasks).await;
        for registration in config.scheduler.seed_workers.iter().cloned() {
            if scheduler.get_worker(&registration.id).await.is_ok() {
                continue;
            }
            scheduler
                .register_worker(registration)
                .await
                .context("预注册Worker失败")?;
        }

        let mut templates = TemplateRegistry::with_builtin()?;
        for template in config.action_plans.templates.iter().cloned() {
            templates
                .register(template)
                .context("注册行动计划模板失败")?;
        }
        templates
            .validate_dependencies()
            .context("行动计划模板依赖校验失败")?;

        let engine = Arc::new(ActionPlanEngine::new(
            templates,
            Arc::clone(&scheduler),
            Arc::new(StepExecutorRegistry::with_defaults()),
            Arc::clone(&store),
            EngineConfig::from(&config.action_plans),
            Arc::clone(&metrics),
        ));
        engine.restore(snapshot.plans).await;
        engine.start_deferred_sweep().await;

        let mut incidents = IncidentManager::new(Arc::clone(&store), Arc::clone(&metrics));
        if config.remediation.enabled {
            let remediation =
                PlanRemediation::new(Arc::clone(&engine), config.remediation.templates.clone())?;
            incidents = incidents.with_remediation(Arc::new(remediation));
            info!(
                "已启用自动修复，覆盖 {} 种检查类型",
                config.remediation.templates.len()
            );
        }
        let incidents = Arc::new(incidents);
        incidents.restore(snapshot.incidents).await;

        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&incidents),
            Arc::new(DefaultProbeFactory::new()),
            store,
            MonitorConfig::from(&config.health),
            metrics,
        ));
        monitor.restore(snapshot.health_checks).await;

        let aggregator = Arc::new(MetricsAggregator::new(
            Arc::clone(&scheduler),
            Arc::clone(&engine),
            Arc::clone(&monitor),
            Arc::clone(&incidents),
        ));

        info!(
            "应用初始化完成，调度策略: {}",
            scheduler.strategy_name()
        );

        Ok(Self {
            config,
            scheduler,
            engine,
            monitor,
            incidents,
            aggregator,
        })
    }

    pub fn state(&self) -> AppState {
        AppState {
            scheduler: Arc::clone(&self.scheduler),
            engine: Arc::clone(&self.engine),
            monitor: Arc::clone(&self.monitor),
            incidents: Arc::clone(&self.incidents),
            aggregator: Arc::clone(&self.aggregator),
            api_config: Arc::new(self.config.api.clone()),
        }
    }

    pub fn router(&self) -> Router {
        create_app(self.state())
    }

    /// 运行应用程序，收到关闭信号后停止HTTP服务和所有健康检查循环
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if self.config.api.enabled {
            let bind_address = &self.config.api.bind_address;
            let listener = TcpListener::bind(bind_address)
                .await
                .with_context(|| format!("绑定API地址失败: {bind_address}"))?;
            info!("API服务器监听: {}", bind_address);

            axum::serve(listener, self.router())
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                    info!("API服务器收到关闭信号");
                })
                .await
                .context("API服务器运行失败")?;
        } else {
            warn!("API服务已禁用，仅运行后台任务");
            let _ = shutdown_rx.recv().await;
        }

        self.monitor.shutdown().await;
        self.engine.shutdown().await;
        info!("所有组件已停止");
        Ok(())
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn engine(&self) -> &Arc<ActionPlanEngine> {
        &self.engine
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn incidents(&self) -> &Arc<IncidentManager> {
        &self.incidents
    }
}

async fn create_store(config: &AppConfig) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.storage.backend.as_str() {
        "json_file" => Arc::new(
            JsonFileStore::open(&config.storage.path)
                .await
                .with_context(|| format!("打开状态文件失败: {}", config.storage.path))?,
        ),
        _ => Arc::new(InMemoryStore::new()),
    };
    info!("状态存储: {}", store.name());
    Ok(store)
}
