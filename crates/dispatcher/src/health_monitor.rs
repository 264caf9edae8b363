//! 健康监控
//!
//! 每个健康检查有独立的循环任务，按各自的间隔运行探针。同一个检查的运行由
//! `run_lock` 串行化，不同检查之间并行。越过失败阈值时交给 [`IncidentManager`]。
//!
//! 故障事件以任何方式解决后，对应检查的连续失败计数归零，只有重新累计到阈值才会
//! 打开新的事件。

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use automation_core::{
    config::HealthConfig,
    models::{
        CheckStreak, HealthCheck, HealthCheckDefaults, HealthCheckRegistration, Incident,
        ResolvedBy,
    },
    traits::{HealthProbe, ProbeFactory, StateStore},
    AutomationError, AutomationResult,
};
use automation_infrastructure::MetricsCollector;

use crate::incident::IncidentManager;

#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    pub defaults: HealthCheckDefaults,
    /// 检查恢复时自动解决未关闭的故障事件
    pub auto_resolve_on_recovery: bool,
}

impl From<&HealthConfig> for MonitorConfig {
    fn from(config: &HealthConfig) -> Self {
        Self {
            defaults: config.defaults(),
            auto_resolve_on_recovery: config.auto_resolve_on_recovery,
        }
    }
}

/// 单次检查的结果
#[derive(Debug, Clone, Serialize)]
pub struct CheckRunOutcome {
    pub check_id: String,
    pub healthy: bool,
    pub error: Option<String>,
    pub consecutive_failures: u32,
    pub incident_opened: Option<Incident>,
    pub incident_resolved: Option<Incident>,
}

struct CheckEntry {
    check: HealthCheck,
    probe: Arc<dyn HealthProbe>,
    run_lock: Arc<Mutex<()>>,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

pub struct HealthMonitor {
    entries: RwLock<HashMap<String, CheckEntry>>,
    incidents: Arc<IncidentManager>,
    resolutions: Mutex<broadcast::Receiver<Incident>>,
    probe_factory: Arc<dyn ProbeFactory>,
    store: Arc<dyn StateStore>,
    config: MonitorConfig,
    metrics: Arc<MetricsCollector>,
}

impl HealthMonitor {
    pub fn new(
        incidents: Arc<IncidentManager>,
        probe_factory: Arc<dyn ProbeFactory>,
        store: Arc<dyn StateStore>,
        config: MonitorConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let resolutions = Mutex::new(incidents.subscribe_resolutions());
        Self {
            entries: RwLock::new(HashMap::new()),
            incidents,
            resolutions,
            probe_factory,
            store,
            config,
            metrics,
        }
    }

    pub fn incidents(&self) -> &Arc<IncidentManager> {
        &self.incidents
    }

    /// 注册健康检查，探针由注册请求中的探针配置构造
    pub async fn register_health_check(
        self: &Arc<Self>,
        registration: HealthCheckRegistration,
    ) -> AutomationResult<HealthCheck> {
        let check = HealthCheck::from_registration(registration, &self.config.defaults)?;
        let probe = self.probe_factory.create(&check.probe)?;
        self.install(check, probe).await
    }

    /// 使用调用方提供的探针注册健康检查
    pub async fn register_health_check_with_probe(
        self: &Arc<Self>,
        registration: HealthCheckRegistration,
        probe: Arc<dyn HealthProbe>,
    ) -> AutomationResult<HealthCheck> {
        let check = HealthCheck::from_registration(registration, &self.config.defaults)?;
        self.install(check, probe).await
    }

    async fn install(
        self: &Arc<Self>,
        check: HealthCheck,
        probe: Arc<dyn HealthProbe>,
    ) -> AutomationResult<HealthCheck> {
        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&check.id) {
                return Err(AutomationError::DuplicateHealthCheck {
                    id: check.id.clone(),
                });
            }
            let (stop_tx, stop_rx) = watch::channel(false);
            let handle = self.spawn_loop(check.id.clone(), check.interval_ms, stop_rx);
            entries.insert(
                check.id.clone(),
                CheckEntry {
                    check: check.clone(),
                    probe: Arc::clone(&probe),
                    run_lock: Arc::new(Mutex::new(())),
                    stop_tx,
                    handle: Some(handle),
                },
            );
            self.persist(&check).await;
        }

        info!(
            "注册健康检查: {} ({}, 间隔: {}ms, 超时: {}ms, 阈值: {}, 探针: {})",
            check.id,
            check.check_type,
            check.interval_ms,
            check.timeout_ms,
            check.threshold,
            probe.describe()
        );
        Ok(check)
    }

    fn spawn_loop(
        self: &Arc<Self>,
        check_id: String,
        interval_ms: u64,
        mut stop_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        let period = Duration::from_millis(interval_ms);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(monitor) = monitor.upgrade() else {
                            break;
                        };
                        match monitor.run_check_once(&check_id).await {
                            Ok(_) => {}
                            Err(AutomationError::HealthCheckNotFound { .. }) => break,
                            Err(e) => warn!("健康检查 {} 运行出错: {}", check_id, e),
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("健康检查循环已停止: {}", check_id);
        })
    }

    /// 立即运行一次检查
    pub async fn run_check_once(&self, check_id: &str) -> AutomationResult<CheckRunOutcome> {
        let (probe, run_lock, timeout_ms) = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(check_id)
                .ok_or_else(|| AutomationError::HealthCheckNotFound {
                    id: check_id.to_string(),
                })?;
            (
                Arc::clone(&entry.probe),
                Arc::clone(&entry.run_lock),
                entry.check.timeout_ms,
            )
        };

        let _run = run_lock.lock().await;
        let started = Instant::now();
        let result = match tokio::time::timeout(Duration::from_millis(timeout_ms), probe.check()).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(AutomationError::HealthCheckTimeout {
                id: check_id.to_string(),
                timeout_ms,
            }
            .to_string()),
        };
        let elapsed = started.elapsed().as_secs_f64();

        let check = {
            let mut entries = self.entries.write().await;
            let reset = self.apply_resolutions(&mut entries).await;
            for id in reset.iter().filter(|id| id.as_str() != check_id) {
                if let Some(entry) = entries.get(id) {
                    self.persist(&entry.check).await;
                }
            }

            let entry = entries
                .get_mut(check_id)
                .ok_or_else(|| AutomationError::HealthCheckNotFound {
                    id: check_id.to_string(),
                })?;
            let check = &mut entry.check;
            let now = Utc::now();
            check.last_check = Some(now);
            check.total_runs += 1;
            match &result {
                Ok(()) => {
                    check.consecutive_failures = 0;
                    check.last_success = Some(now);
                    check.last_error = None;
                }
                Err(message) => {
                    check.consecutive_failures += 1;
                    check.total_failures += 1;
                    check.last_error = Some(message.clone());
                }
            }
            let check = check.clone();
            self.persist(&check).await;
            check
        };

        self.metrics
            .record_health_check_run(&check.check_type, result.is_ok(), elapsed);

        let mut outcome = CheckRunOutcome {
            check_id: check.id.clone(),
            healthy: result.is_ok(),
            error: result.err(),
            consecutive_failures: check.consecutive_failures,
            incident_opened: None,
            incident_resolved: None,
        };

        if outcome.healthy {
            debug!("健康检查通过: {}", check.id);
            if self.config.auto_resolve_on_recovery {
                outcome.incident_resolved = self
                    .incidents
                    .resolve_open_for_check(&check.id, "健康检查已恢复正常", ResolvedBy::Automatic)
                    .await?;
            }
        } else {
            warn!(
                "健康检查失败: {} ({}/{}): {}",
                check.id,
                check.consecutive_failures,
                check.threshold,
                outcome.error.as_deref().unwrap_or("")
            );
            if check.consecutive_failures >= check.threshold {
                outcome.incident_opened = self.incidents.open_for_check(&check).await?;
            }
        }

        Ok(outcome)
    }

    /// 消化故障事件解决通知，返回连续失败计数被归零的检查ID
    async fn apply_resolutions(&self, entries: &mut HashMap<String, CheckEntry>) -> Vec<String> {
        let mut resolutions = self.resolutions.lock().await;
        let mut reset: Vec<String> = Vec::new();
        loop {
            match resolutions.try_recv() {
                Ok(incident) => {
                    let Some(entry) = entries.get_mut(&incident.health_check_id) else {
                        continue;
                    };
                    if entry.check.consecutive_failures > 0 {
                        debug!(
                            "故障事件 {} 已解决，检查 {} 重新累计连续失败",
                            incident.id, entry.check.id
                        );
                        entry.check.consecutive_failures = 0;
                        if !reset.contains(&entry.check.id) {
                            reset.push(entry.check.id.clone());
                        }
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("故障事件解决通知落后 {} 条", skipped);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        reset
    }

    /// 移除健康检查并停止其循环
    pub async fn remove_health_check(&self, check_id: &str) -> AutomationResult<HealthCheck> {
        let entry = self
            .entries
            .write()
            .await
            .remove(check_id)
            .ok_or_else(|| AutomationError::HealthCheckNotFound {
                id: check_id.to_string(),
            })?;

        let _ = entry.stop_tx.send(true);
        if let Some(handle) = entry.handle {
            let _ = handle.await;
        }
        if let Err(e) = self.store.remove_health_check(check_id).await {
            warn!("删除持久化的健康检查 {} 失败: {}", check_id, e);
        }
        info!("移除健康检查: {}", check_id);
        Ok(entry.check)
    }

    /// 人工解决故障事件，并重置对应检查的连续失败计数
    pub async fn resolve_incident(&self, incident_id: &str, resolution: &str) -> AutomationResult<Incident> {
        let incident = self
            .incidents
            .resolve_incident(incident_id, resolution)
            .await?;

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&incident.health_check_id) {
            entry.check.consecutive_failures = 0;
            let check = entry.check.clone();
            self.persist(&check).await;
        }
        Ok(incident)
    }

    pub async fn get_health_check(&self, check_id: &str) -> AutomationResult<HealthCheck> {
        self.entries
            .read()
            .await
            .get(check_id)
            .map(|entry| entry.check.clone())
            .ok_or_else(|| AutomationError::HealthCheckNotFound {
                id: check_id.to_string(),
            })
    }

    pub async fn list_health_checks(&self) -> Vec<HealthCheck> {
        let entries = self.entries.read().await;
        let mut checks: Vec<HealthCheck> = entries.values().map(|e| e.check.clone()).collect();
        checks.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        checks
    }

    pub async fn streaks(&self) -> Vec<CheckStreak> {
        self.list_health_checks()
            .await
            .iter()
            .map(CheckStreak::from)
            .collect()
    }

    /// 恢复持久化的健康检查，探针按配置重新构造
    pub async fn restore(self: &Arc<Self>, checks: Vec<HealthCheck>) {
        for check in checks {
            let id = check.id.clone();
            let probe = match self.probe_factory.create(&check.probe) {
                Ok(probe) => probe,
                Err(e) => {
                    warn!("恢复健康检查 {} 失败: {}", id, e);
                    continue;
                }
            };
            if let Err(e) = self.install(check, probe).await {
                warn!("恢复健康检查 {} 失败: {}", id, e);
            }
        }
    }

    /// 停止所有检查循环
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut entries = self.entries.write().await;
            entries
                .values_mut()
                .filter_map(|entry| {
                    let _ = entry.stop_tx.send(true);
                    entry.handle.take()
                })
                .collect()
        };
        let count = handles.len();
        join_all(handles).await;
        info!("健康监控已停止 ({} 个检查)", count);
    }

    /// 调用方持有 `entries` 写锁
    async fn persist(&self, check: &HealthCheck) {
        if let Err(e) = self.store.save_health_check(check).await {
            warn!("持久化健康检查 {} 失败 ({}): {}", check.id, self.store.name(), e);
        }
    }
}
