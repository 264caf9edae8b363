//! 故障事件管理
//!
//! 每个健康检查最多只有一个未解决的故障事件。打开事件和检查是否已有未解决事件
//! 在同一把写锁下完成，因此越过阈值只会触发一次。持久化同样在写锁内进行。
//!
//! 无论人工、恢复还是修复计划解决事件，都会通过 [`IncidentManager::subscribe_resolutions`]
//! 广播，健康监控据此重新开始累计连续失败。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use automation_core::{
    models::{HealthCheck, Incident, IncidentFilter, IncidentStats, IncidentStatus, ResolvedBy},
    traits::{RemediationHook, RemediationOutcome, StateStore},
    AutomationError, AutomationResult,
};
use automation_infrastructure::MetricsCollector;

const RESOLUTION_EVENT_CAPACITY: usize = 256;

#[derive(Default)]
struct IncidentTable {
    by_id: HashMap<String, Incident>,
    /// health_check_id -> 未解决的incident id
    open_by_check: HashMap<String, String>,
}

impl IncidentTable {
    fn resolve(
        &mut self,
        incident_id: &str,
        resolution: &str,
        resolved_by: ResolvedBy,
    ) -> AutomationResult<Incident> {
        let incident = self
            .by_id
            .get_mut(incident_id)
            .ok_or_else(|| AutomationError::IncidentNotFound {
                id: incident_id.to_string(),
            })?;
        if !incident.is_open() {
            return Err(AutomationError::AlreadyResolved {
                id: incident_id.to_string(),
            });
        }

        incident.status = IncidentStatus::Resolved;
        incident.resolved_at = Some(Utc::now());
        incident.resolution = Some(resolution.to_string());
        incident.resolved_by = Some(resolved_by);
        let resolved = incident.clone();
        self.open_by_check.remove(&resolved.health_check_id);
        Ok(resolved)
    }
}

fn resolved_by_label(resolved_by: ResolvedBy) -> &'static str {
    match resolved_by {
        ResolvedBy::Manual => "manual",
        ResolvedBy::Automatic => "automatic",
    }
}

pub struct IncidentManager {
    table: RwLock<IncidentTable>,
    remediation: Option<Arc<dyn RemediationHook>>,
    resolutions: broadcast::Sender<Incident>,
    store: Arc<dyn StateStore>,
    metrics: Arc<MetricsCollector>,
}

impl IncidentManager {
    pub fn new(store: Arc<dyn StateStore>, metrics: Arc<MetricsCollector>) -> Self {
        let (resolutions, _) = broadcast::channel(RESOLUTION_EVENT_CAPACITY);
        Self {
            table: RwLock::new(IncidentTable::default()),
            remediation: None,
            resolutions,
            store,
            metrics,
        }
    }

    pub fn with_remediation(mut self, hook: Arc<dyn RemediationHook>) -> Self {
        self.remediation = Some(hook);
        self
    }

    /// 订阅故障事件解决通知
    pub fn subscribe_resolutions(&self) -> broadcast::Receiver<Incident> {
        self.resolutions.subscribe()
    }

    /// 为健康检查打开故障事件；已有未解决事件时返回None
    ///
    /// 配置了修复钩子时，在释放锁之后派生任务执行修复。
    pub async fn open_for_check(self: &Arc<Self>, check: &HealthCheck) -> AutomationResult<Option<Incident>> {
        let incident = {
            let mut table = self.table.write().await;
            if let Some(existing) = table.open_by_check.get(&check.id) {
                debug!("健康检查 {} 已有未解决的故障事件 {}", check.id, existing);
                return Ok(None);
            }
            let incident = Incident::for_check(check);
            table
                .open_by_check
                .insert(check.id.clone(), incident.id.clone());
            table.by_id.insert(incident.id.clone(), incident.clone());
            self.metrics.set_open_incidents(table.open_by_check.len());
            self.persist(&incident).await;
            incident
        };

        warn!(
            "打开故障事件: {} (检查: {}, 严重程度: {}, 连续失败: {})",
            incident.id, check.id, incident.severity, incident.consecutive_failures
        );
        self.metrics.record_incident_opened(incident.severity.as_str());

        if let Some(hook) = &self.remediation {
            let manager = Arc::clone(self);
            let hook = Arc::clone(hook);
            let opened = incident.clone();
            tokio::spawn(async move {
                info!("触发修复: {} (钩子: {})", opened.id, hook.name());
                let outcome = hook.remediate(&opened).await;
                manager.apply_remediation(&opened.id, outcome).await;
            });
        }

        Ok(Some(incident))
    }

    async fn apply_remediation(&self, incident_id: &str, outcome: RemediationOutcome) {
        let mut table = self.table.write().await;
        let updated = match outcome {
            RemediationOutcome::Skipped => {
                debug!("故障事件 {} 没有适用的修复计划", incident_id);
                return;
            }
            RemediationOutcome::Resolved {
                resolution,
                plan_id,
            } => {
                if let Some(incident) = table.by_id.get_mut(incident_id) {
                    incident.remediation_plan_id = plan_id;
                }
                match table.resolve(incident_id, &resolution, ResolvedBy::Automatic) {
                    Ok(resolved) => {
                        info!("故障事件 {} 已由修复计划自动解决", incident_id);
                        self.metrics
                            .record_incident_resolved(resolved_by_label(ResolvedBy::Automatic));
                        let _ = self.resolutions.send(resolved.clone());
                        Some(resolved)
                    }
                    Err(e) => {
                        debug!("修复完成但故障事件未更新: {}", e);
                        table.by_id.get(incident_id).cloned()
                    }
                }
            }
            RemediationOutcome::Escalated { reason, plan_id } => {
                warn!("故障事件 {} 修复失败，升级处理: {}", incident_id, reason);
                table.by_id.get_mut(incident_id).map(|incident| {
                    incident.remediation_plan_id = plan_id;
                    incident.escalated = true;
                    incident.clone()
                })
            }
        };

        if let Some(incident) = updated {
            self.metrics.set_open_incidents(table.open_by_check.len());
            self.persist(&incident).await;
        }
    }

    /// 人工解决故障事件
    pub async fn resolve_incident(&self, incident_id: &str, resolution: &str) -> AutomationResult<Incident> {
        if resolution.trim().is_empty() {
            return Err(AutomationError::missing_field("resolution"));
        }
        self.resolve(incident_id, resolution, ResolvedBy::Manual)
            .await
    }

    /// 解决某个检查当前未解决的故障事件，没有时返回None
    pub async fn resolve_open_for_check(
        &self,
        check_id: &str,
        resolution: &str,
        resolved_by: ResolvedBy,
    ) -> AutomationResult<Option<Incident>> {
        let open = self.table.read().await.open_by_check.get(check_id).cloned();
        match open {
            Some(incident_id) => match self.resolve(&incident_id, resolution, resolved_by).await {
                Ok(incident) => Ok(Some(incident)),
                // 并发解决时以先到者为准
                Err(AutomationError::AlreadyResolved { .. }) => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    async fn resolve(
        &self,
        incident_id: &str,
        resolution: &str,
        resolved_by: ResolvedBy,
    ) -> AutomationResult<Incident> {
        let resolved = {
            let mut table = self.table.write().await;
            let resolved = table.resolve(incident_id, resolution, resolved_by)?;
            self.metrics.set_open_incidents(table.open_by_check.len());
            self.persist(&resolved).await;
            resolved
        };

        info!(
            "故障事件已解决: {} (检查: {}, 方式: {})",
            resolved.id,
            resolved.health_check_id,
            resolved_by_label(resolved_by)
        );
        self.metrics
            .record_incident_resolved(resolved_by_label(resolved_by));
        let _ = self.resolutions.send(resolved.clone());
        Ok(resolved)
    }

    pub async fn get_incident(&self, incident_id: &str) -> AutomationResult<Incident> {
        self.table
            .read()
            .await
            .by_id
            .get(incident_id)
            .cloned()
            .ok_or_else(|| AutomationError::IncidentNotFound {
                id: incident_id.to_string(),
            })
    }

    pub async fn get_active_incidents(&self) -> Vec<Incident> {
        self.list_incidents(&IncidentFilter {
            status: Some(IncidentStatus::Open),
            ..Default::default()
        })
        .await
    }

    pub async fn list_incidents(&self, filter: &IncidentFilter) -> Vec<Incident> {
        let table = self.table.read().await;
        let mut incidents: Vec<Incident> = table
            .by_id
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        incidents.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
        incidents
    }

    pub async fn stats(&self) -> IncidentStats {
        let table = self.table.read().await;
        let mut stats = IncidentStats {
            total: table.by_id.len(),
            active: table.open_by_check.len(),
            ..Default::default()
        };

        let mut recovery_total = 0i64;
        let mut recovered = 0usize;
        for incident in table.by_id.values() {
            match incident.resolved_by {
                Some(ResolvedBy::Automatic) => stats.auto_resolved += 1,
                Some(ResolvedBy::Manual) => stats.manual_resolved += 1,
                None => {}
            }
            if incident.escalated {
                stats.escalated += 1;
            }
            if let Some(ms) = incident.recovery_time_ms() {
                recovery_total += ms;
                recovered += 1;
            }
        }
        if recovered > 0 {
            stats.average_recovery_time_ms = recovery_total as f64 / recovered as f64;
        }
        stats
    }

    pub async fn restore(&self, incidents: Vec<Incident>) {
        let mut table = self.table.write().await;
        for incident in incidents {
            if incident.is_open() {
                table
                    .open_by_check
                    .insert(incident.health_check_id.clone(), incident.id.clone());
            }
            table.by_id.insert(incident.id.clone(), incident);
        }
        self.metrics.set_open_incidents(table.open_by_check.len());
        info!(
            "恢复故障事件: {} 个, 未解决 {} 个",
            table.by_id.len(),
            table.open_by_check.len()
        );
    }

    async fn persist(&self, incident: &Incident) {
        if let Err(e) = self.store.save_incident(incident).await {
            warn!("持久化故障事件 {} 失败 ({}): {}", incident.id, self.store.name(), e);
        }
    }
}
