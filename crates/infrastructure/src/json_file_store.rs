use std::path::{Path, PathBuf};

use async_trait::async_trait;
use automation_core::{
    models::{ActionPlan, HealthCheck, Incident, StateSnapshot, Task, Worker},
    traits::StateStore,
    AutomationError, AutomationResult,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::in_memory_store::StateTables;

/// JSON文件状态存储
///
/// 所有实体保存在同一个快照文件中。每次写入先写临时文件再重命名，
/// 进程中途崩溃时旧文件保持完整。
pub struct JsonFileStore {
    path: PathBuf,
    tables: Mutex<StateTables>,
}

impl JsonFileStore {
    /// 打开快照文件，不存在时以空状态开始
    pub async fn open(path: impl AsRef<Path>) -> AutomationResult<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => StateSnapshot::default(),
            Ok(bytes) => serde_json::from_slice::<StateSnapshot>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("状态文件不存在，使用空状态: {}", path.display());
                StateSnapshot::default()
            }
            Err(e) => {
                return Err(AutomationError::Storage(format!(
                    "读取状态文件 {} 失败: {e}",
                    path.display()
                )))
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AutomationError::Storage(format!("创建目录 {} 失败: {e}", parent.display()))
            })?;
        }

        Ok(Self {
            path,
            tables: Mutex::new(StateTables::from_snapshot(snapshot)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn update<F>(&self, apply: F) -> AutomationResult<()>
    where
        F: FnOnce(&mut StateTables),
    {
        let mut tables = self.tables.lock().await;
        apply(&mut tables);
        let bytes = serde_json::to_vec_pretty(&tables.to_snapshot())?;
        self.write_atomically(&bytes).await?;
        debug!("状态快照已写入: {}", self.path.display());
        Ok(())
    }

    async fn write_atomically(&self, bytes: &[u8]) -> AutomationResult<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, bytes).await.map_err(|e| {
            AutomationError::Storage(format!("写入临时文件 {} 失败: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| {
                AutomationError::Storage(format!(
                    "替换状态文件 {} 失败: {e}",
                    self.path.display()
                ))
            })
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn save_worker(&self, worker: &Worker) -> AutomationResult<()> {
        self.update(|t| {
            t.workers.insert(worker.id.clone(), worker.clone());
        })
        .await
    }

    async fn save_task(&self, task: &Task) -> AutomationResult<()> {
        self.update(|t| {
            t.tasks.insert(task.id.clone(), task.clone());
        })
        .await
    }

    async fn save_plan(&self, plan: &ActionPlan) -> AutomationResult<()> {
        self.update(|t| {
            t.plans.insert(plan.id.clone(), plan.clone());
        })
        .await
    }

    async fn save_health_check(&self, check: &HealthCheck) -> AutomationResult<()> {
        self.update(|t| {
            t.health_checks.insert(check.id.clone(), check.clone());
        })
        .await
    }

    async fn remove_health_check(&self, id: &str) -> AutomationResult<()> {
        self.update(|t| {
            t.health_checks.remove(id);
        })
        .await
    }

    async fn save_incident(&self, incident: &Incident) -> AutomationResult<()> {
        self.update(|t| {
            t.incidents.insert(incident.id.clone(), incident.clone());
        })
        .await
    }

    async fn load_snapshot(&self) -> AutomationResult<StateSnapshot> {
        Ok(self.tables.lock().await.to_snapshot())
    }

    fn name(&self) -> &str {
        "json_file"
    }
}
