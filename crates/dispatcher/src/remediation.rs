use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use automation_core::{
    models::Incident,
    traits::{RemediationHook, RemediationOutcome},
    AutomationError, AutomationResult,
};

use crate::action_plan::ActionPlanEngine;

/// 按检查类型选择行动计划模板进行修复
///
/// 只尝试一次；计划失败时由人工决定是否重试。
pub struct PlanRemediation {
    engine: Arc<ActionPlanEngine>,
    /// check_type -> template_id
    templates: HashMap<String, String>,
}

impl PlanRemediation {
    /// 映射中的模板必须已注册
    pub fn new(
        engine: Arc<ActionPlanEngine>,
        templates: HashMap<String, String>,
    ) -> AutomationResult<Self> {
        for (check_type, template_id) in &templates {
            if !engine.templates().contains(template_id) {
                return Err(AutomationError::Configuration(format!(
                    "检查类型 {check_type} 的修复模板不存在: {template_id}"
                )));
            }
        }
        Ok(Self { engine, templates })
    }
}

#[async_trait]
impl RemediationHook for PlanRemediation {
    async fn remediate(&self, incident: &Incident) -> RemediationOutcome {
        let Some(template_id) = self.templates.get(&incident.check_type) else {
            debug!("检查类型 {} 没有配置修复模板", incident.check_type);
            return RemediationOutcome::Skipped;
        };

        let data = json!({
            "incident_id": incident.id,
            "health_check_id": incident.health_check_id,
            "check_name": incident.check_name,
            "check_type": incident.check_type,
            "severity": incident.severity,
            "last_error": incident.last_error,
        });
        let plan = match self.engine.create_action_plan(template_id, data).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("为故障事件 {} 创建修复计划失败: {}", incident.id, e);
                return RemediationOutcome::Escalated {
                    reason: e.to_string(),
                    plan_id: None,
                };
            }
        };

        info!(
            "执行修复计划: {} (模板: {}, 故障事件: {})",
            plan.id, template_id, incident.id
        );
        match self.engine.execute_action_plan(&plan.id).await {
            Ok(result) if result.success => RemediationOutcome::Resolved {
                resolution: format!("remediation plan {} completed", plan.id),
                plan_id: Some(plan.id),
            },
            Ok(result) => RemediationOutcome::Escalated {
                reason: result.error.unwrap_or(result.message),
                plan_id: Some(plan.id),
            },
            Err(e) => RemediationOutcome::Escalated {
                reason: e.to_string(),
                plan_id: Some(plan.id),
            },
        }
    }

    fn name(&self) -> &str {
        "PlanRemediation"
    }
}
