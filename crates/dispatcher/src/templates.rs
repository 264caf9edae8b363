use std::collections::BTreeMap;

use tracing::{debug, info};

use automation_core::{
    models::{ActionPlanTemplate, StepDefinition, TaskPriority},
    AutomationError, AutomationResult,
};

/// 行动计划模板注册表，启动后只读
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, ActionPlanTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置内置模板的注册表
    pub fn with_builtin() -> AutomationResult<Self> {
        let mut registry = Self::new();
        for template in builtin_templates() {
            registry.register(template)?;
        }
        Ok(registry)
    }

    /// 注册模板，同ID的模板会被覆盖
    pub fn register(&mut self, template: ActionPlanTemplate) -> AutomationResult<()> {
        template.validate()?;
        if self.templates.contains_key(&template.id) {
            info!("覆盖行动计划模板: {}", template.id);
        } else {
            debug!("注册行动计划模板: {} ({} 个步骤)", template.id, template.steps.len());
        }
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    /// 检查所有模板的依赖都已注册，全部模板注册完成后调用
    pub fn validate_dependencies(&self) -> AutomationResult<()> {
        for template in self.templates.values() {
            if let Some(missing) = template
                .dependencies
                .iter()
                .find(|dep| !self.templates.contains_key(dep.as_str()))
            {
                return Err(AutomationError::Configuration(format!(
                    "行动计划模板 {} 依赖未知模板: {}",
                    template.id, missing
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> AutomationResult<&ActionPlanTemplate> {
        self.templates
            .get(id)
            .ok_or_else(|| AutomationError::TemplateNotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn list(&self) -> Vec<ActionPlanTemplate> {
        self.templates.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn step(id: &str, name: &str, step_type: &str, timeout_seconds: u64, retry_attempts: u32) -> StepDefinition {
    StepDefinition::local(id, name, step_type)
        .with_timeout_seconds(timeout_seconds)
        .with_retry_attempts(retry_attempts)
}

/// 内置模板：系统检查、安全审计、性能优化、部署
pub fn builtin_templates() -> Vec<ActionPlanTemplate> {
    vec![
        ActionPlanTemplate {
            id: "system-check".to_string(),
            name: "系统检查".to_string(),
            category: "maintenance".to_string(),
            priority: TaskPriority::High,
            dependencies: vec![],
            steps: vec![
                step("check_server_health", "检查服务器状态", "health_check", 30, 2),
                step("check_database_connection", "检查数据库连接", "connection_check", 15, 2),
                step("check_disk_space", "检查磁盘空间", "resource_check", 10, 1),
                step("check_memory_usage", "检查内存使用", "resource_check", 10, 1),
            ],
        },
        ActionPlanTemplate {
            id: "security-audit".to_string(),
            name: "安全审计".to_string(),
            category: "security".to_string(),
            priority: TaskPriority::Urgent,
            dependencies: vec!["system-check".to_string()],
            steps: vec![
                step("vulnerability_scan", "漏洞扫描", "security_scan", 300, 1),
                step("check_ssl_certificates", "检查SSL证书", "certificate_check", 60, 2),
                step("audit_user_permissions", "审计用户权限", "permission_audit", 120, 2),
                step("check_firewall_rules", "检查防火墙规则", "firewall_check", 60, 1),
            ],
        },
        ActionPlanTemplate {
            id: "performance-optimization".to_string(),
            name: "性能优化".to_string(),
            category: "optimization".to_string(),
            priority: TaskPriority::Medium,
            dependencies: vec!["system-check".to_string()],
            steps: vec![
                step("analyze_performance_metrics", "分析性能指标", "analysis", 180, 2),
                step("optimize_database_queries", "优化数据库查询", "optimization", 300, 2),
                step("clear_cache", "清理缓存", "maintenance", 60, 1),
                step("optimize_memory_usage", "优化内存使用", "optimization", 120, 2),
            ],
        },
        ActionPlanTemplate {
            id: "deploy-template".to_string(),
            name: "部署".to_string(),
            category: "deployment".to_string(),
            priority: TaskPriority::High,
            dependencies: vec!["system-check".to_string(), "security-audit".to_string()],
            steps: vec![
                step("backup_current_version", "备份当前版本", "backup", 300, 2),
                step("deploy_new_version", "部署新版本", "deployment", 600, 3),
                step("run_tests", "运行测试", "testing", 180, 2),
                step("verify_deployment", "验证部署", "verification", 120, 2),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_are_consistent() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        assert_eq!(registry.len(), 4);
        registry.validate_dependencies().unwrap();
        assert_eq!(
            registry.get("deploy-template").unwrap().dependencies,
            vec!["system-check".to_string(), "security-audit".to_string()]
        );
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let mut registry = TemplateRegistry::with_builtin().unwrap();
        registry
            .register(ActionPlanTemplate {
                id: "rollback".to_string(),
                name: "回滚".to_string(),
                category: "deployment".to_string(),
                priority: TaskPriority::High,
                dependencies: vec!["snapshot".to_string()],
                steps: vec![StepDefinition::local("restore", "恢复", "restore")],
            })
            .unwrap();
        let err = registry.validate_dependencies().unwrap_err();
        assert!(err.to_string().contains("snapshot"));
    }

    #[test]
    fn test_malformed_template_is_rejected() {
        let mut registry = TemplateRegistry::new();
        let result = registry.register(ActionPlanTemplate {
            id: "empty".to_string(),
            name: "空模板".to_string(),
            category: "general".to_string(),
            priority: TaskPriority::Low,
            dependencies: vec![],
            steps: vec![],
        });
        assert!(result.is_err());
        assert!(matches!(
            registry.get("empty"),
            Err(AutomationError::TemplateNotFound { .. })
        ));
    }
}
