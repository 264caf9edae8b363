use std::sync::Arc;

use async_trait::async_trait;
use automation_core::{
    models::ProbeSpec,
    traits::{HealthProbe, ProbeFactory},
    AutomationError, AutomationResult,
};
use tracing::debug;

/// HTTP探针：GET指定URL，状态码符合预期即为健康
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    expected_status: Option<u16>,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, url: String, expected_status: Option<u16>) -> Self {
        Self {
            client,
            url,
            expected_status,
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> anyhow::Result<()> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        debug!("HTTP探测 {} 返回 {}", self.url, status);

        let healthy = match self.expected_status {
            Some(expected) => status.as_u16() == expected,
            None => status.is_success(),
        };
        if healthy {
            Ok(())
        } else {
            Err(anyhow::anyhow!("{} 返回异常状态码 {}", self.url, status))
        }
    }

    fn describe(&self) -> String {
        format!("http:{}", self.url)
    }
}

/// TCP探针：能建立连接即为健康
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn check(&self) -> anyhow::Result<()> {
        tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| anyhow::anyhow!("连接 {} 失败: {e}", self.address))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.address)
    }
}

/// 固定结果探针
pub struct StaticProbe {
    healthy: bool,
}

impl StaticProbe {
    pub fn new(healthy: bool) -> Self {
        Self { healthy }
    }
}

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn check(&self) -> anyhow::Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(anyhow::anyhow!("静态探针配置为不健康"))
        }
    }

    fn describe(&self) -> String {
        format!("static:{}", self.healthy)
    }
}

/// 默认探针工厂，HTTP探针共享一个客户端连接池
#[derive(Clone, Default)]
pub struct DefaultProbeFactory {
    client: reqwest::Client,
}

impl DefaultProbeFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProbeFactory for DefaultProbeFactory {
    fn create(&self, spec: &ProbeSpec) -> AutomationResult<Arc<dyn HealthProbe>> {
        let probe: Arc<dyn HealthProbe> = match spec {
            ProbeSpec::Http {
                url,
                expected_status,
            } => {
                reqwest::Url::parse(url)
                    .map_err(|e| AutomationError::Validation(format!("无效的探测URL {url}: {e}")))?;
                Arc::new(HttpProbe::new(
                    self.client.clone(),
                    url.clone(),
                    *expected_status,
                ))
            }
            ProbeSpec::Tcp { address } => {
                if address.trim().is_empty() {
                    return Err(AutomationError::missing_field("probe.address"));
                }
                Arc::new(TcpProbe::new(address.clone()))
            }
            ProbeSpec::Static { healthy } => Arc::new(StaticProbe::new(*healthy)),
        };
        Ok(probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_probe() {
        assert!(StaticProbe::new(true).check().await.is_ok());
        assert!(StaticProbe::new(false).check().await.is_err());
    }

    #[tokio::test]
    async fn test_tcp_probe_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let probe = TcpProbe::new(address);
        assert!(probe.check().await.is_ok());
    }

    #[test]
    fn test_factory_rejects_bad_url() {
        let factory = DefaultProbeFactory::new();
        let result = factory.create(&ProbeSpec::Http {
            url: "not a url".to_string(),
            expected_status: None,
        });
        assert!(result.is_err());

        let probe = factory
            .create(&ProbeSpec::Tcp {
                address: "127.0.0.1:5432".to_string(),
            })
            .unwrap();
        assert_eq!(probe.describe(), "tcp:127.0.0.1:5432");
    }
}
