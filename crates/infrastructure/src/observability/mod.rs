pub mod metrics_collector;

pub use metrics_collector::MetricsCollector;

use std::net::SocketAddr;

use anyhow::Result;
use tracing::info;

/// 安装Prometheus指标导出器，在指定地址暴露 /metrics
///
/// 必须在构造任何 `MetricsCollector` 之前调用，否则已创建的句柄不会上报。
pub fn init_metrics_exporter(bind_address: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(bind_address)
        .install()
        .map_err(|e| anyhow::anyhow!("安装Prometheus导出器失败: {}", e))?;

    info!("Prometheus指标导出器已启动: {}", bind_address);
    Ok(())
}
