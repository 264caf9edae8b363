use automation_core::models::{IncidentFilter, IncidentSeverity, IncidentStatus};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

/// `status` 同时接受 active 作为 open 的别名
#[derive(Debug, Default, Deserialize)]
pub struct IncidentQueryParams {
    pub status: Option<String>,
    pub health_check_id: Option<String>,
    pub severity: Option<IncidentSeverity>,
}

impl TryFrom<IncidentQueryParams> for IncidentFilter {
    type Error = ApiError;

    fn try_from(params: IncidentQueryParams) -> Result<Self, Self::Error> {
        let status = match params.status.as_deref() {
            None => None,
            Some("active") | Some("open") => Some(IncidentStatus::Open),
            Some("resolved") => Some(IncidentStatus::Resolved),
            Some(other) => {
                return Err(ApiError::BadRequest(format!("未知的故障事件状态: {}", other)))
            }
        };
        Ok(IncidentFilter {
            status,
            health_check_id: params.health_check_id,
            severity: params.severity,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveIncidentRequest {
    #[serde(default)]
    pub resolution: String,
}

pub async fn list_incidents(
    State(state): State<AppState>,
    query: Result<Query<IncidentQueryParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = query?;
    let filter = IncidentFilter::try_from(params)?;
    Ok(success(state.incidents.list_incidents(&filter).await))
}

pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.incidents.get_incident(&id).await?))
}

/// 人工解决故障事件，同时清零对应健康检查的连续失败计数
pub async fn resolve_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ResolveIncidentRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let incident = state
        .monitor
        .resolve_incident(&id, &request.resolution)
        .await?;
    Ok(success(incident))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_maps_to_open() {
        let filter = IncidentFilter::try_from(IncidentQueryParams {
            status: Some("active".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.status, Some(IncidentStatus::Open));

        assert!(IncidentFilter::try_from(IncidentQueryParams {
            status: Some("pending".to_string()),
            ..Default::default()
        })
        .is_err());
    }
}
