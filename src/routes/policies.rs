use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::{GroupRule, PolicyRule, RuleFilter};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Serialize, ToSchema)]
pub struct CountResponse {
    pub count: usize,
}

#[utoipa::path(
    get,
    path = "/sys/policies",
    tag = "Policies",
    security(("bearer_auth" = [])),
    params(
        ("subject" = Option<String>, Query, description = "Filter by subject"),
        ("object" = Option<String>, Query, description = "Filter by object")
    ),
    responses(
        (status = 200, description = "Matching permission rules", body = [PolicyRule]),
        (status = 403, description = "Permission denied")
    )
)]
pub async fn list_rules(
    State(state): State<AppState>,
    Query(filter): Query<RuleFilter>,
) -> AppResult<Json<Vec<PolicyRule>>> {
    Ok(Json(state.engine.list_rules(&filter).await?))
}

#[utoipa::path(
    post,
    path = "/sys/policies",
    tag = "Policies",
    security(("bearer_auth" = [])),
    request_body = PolicyRule,
    responses(
        (status = 201, description = "Rule added", body = PolicyRule),
        (status = 409, description = "Rule already exists")
    )
)]
pub async fn add_rule(
    State(state): State<AppState>,
    Json(rule): Json<PolicyRule>,
) -> AppResult<(StatusCode, Json<PolicyRule>)> {
    if !state.engine.add_rule(&rule).await? {
        return Err(AppError::conflict("rule already exists"));
    }

    Ok((StatusCode::CREATED, Json(rule)))
}

#[utoipa::path(
    post,
    path = "/sys/policies/batch",
    tag = "Policies",
    security(("bearer_auth" = [])),
    request_body = Vec<PolicyRule>,
    responses((status = 200, description = "Rules added, duplicates skipped", body = CountResponse))
)]
pub async fn add_rules(
    State(state): State<AppState>,
    Json(rules): Json<Vec<PolicyRule>>,
) -> AppResult<Json<CountResponse>> {
    let count = state.engine.add_rules(&rules).await?;
    Ok(Json(CountResponse { count }))
}

#[utoipa::path(
    delete,
    path = "/sys/policies",
    tag = "Policies",
    security(("bearer_auth" = [])),
    request_body = PolicyRule,
    responses(
        (status = 204, description = "Rule removed"),
        (status = 404, description = "No such rule")
    )
)]
pub async fn remove_rule(
    State(state): State<AppState>,
    Json(rule): Json<PolicyRule>,
) -> AppResult<StatusCode> {
    if !state.engine.remove_rule(&rule).await? {
        return Err(AppError::not_found("rule"));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/sys/policies/batch",
    tag = "Policies",
    security(("bearer_auth" = [])),
    request_body = Vec<PolicyRule>,
    responses((status = 200, description = "Rules removed", body = CountResponse))
)]
pub async fn remove_rules(
    State(state): State<AppState>,
    Json(rules): Json<Vec<PolicyRule>>,
) -> AppResult<Json<CountResponse>> {
    let count = state.engine.remove_rules(&rules).await?;
    Ok(Json(CountResponse { count }))
}

#[utoipa::path(
    delete,
    path = "/sys/policies/subject/{subject}",
    tag = "Policies",
    security(("bearer_auth" = [])),
    params(("subject" = String, Path, description = "Policy subject")),
    responses((status = 200, description = "All rules for the subject removed", body = CountResponse))
)]
pub async fn remove_rules_for_subject(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> AppResult<Json<CountResponse>> {
    let count = state.engine.remove_rules_for_subject(&subject).await?;
    Ok(Json(CountResponse { count }))
}

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct GroupFilter {
    pub member: Option<String>,
}

#[utoipa::path(
    get,
    path = "/sys/policies/groups",
    tag = "Policies",
    security(("bearer_auth" = [])),
    params(("member" = Option<String>, Query, description = "Filter by member")),
    responses((status = 200, description = "Group membership edges", body = [GroupRule]))
)]
pub async fn list_group_rules(
    State(state): State<AppState>,
    Query(filter): Query<GroupFilter>,
) -> AppResult<Json<Vec<GroupRule>>> {
    let rules = state.engine.list_group_rules(filter.member.as_deref()).await?;
    Ok(Json(rules))
}

#[utoipa::path(
    post,
    path = "/sys/policies/groups",
    tag = "Policies",
    security(("bearer_auth" = [])),
    request_body = GroupRule,
    responses(
        (status = 201, description = "Membership edge added", body = GroupRule),
        (status = 409, description = "Edge already exists")
    )
)]
pub async fn add_group_rule(
    State(state): State<AppState>,
    Json(rule): Json<GroupRule>,
) -> AppResult<(StatusCode, Json<GroupRule>)> {
    if !state.engine.add_group_rule(&rule).await? {
        return Err(AppError::conflict("group rule already exists"));
    }

    Ok((StatusCode::CREATED, Json(rule)))
}

#[utoipa::path(
    post,
    path = "/sys/policies/groups/batch",
    tag = "Policies",
    security(("bearer_auth" = [])),
    request_body = Vec<GroupRule>,
    responses((status = 200, description = "Edges added, duplicates skipped", body = CountResponse))
)]
pub async fn add_group_rules(
    State(state): State<AppState>,
    Json(rules): Json<Vec<GroupRule>>,
) -> AppResult<Json<CountResponse>> {
    let count = state.engine.add_group_rules(&rules).await?;
    Ok(Json(CountResponse { count }))
}

#[utoipa::path(
    delete,
    path = "/sys/policies/groups",
    tag = "Policies",
    security(("bearer_auth" = [])),
    request_body = GroupRule,
    responses(
        (status = 204, description = "Membership edge removed"),
        (status = 404, description = "No such edge")
    )
)]
pub async fn remove_group_rule(
    State(state): State<AppState>,
    Json(rule): Json<GroupRule>,
) -> AppResult<StatusCode> {
    if !state.engine.remove_group_rule(&rule).await? {
        return Err(AppError::not_found("group rule"));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/sys/policies/groups/member/{member}",
    tag = "Policies",
    security(("bearer_auth" = [])),
    params(("member" = String, Path, description = "Group member subject")),
    responses((status = 200, description = "All edges for the member removed", body = CountResponse))
)]
pub async fn remove_group_rules_for_member(
    State(state): State<AppState>,
    Path(member): Path<String>,
) -> AppResult<Json<CountResponse>> {
    let count = state.engine.remove_group_rules_for_member(&member).await?;
    Ok(Json(CountResponse { count }))
}
