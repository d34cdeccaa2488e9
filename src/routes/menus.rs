use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::query_scalar;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::models::menu::{
    MenuCreateRequest, MenuNode, MENU_TYPE_BUTTON, MENU_TYPE_DIRECTORY, MENU_TYPE_MENU,
};
use crate::tree::{build_tree, Authorized, MenuTreeNode};

const MENU_COLUMNS: &str = "id, title, name, parent_id, menu_type, path, perms, icon, sort, status, show";

async fn all_active_menus(state: &AppState) -> AppResult<Vec<MenuNode>> {
    let sql = format!("SELECT {MENU_COLUMNS} FROM sys_menu WHERE status = 1");
    Ok(sqlx::query_as::<_, MenuNode>(&sql)
        .fetch_all(&state.pool)
        .await?)
}

#[utoipa::path(
    get,
    path = "/sys/menus",
    tag = "Menus",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Menu tree pruned to the caller's roles", body = [MenuTreeNode]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn user_menu_tree(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<MenuTreeNode>>> {
    let authorized = if user.0.is_superuser {
        Authorized::All
    } else {
        let ids = state.credentials.authorized_menu_ids(&user.0.role_ids).await?;
        Authorized::Only(ids)
    };

    let nodes = all_active_menus(&state).await?;
    Ok(Json(build_tree(nodes, &authorized)))
}

#[utoipa::path(
    get,
    path = "/sys/menus/all",
    tag = "Menus",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Full menu tree", body = [MenuTreeNode]),
        (status = 403, description = "Permission denied")
    )
)]
pub async fn full_menu_tree(State(state): State<AppState>) -> AppResult<Json<Vec<MenuTreeNode>>> {
    let nodes = all_active_menus(&state).await?;
    Ok(Json(build_tree(nodes, &Authorized::All)))
}

#[utoipa::path(
    post,
    path = "/sys/menus",
    tag = "Menus",
    security(("bearer_auth" = [])),
    request_body = MenuCreateRequest,
    responses(
        (status = 201, description = "Menu node created", body = MenuNode),
        (status = 400, description = "Parent does not exist"),
        (status = 403, description = "Permission denied")
    )
)]
pub async fn create_menu(
    State(state): State<AppState>,
    Json(payload): Json<MenuCreateRequest>,
) -> AppResult<(StatusCode, Json<MenuNode>)> {
    if !matches!(
        payload.menu_type,
        MENU_TYPE_DIRECTORY | MENU_TYPE_MENU | MENU_TYPE_BUTTON
    ) {
        return Err(AppError::bad_request(format!(
            "unknown menu type {}",
            payload.menu_type
        )));
    }

    if let Some(parent_id) = payload.parent_id {
        let exists = query_scalar::<_, i64>("SELECT COUNT(*) FROM sys_menu WHERE id = ?")
            .bind(parent_id)
            .fetch_one(&state.pool)
            .await?;
        if exists == 0 {
            return Err(AppError::bad_request(format!(
                "parent menu {parent_id} does not exist"
            )));
        }
    }

    let id = sqlx::query(
        "INSERT INTO sys_menu (title, name, parent_id, menu_type, path, perms, icon, sort, status, show) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 1)",
    )
    .bind(&payload.title)
    .bind(&payload.name)
    .bind(payload.parent_id)
    .bind(payload.menu_type)
    .bind(&payload.path)
    .bind(&payload.perms)
    .bind(&payload.icon)
    .bind(payload.sort)
    .execute(&state.pool)
    .await?
    .last_insert_rowid();

    let sql = format!("SELECT {MENU_COLUMNS} FROM sys_menu WHERE id = ?");
    let node = sqlx::query_as::<_, MenuNode>(&sql)
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    Ok((StatusCode::CREATED, Json(node)))
}

#[utoipa::path(
    delete,
    path = "/sys/menus/{id}",
    tag = "Menus",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Menu node id")),
    responses(
        (status = 204, description = "Menu node deleted"),
        (status = 404, description = "No such menu node"),
        (status = 409, description = "Node still has children")
    )
)]
pub async fn delete_menu(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let children = query_scalar::<_, i64>("SELECT COUNT(*) FROM sys_menu WHERE parent_id = ?")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    if children > 0 {
        return Err(AppError::conflict(format!(
            "menu {id} still has {children} child nodes"
        )));
    }

    let result = sqlx::query("DELETE FROM sys_menu WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("menu {id}")));
    }

    sqlx::query("DELETE FROM sys_role_menu WHERE menu_id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
