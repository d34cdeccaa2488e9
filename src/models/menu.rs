use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Menu node kinds: directories group menus, buttons carry fine-grained
/// permission tags.
pub const MENU_TYPE_DIRECTORY: i64 = 0;
pub const MENU_TYPE_MENU: i64 = 1;
pub const MENU_TYPE_BUTTON: i64 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MenuNode {
    pub id: i64,
    pub title: String,
    pub name: String,
    pub parent_id: Option<i64>,
    pub menu_type: i64,
    pub path: Option<String>,
    /// Permission tag, e.g. "sys:menu:list". Absent on plain navigation nodes.
    pub perms: Option<String>,
    pub icon: Option<String>,
    pub sort: i64,
    pub status: i64,
    pub show: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MenuCreateRequest {
    #[schema(example = "User management")]
    pub title: String,
    #[schema(example = "SysUser")]
    pub name: String,
    pub parent_id: Option<i64>,
    #[schema(example = 1)]
    pub menu_type: i64,
    pub path: Option<String>,
    #[schema(example = "sys:user:list")]
    pub perms: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub sort: i64,
}
