mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

use admingate::config::EnforcementMode;
use common::{
    assign_role, grant_role_menu, login, seed_menu, seed_role, seed_user, send, spawn_app, UserSpec,
};

fn ids(tree: &Value) -> Vec<i64> {
    tree.as_array()
        .unwrap()
        .iter()
        .map(|node| node["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn user_tree_is_pruned_and_reanchored() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    let (user_id, _) = seed_user(&test.pool, &UserSpec::staff("ada", "password123")).await?;
    let role_id = seed_role(&test.pool, "viewer").await?;
    assign_role(&test.pool, user_id, role_id).await?;

    let root = seed_menu(&test.pool, "System", None, None, 0).await?;
    let child = seed_menu(&test.pool, "Users", Some(root), None, 0).await?;
    let grandchild = seed_menu(&test.pool, "User detail", Some(child), None, 0).await?;
    let sibling = seed_menu(&test.pool, "Roles", Some(root), None, 1).await?;

    // the middle node is not granted: its child re-anchors under the root
    grant_role_menu(&test.pool, role_id, root).await?;
    grant_role_menu(&test.pool, role_id, grandchild).await?;

    let (token, _) = login(&test.app, "ada", "password123").await?;
    let (status, body) = send(&test.app, "GET", "/sys/menus", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(ids(&body), vec![root]);
    assert_eq!(ids(&body[0]["children"]), vec![grandchild]);

    // the ungranted sibling is absent entirely
    let rendered = body.to_string();
    assert!(!rendered.contains(&format!("\"id\":{sibling}")));
    assert!(!rendered.contains(&format!("\"id\":{child},")));

    Ok(())
}

#[tokio::test]
async fn superuser_tree_is_complete_and_ordered() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    seed_user(&test.pool, &UserSpec::superuser("root", "password123")).await?;

    let late = seed_menu(&test.pool, "Zeta", None, None, 2).await?;
    let early = seed_menu(&test.pool, "Alpha", None, None, 0).await?;
    let middle = seed_menu(&test.pool, "Mid", None, None, 1).await?;
    let child = seed_menu(&test.pool, "Child", Some(early), None, 0).await?;

    let (token, _) = login(&test.app, "root", "password123").await?;
    let (status, body) = send(&test.app, "GET", "/sys/menus", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(ids(&body), vec![early, middle, late]);
    assert_eq!(ids(&body[0]["children"]), vec![child]);

    Ok(())
}

#[tokio::test]
async fn orphaned_grant_becomes_a_root() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    let (user_id, _) = seed_user(&test.pool, &UserSpec::staff("ada", "password123")).await?;
    let role_id = seed_role(&test.pool, "viewer").await?;
    assign_role(&test.pool, user_id, role_id).await?;

    let root = seed_menu(&test.pool, "System", None, None, 0).await?;
    let child = seed_menu(&test.pool, "Users", Some(root), None, 0).await?;
    grant_role_menu(&test.pool, role_id, child).await?;

    let (token, _) = login(&test.app, "ada", "password123").await?;
    let (status, body) = send(&test.app, "GET", "/sys/menus", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![child]);

    Ok(())
}

#[tokio::test]
async fn create_menu_validates_the_parent() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    seed_user(&test.pool, &UserSpec::superuser("root", "password123")).await?;
    let (token, _) = login(&test.app, "root", "password123").await?;

    let (status, body) = send(
        &test.app,
        "POST",
        "/sys/menus",
        Some(&token),
        Some(json!({
            "title": "Orphan",
            "name": "Orphan",
            "parent_id": 9999,
            "menu_type": 1
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = send(
        &test.app,
        "POST",
        "/sys/menus",
        Some(&token),
        Some(json!({
            "title": "Dashboard",
            "name": "Dashboard",
            "menu_type": 1,
            "perms": "sys:dashboard:list"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Dashboard");
    assert_eq!(body["perms"], "sys:dashboard:list");

    Ok(())
}

#[tokio::test]
async fn create_menu_rejects_unknown_menu_type() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    seed_user(&test.pool, &UserSpec::superuser("root", "password123")).await?;
    let (token, _) = login(&test.app, "root", "password123").await?;

    let (status, body) = send(
        &test.app,
        "POST",
        "/sys/menus",
        Some(&token),
        Some(json!({
            "title": "Odd",
            "name": "Odd",
            "menu_type": 9
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    Ok(())
}

#[tokio::test]
async fn delete_refuses_nodes_with_children() -> Result<()> {
    let test = spawn_app(EnforcementMode::DynamicPolicy).await?;
    seed_user(&test.pool, &UserSpec::superuser("root", "password123")).await?;
    let (token, _) = login(&test.app, "root", "password123").await?;

    let root = seed_menu(&test.pool, "System", None, None, 0).await?;
    let child = seed_menu(&test.pool, "Users", Some(root), None, 0).await?;

    let (status, body) = send(
        &test.app,
        "DELETE",
        &format!("/sys/menus/{root}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = send(
        &test.app,
        "DELETE",
        &format!("/sys/menus/{child}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&test.app, "GET", "/sys/menus/all", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![root]);
    assert!(body[0]["children"].as_array().unwrap().is_empty());

    // unknown ids are a plain 404
    let (status, _) = send(
        &test.app,
        "DELETE",
        &format!("/sys/menus/{child}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
