/// Task board over HTTP, including the notifications it produces as a side effect

mod common;

use axum::http::StatusCode;
use common::TestContext;
use kinship_shared::models::notification::NotificationType;
use serde_json::json;

#[tokio::test]
async fn test_create_notifies_assignees() {
    let ctx = TestContext::new();
    let mom = ctx.user("Marta", "Pérez").await;
    let kid = ctx.user("Leo", "Pérez").await;
    let family = ctx.family_with(&mom, "Pérez", &[&kid]).await;

    let reply = ctx
        .post(
            "/v1/tasks",
            &mom,
            json!({ "title": "Take out the trash", "priority": "high", "assigned_to": [kid.id(), mom.id()] }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["family_id"], family.id.to_string());
    assert_eq!(reply.body["status"], "pending");
    assert_eq!(reply.body["priority"], "high");

    let notifications = ctx.store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].recipient_id, kid.id());
    assert_eq!(notifications[0].kind(), NotificationType::NewTask);
}

#[tokio::test]
async fn test_task_succeeds_when_notifications_fail() {
    let ctx = TestContext::new();
    let mom = ctx.user("Marta", "Pérez").await;
    let kid = ctx.user("Leo", "Pérez").await;
    ctx.family_with(&mom, "Pérez", &[&kid]).await;

    ctx.store.fail_notification_writes(true);
    let reply = ctx
        .post("/v1/tasks", &mom, json!({ "title": "Homework", "assigned_to": [kid.id()] }))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert!(ctx.store.notifications().await.is_empty());

    let list = ctx.get("/v1/tasks", &kid).await;
    assert_eq!(list.body["tasks"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_visibility() {
    let ctx = TestContext::new();
    let mom = ctx.user("Marta", "Pérez").await;
    let kid = ctx.user("Leo", "Pérez").await;
    let sister = ctx.user("Sara", "Pérez").await;
    ctx.family_with(&mom, "Pérez", &[&kid, &sister]).await;

    for (title, assignee) in [("Dishes", kid.id()), ("Laundry", sister.id())] {
        let reply = ctx
            .post("/v1/tasks", &mom, json!({ "title": title, "assigned_to": [assignee] }))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
    }

    let owner_view = ctx.get("/v1/tasks", &mom).await;
    assert_eq!(owner_view.status, StatusCode::OK);
    assert_eq!(owner_view.body["is_owner"], true);
    assert_eq!(owner_view.body["tasks"].as_array().unwrap().len(), 2);

    let kid_view = ctx.get("/v1/tasks", &kid).await;
    assert_eq!(kid_view.body["is_owner"], false);
    let tasks = kid_view.body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["title"], "Dishes");
}

#[tokio::test]
async fn test_advance_to_completed_tells_owner() {
    let ctx = TestContext::new();
    let mom = ctx.user("Marta", "Pérez").await;
    let kid = ctx.user("Leo", "Pérez").await;
    ctx.family_with(&mom, "Pérez", &[&kid]).await;

    let reply = ctx
        .post("/v1/tasks", &mom, json!({ "title": "Homework", "assigned_to": [kid.id()] }))
        .await;
    let task_id = reply.body["id"].as_str().unwrap().to_string();
    let uri = format!("/v1/tasks/{}/advance", task_id);

    let reply = ctx.post(&uri, &kid, json!({})).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "in_progress");

    let reply = ctx.post(&uri, &kid, json!({})).await;
    assert_eq!(reply.body["status"], "completed");

    let to_mom: Vec<_> = ctx
        .store
        .notifications()
        .await
        .into_iter()
        .filter(|n| n.recipient_id == mom.id())
        .collect();
    assert_eq!(to_mom.len(), 1);
    assert_eq!(to_mom[0].kind(), NotificationType::TaskCompleted);

    let reply = ctx.post(&uri, &kid, json!({})).await;
    assert_eq!(reply.body["status"], "pending");
}

#[tokio::test]
async fn test_update_notifies_assignees() {
    let ctx = TestContext::new();
    let mom = ctx.user("Marta", "Pérez").await;
    let kid = ctx.user("Leo", "Pérez").await;
    ctx.family_with(&mom, "Pérez", &[&kid]).await;

    let reply = ctx
        .post(
            "/v1/tasks",
            &mom,
            json!({ "title": "Homework", "due_date": "2026-11-01T18:00:00Z", "assigned_to": [kid.id()] }),
        )
        .await;
    let task_id = reply.body["id"].as_str().unwrap().to_string();
    let uri = format!("/v1/tasks/{}", task_id);

    let reply = ctx
        .put(&uri, &mom, Some(json!({ "title": "Maths homework", "due_date": null })))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["title"], "Maths homework");
    assert!(reply.body["due_date"].is_null());

    let kinds: Vec<_> = ctx
        .store
        .notifications()
        .await
        .iter()
        .map(|n| n.kind())
        .collect();
    assert_eq!(kinds, vec![NotificationType::NewTask, NotificationType::ModifiedTask]);

    let reply = ctx.put(&uri, &mom, Some(json!({}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_is_owner_or_creator() {
    let ctx = TestContext::new();
    let mom = ctx.user("Marta", "Pérez").await;
    let kid = ctx.user("Leo", "Pérez").await;
    ctx.family_with(&mom, "Pérez", &[&kid]).await;

    let reply = ctx
        .post("/v1/tasks", &mom, json!({ "title": "Homework", "assigned_to": [kid.id()] }))
        .await;
    let uri = format!("/v1/tasks/{}", reply.body["id"].as_str().unwrap());

    let reply = ctx.delete(&uri, &kid).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = ctx.delete(&uri, &mom).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = ctx.get(&uri, &mom).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_task_rules() {
    let ctx = TestContext::new();
    let mom = ctx.user("Marta", "Pérez").await;
    let stranger = ctx.user("Iris", "Soto").await;
    let neighbour = ctx.user("Tomás", "Gil").await;
    ctx.family(&mom, "Pérez").await;
    ctx.family(&neighbour, "Gil").await;

    let reply = ctx.get("/v1/tasks", &stranger).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.error(), "no_family");

    let reply = ctx
        .post("/v1/tasks", &mom, json!({ "title": "Shopping", "assigned_to": [stranger.id()] }))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.error(), "invalid_assignee");

    let reply = ctx.post("/v1/tasks", &mom, json!({ "title": "" })).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.error(), "validation_error");

    // Another family's task is invisible
    let reply = ctx.post("/v1/tasks", &mom, json!({ "title": "Shopping" })).await;
    let uri = format!("/v1/tasks/{}", reply.body["id"].as_str().unwrap());
    let reply = ctx.get(&uri, &neighbour).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = ctx.get("/v1/tasks/nope", &mom).await;
    assert_eq!(reply.error(), "invalid_id");
}
