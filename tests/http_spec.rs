mod common;

use common::{pick, world};
use mystica::models::types::UserId;
use mystica::net::http;
use serde_json::{Value, json};
use std::time::Duration;

async fn start(w: &common::World) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = http::router(w.registry.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn craft_over_http() {
    let w = world(Duration::ZERO).await;
    let base = start(&w).await;
    let client = reqwest::Client::new();
    let user = UserId::new();
    w.grant(user, w.wood, w.normal, 2).await;

    let item: Value = client
        .post(format!("{base}/users/{user}/items"))
        .json(&json!({ "item_type_id": w.sword }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let item_id = item["id"].as_str().unwrap().to_string();
    assert_eq!(item["craft_count"], 0);

    let resp = client
        .post(format!("{base}/items/{item_id}/materials"))
        .json(&json!({ "user_id": user, "materials": [pick(w.wood, w.normal)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["first_craft"], true);
    assert_eq!(body["use_count"], 1);
    assert_eq!(body["item"]["craft_count"], 1);
    assert_eq!(body["item"]["is_styled"], false);
    assert_eq!(body["item"]["applied"][0]["slot_index"], 0);
    assert_eq!(body["fingerprint"].as_str().unwrap().len(), 64);

    let stacks: Value = client
        .get(format!("{base}/users/{user}/materials"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stacks[0]["quantity"], 1);
}

#[tokio::test]
async fn errors_carry_code_and_retryable_flag() {
    let w = world(Duration::ZERO).await;
    let base = start(&w).await;
    let client = reqwest::Client::new();
    let user = UserId::new();

    let item: Value = client
        .post(format!("{base}/users/{user}/items"))
        .json(&json!({ "item_type_id": w.sword }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let item_id = item["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/users/{user}/items"))
        .json(&json!({ "item_type_id": uuid::Uuid::new_v4() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = client
        .post(format!("{base}/items/{item_id}/materials"))
        .json(&json!({ "user_id": user, "materials": [pick(w.wood, w.normal)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "insufficient_material");
    assert_eq!(body["error"]["retryable"], false);

    let resp = client
        .post(format!("{base}/items/{item_id}/materials"))
        .json(&json!({ "user_id": user, "materials": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    w.grant(user, w.wood, w.normal, 1).await;
    w.generator.set_failing(true);
    let resp = client
        .post(format!("{base}/items/{item_id}/materials"))
        .json(&json!({ "user_id": user, "materials": [pick(w.wood, w.normal)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "generation_failed");
    assert_eq!(body["error"]["retryable"], true);
}

#[tokio::test]
async fn enemy_spawn_and_health() {
    let w = world(Duration::ZERO).await;
    let base = start(&w).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["storage"], "memory");

    // no style table seeded for this enemy
    let resp = client
        .post(format!("{base}/enemies/{}/spawn", uuid::Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "internal server error");
}
