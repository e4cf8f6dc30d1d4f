//! Webhook gateway routes served over a real socket.

use chatgate::gateway::{self, GatewayState};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

async fn spawn_gateway() -> (String, mpsc::Receiver<chatgate::channels::ChannelMessage>) {
    let (tx, rx) = mpsc::channel(8);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = gateway::router(GatewayState::new(tx, SECRET));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), rx)
}

fn text_update(text: &str) -> serde_json::Value {
    serde_json::json!({
        "update_id": 1,
        "message": {
            "message_id": 5,
            "date": 1_700_000_000,
            "from": {"id": 42, "is_bot": false, "first_name": "A"},
            "chat": {"id": 42, "type": "private"},
            "text": text
        }
    })
}

#[tokio::test]
async fn root_answers_liveness() {
    let (base, _rx) = spawn_gateway().await;

    let resp = reqwest::get(format!("{base}/")).await.unwrap();

    assert!(resp.status().is_success());
    assert_eq!(resp.text().await.unwrap(), "Bot is running");
}

#[tokio::test]
async fn health_returns_snapshot_json() {
    let (base, _rx) = spawn_gateway().await;

    let body: serde_json::Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(body["pid"].as_u64().is_some());
    assert!(body["components"].is_object());
}

#[tokio::test]
async fn webhook_forwards_text_updates() {
    let (base, mut rx) = spawn_gateway().await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/webhook/{SECRET}"))
        .json(&text_update("Hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.sender, "42");
    assert_eq!(msg.content, "Hello");
}

#[tokio::test]
async fn webhook_group_message_keys_on_sender_and_replies_to_chat() {
    let (base, mut rx) = spawn_gateway().await;

    let update = serde_json::json!({
        "update_id": 3,
        "message": {
            "message_id": 9,
            "from": {"id": 42, "is_bot": false, "first_name": "A"},
            "chat": {"id": -100_777, "type": "supergroup"},
            "text": "Hi all"
        }
    });
    reqwest::Client::new()
        .post(format!("{base}/webhook/{SECRET}"))
        .json(&update)
        .send()
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.sender, "42");
    assert_eq!(msg.reply_target, "-100777");
    assert_eq!(msg.content, "Hi all");
}

#[tokio::test]
async fn webhook_wrong_path_is_not_found() {
    let (base, mut rx) = spawn_gateway().await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/webhook/not-the-secret"))
        .json(&text_update("Hello"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn webhook_acknowledges_non_text_updates() {
    let (base, mut rx) = spawn_gateway().await;

    let update = serde_json::json!({
        "update_id": 2,
        "my_chat_member": {"chat": {"id": 1}}
    });
    let resp = reqwest::Client::new()
        .post(format!("{base}/webhook/{SECRET}"))
        .json(&update)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert!(rx.try_recv().is_err());
}
