mod utils;

use reqwest::Client;
use serde_json::{json, Value};

#[tokio::test]
async fn test_health_check_works() {
    let addr = utils::spawn_server().await;

    let response = Client::new()
        .get(format!("{addr}/api/edge/health"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_validation_handshake_matches_library_signature() {
    let addr = utils::spawn_server().await;

    let challenge = json!({
        "op": 13,
        "d": { "plain_token": "Arq0D5A61EgUu4OxUvOp", "event_ts": "1725442341" }
    });

    let response = Client::new()
        .post(format!("{addr}/api/edge/webhook/qq/group"))
        .json(&challenge)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let expected =
        glassmemo::web::sign(utils::TEST_SECRET, "1725442341", "Arq0D5A61EgUu4OxUvOp").unwrap();

    assert_eq!(body["plain_token"], "Arq0D5A61EgUu4OxUvOp");
    assert_eq!(body["signature"], expected.as_str());
}

#[tokio::test]
async fn test_group_message_lands_in_inbox() {
    let addr = utils::spawn_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{addr}/api/webhook/qq/group"))
        .json(&json!({
            "op": 0,
            "t": "GROUP_AT_MESSAGE_CREATE",
            "d": {
                "id": "evt-1",
                "group_openid": "G1",
                "author": { "member_openid": "M1", "member_nickname": "Alice" },
                "content": " 周五前提交周报 ",
                "timestamp": "2024-05-01T12:00:00+08:00"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let inbox: Value = client
        .get(format!("{addr}/api/edge/messages"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(inbox["count"], 1);
    assert_eq!(inbox["data"][0]["type"], "GROUP_AT_MESSAGE_CREATE");
    assert_eq!(inbox["data"][0]["groupId"], "G1");
    assert_eq!(inbox["data"][0]["processed"], false);
}
