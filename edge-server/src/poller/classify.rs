//! Task/no-task classification of inbox messages.
//!
//! The poller only needs a verdict plus optional extracted fields. The
//! relay-backed classifier asks the text-generation model through the edge
//! API's `/ali-api` route and reads a small JSON answer out of its reply.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{EdgeClient, PollError};
use crate::config::Secret;
use crate::relay::RelayRequest;

const PROMPT: &str = "判断下面的QQ消息是否为需要完成的任务，并提取标题、要点和截止时间。\
只返回JSON，不要其他文字：\
{\"is_task\": true, \"title\": \"简洁标题\", \"detail\": \"任务要点\", \
\"deadline\": \"消息中的原始时间表达式，没有则为null\"}\n\n消息内容：\n";

/// Fields extracted from a message judged to be a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub title: Option<String>,
    pub detail: Option<String>,
    /// Raw deadline expression, interpreted by the client.
    pub deadline: Option<String>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// `None` when the message is not a task.
    async fn classify(&self, content: &str) -> Result<Option<Verdict>, PollError>;
}

/// Treats every message as a task with nothing extracted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl Classifier for AcceptAll {
    async fn classify(&self, _content: &str) -> Result<Option<Verdict>, PollError> {
        Ok(Some(Verdict::default()))
    }
}

/// Classifier backed by the AI relay.
///
/// Transport failures are returned so the message is retried. An upstream
/// rejection or an unreadable answer falls back to treating the message as
/// a task.
pub struct RelayClassifier {
    client: EdgeClient,
    api_key: Secret,
    model: String,
}

impl RelayClassifier {
    pub fn new(client: EdgeClient, api_key: Secret, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key,
            model: model.into(),
        }
    }

    fn request(&self, content: &str) -> RelayRequest {
        RelayRequest {
            api_key: self.api_key.expose().to_string(),
            request_body: json!({
                "model": self.model,
                "input": {
                    "messages": [{ "role": "user", "content": format!("{PROMPT}{content}") }]
                },
                "parameters": { "temperature": 0.1, "max_tokens": 2000 }
            }),
        }
    }
}

#[async_trait]
impl Classifier for RelayClassifier {
    async fn classify(&self, content: &str) -> Result<Option<Verdict>, PollError> {
        let reply = match self.client.relay(&self.request(content)).await {
            Ok(reply) => reply,
            Err(PollError::Api { status, message }) => {
                warn!(status = status, error = %message, "classifier_upstream_rejected");
                return Ok(Some(Verdict::default()));
            }
            Err(e) => return Err(e),
        };

        match parse_reply(&reply) {
            Some(answer) => {
                info!(is_task = answer.is_task, "classifier_verdict");
                Ok(answer.into_verdict())
            }
            None => {
                warn!("classifier_reply_unreadable");
                Ok(Some(Verdict::default()))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Answer {
    is_task: bool,
    title: Option<String>,
    detail: Option<String>,
    deadline: Option<String>,
}

impl Answer {
    fn into_verdict(self) -> Option<Verdict> {
        if !self.is_task {
            return None;
        }

        Some(Verdict {
            title: non_blank(self.title),
            detail: non_blank(self.detail),
            deadline: non_blank(self.deadline).filter(|d| !d.eq_ignore_ascii_case("null")),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Model text from either reply layout (`output.text` or the chat-style
/// `output.choices[0].message.content`), parsed as an [`Answer`].
fn parse_reply(reply: &Value) -> Option<Answer> {
    let text = reply
        .pointer("/output/text")
        .or_else(|| reply.pointer("/output/choices/0/message/content"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())?;

    if let Ok(answer) = serde_json::from_str(text) {
        return Some(answer);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_text_layout() {
        let reply = json!({
            "output": {
                "text": r#"{"is_task": true, "title": "交报告", "detail": "", "deadline": "null"}"#
            }
        });
        let verdict = parse_reply(&reply).unwrap().into_verdict().unwrap();

        assert_eq!(verdict.title.as_deref(), Some("交报告"));
        assert!(verdict.detail.is_none());
        assert!(verdict.deadline.is_none());
    }

    #[test]
    fn test_parse_choices_layout_with_surrounding_text() {
        let reply = json!({
            "output": {
                "choices": [{
                    "message": {
                        "content": "结果如下：\n{\"is_task\": true, \"deadline\": \"明天下午3点\"}\n"
                    }
                }]
            }
        });
        let verdict = parse_reply(&reply).unwrap().into_verdict().unwrap();

        assert_eq!(verdict.deadline.as_deref(), Some("明天下午3点"));
        assert!(verdict.title.is_none());
    }

    #[test]
    fn test_not_a_task() {
        let reply = json!({ "output": { "text": r#"{"is_task": false}"# } });
        assert!(parse_reply(&reply).unwrap().into_verdict().is_none());
    }

    #[test]
    fn test_unreadable_replies() {
        assert!(parse_reply(&json!({})).is_none());
        assert!(parse_reply(&json!({ "output": { "text": "  " } })).is_none());
        assert!(parse_reply(&json!({ "output": { "text": "no json here" } })).is_none());
        assert!(parse_reply(&json!({ "output": { "text": "} {" } })).is_none());
    }

    fn classifier_for(server: &MockServer) -> RelayClassifier {
        let base = format!("{}/api/edge", server.uri());
        let client = EdgeClient::new(Client::new(), &base).unwrap();
        RelayClassifier::new(client, Secret::new("sk-test"), "qwen-turbo")
    }

    #[tokio::test]
    async fn test_relay_classifier_posts_through_edge_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/edge/ali-api"))
            .and(body_partial_json(json!({
                "apiKey": "sk-test",
                "requestBody": { "model": "qwen-turbo" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": { "text": r#"{"is_task": false}"# }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let verdict = classifier_for(&server).classify("今天天气不错").await.unwrap();
        assert!(verdict.is_none());
    }

    #[tokio::test]
    async fn test_relay_classifier_falls_back_on_upstream_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/edge/ali-api"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid API-key" })),
            )
            .mount(&server)
            .await;

        let verdict = classifier_for(&server).classify("明天交作业").await.unwrap();
        assert_eq!(verdict, Some(Verdict::default()));
    }

    #[tokio::test]
    async fn test_relay_classifier_reports_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = EdgeClient::new(Client::new(), &format!("http://{addr}/api/edge")).unwrap();
        let classifier = RelayClassifier::new(client, Secret::new("sk-test"), "qwen-turbo");

        let result = classifier.classify("明天交作业").await;
        assert!(matches!(result, Err(PollError::Http(_))));
    }
}
