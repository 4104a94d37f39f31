use log::{debug, warn};
use serde_json::{json, Value};

use super::{ensure_success, OpenAiClient};
use crate::config::ModerationFailMode;
use crate::error::ProxyError;

impl OpenAiClient {
    /// Asks the moderation classifier whether `text` should be blocked.
    ///
    /// A success response without a boolean `results[0].flagged` is resolved by
    /// the configured [`ModerationFailMode`].
    pub async fn is_flagged(&self, text: &str) -> Result<bool, ProxyError> {
        let response = self
            .post("/v1/moderations")
            .timeout(self.request_timeout)
            .json(&json!({ "input": text }))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let body = response.bytes().await?;
        let verdict = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|value| value.pointer("/results/0/flagged").and_then(Value::as_bool));

        match verdict {
            Some(flagged) => {
                debug!("Moderation verdict: flagged={}", flagged);
                Ok(flagged)
            }
            None => {
                warn!(
                    "Moderation response carried no verdict, failing {:?}",
                    self.fail_mode
                );
                Ok(self.fail_mode == ModerationFailMode::Closed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, fail_mode: &str) -> OpenAiClient {
        let base_url = server.uri();
        let config = Config::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "APP_SHARED_SECRET" => Some("s3cret".into()),
            "OPENAI_BASE_URL" => Some(base_url.clone()),
            "MODERATION_FAIL_MODE" => Some(fail_mode.into()),
            _ => None,
        })
        .unwrap();
        OpenAiClient::new(&config).unwrap()
    }

    async fn respond_with(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/v1/moderations"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn reads_flagged_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/moderations"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({ "input": "something awful" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "flagged": true }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server, "open").is_flagged("something awful").await.unwrap());
    }

    #[tokio::test]
    async fn clean_text_is_not_flagged() {
        let server = MockServer::start().await;
        respond_with(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({ "results": [{ "flagged": false }] })),
        )
        .await;

        assert!(!client(&server, "open").is_flagged("hello").await.unwrap());
    }

    // Fail-open lets text through whenever the classifier gives no verdict.
    #[tokio::test]
    async fn missing_verdict_fails_open_by_default() {
        let server = MockServer::start().await;
        respond_with(&server, ResponseTemplate::new(200).set_body_json(json!({ "results": [] }))).await;

        assert!(!client(&server, "open").is_flagged("anything").await.unwrap());
    }

    #[tokio::test]
    async fn unparsable_verdict_fails_closed_when_configured() {
        let server = MockServer::start().await;
        respond_with(&server, ResponseTemplate::new(200).set_body_string("not json")).await;

        assert!(client(&server, "closed").is_flagged("anything").await.unwrap());
    }

    #[tokio::test]
    async fn classifier_error_is_passed_through() {
        let server = MockServer::start().await;
        respond_with(&server, ResponseTemplate::new(401).set_body_string("bad key")).await;

        match client(&server, "open").is_flagged("anything").await {
            Err(ProxyError::Upstream { status, body }) => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("expected upstream error, got {:?}", other.map(|_| ())),
        }
    }
}
