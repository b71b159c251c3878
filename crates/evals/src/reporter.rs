//! Pushes evaluation results to an external feedback collector.

use serde::Serialize;
use tracing::{debug, info};

use crate::{EvalError, EvalReport};

#[derive(Debug, Serialize)]
struct FeedbackRecord<'a> {
    run_id: &'a str,
    key: &'a str,
    score: f64,
    comment: &'a str,
}

pub struct FeedbackClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl FeedbackClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/feedback", self.base_url.trim_end_matches('/'))
    }

    /// Sends one record per evaluator. Stops at the first rejection.
    pub async fn report(&self, run_id: &str, report: &EvalReport) -> Result<usize, EvalError> {
        let endpoint = self.endpoint();
        for result in &report.results {
            let record = FeedbackRecord {
                run_id,
                key: &result.key,
                score: result.score,
                comment: &result.comment,
            };
            let mut request = self.client.post(&endpoint).json(&record);
            if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
                request = request.header("x-api-key", key);
            }
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(EvalError::Rejected {
                    key: result.key.clone(),
                    status: status.as_u16(),
                });
            }
            debug!(run_id, key = %result.key, score = result.score, "feedback sent");
        }
        info!(run_id, count = report.results.len(), "evaluation reported");
        Ok(report.results.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use tokio::sync::Mutex;

    use super::*;
    use crate::{run_suite, test_support::full_week, EvalContext};

    type Received = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn posts_one_record_per_result() {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/feedback",
                post(
                    |State(received): State<Received>,
                     headers: HeaderMap,
                     Json(body): Json<serde_json::Value>| async move {
                        let key = headers
                            .get("x-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        received.lock().await.push((key, body));
                        StatusCode::OK
                    },
                ),
            )
            .with_state(received.clone());
        let base_url = spawn(app).await;

        let report = run_suite(&full_week(), &EvalContext::default());
        let sent = FeedbackClient::new(base_url, Some("secret".into()))
            .report("run-1", &report)
            .await
            .expect("report");
        assert_eq!(sent, 9);

        let received = received.lock().await;
        assert_eq!(received.len(), 9);
        assert_eq!(received[0].0.as_deref(), Some("secret"));
        assert_eq!(received[0].1["run_id"], "run-1");
        assert_eq!(received[0].1["key"], "meal_count");
        assert_eq!(received[0].1["score"], 1.0);
    }

    #[tokio::test]
    async fn rejection_carries_key_and_status() {
        let app = Router::new().route("/feedback", post(|| async { StatusCode::FORBIDDEN }));
        let base_url = spawn(app).await;

        let report = run_suite(&full_week(), &EvalContext::default());
        let err = FeedbackClient::new(format!("{base_url}/"), None)
            .report("run-2", &report)
            .await
            .expect_err("should be rejected");
        match err {
            EvalError::Rejected { key, status } => {
                assert_eq!(key, "meal_count");
                assert_eq!(status, 403);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
