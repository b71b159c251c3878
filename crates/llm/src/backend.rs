use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::MealDraft;
use tracing::{debug, warn};

use crate::{parse::parse_day_response, prompt, DayRequest, LlmError, MealGenerator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// Any endpoint speaking the OpenAI chat-completions dialect.
pub struct OpenAiCompatibleBackend {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" },
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let json = check_response_status(response).await?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse("completion has no message content".into()))
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    if status >= 400 {
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|body| {
                body["error"]["message"]
                    .as_str()
                    .or_else(|| body["message"].as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "unknown API error".to_string());
        return Err(LlmError::ApiError { status, message });
    }
    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl MealGenerator for OpenAiCompatibleBackend {
    async fn generate_day(&self, request: &DayRequest) -> Result<Vec<MealDraft>, LlmError> {
        let user = prompt::user_prompt(request);
        debug!(day = %request.day, model = %self.config.model, "requesting meals");
        let content = self.complete(prompt::system_prompt(), &user).await?;
        parse_day_response(request.day, &content).inspect_err(|error| {
            warn!(day = %request.day, %error, "model reply rejected");
        })
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{http::StatusCode, routing::post, Json, Router};
    use shared::{
        domain::{DayOfWeek, Goal},
        nutrition::NutritionTargets,
    };

    use super::*;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr: SocketAddr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    fn request() -> DayRequest {
        DayRequest {
            day: DayOfWeek::Saturday,
            goal: Goal::Maintenance,
            targets: NutritionTargets::for_calories(2000, Goal::Maintenance),
            forbidden_ingredients: Vec::new(),
            preferences: None,
            previous_meal_names: Vec::new(),
        }
    }

    fn backend(base_url: String) -> OpenAiCompatibleBackend {
        OpenAiCompatibleBackend::new(OpenAiConfig {
            base_url,
            api_key: Some("test-key".into()),
            ..OpenAiConfig::default()
        })
    }

    #[tokio::test]
    async fn generates_meals_from_chat_completion() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["response_format"]["type"], "json_object");
                let meals: Vec<serde_json::Value> = ["breakfast", "lunch", "dinner", "snack"]
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "meal_type": t,
                            "name": format!("{t} plate"),
                            "calories": 450,
                            "protein_g": 30,
                            "carbs_g": 50,
                            "fat_g": 14,
                        })
                    })
                    .collect();
                let content = serde_json::json!({ "meals": meals }).to_string();
                Json(serde_json::json!({
                    "choices": [{ "message": { "role": "assistant", "content": content } }]
                }))
            }),
        );
        let base_url = spawn(app).await;

        let meals = backend(base_url)
            .generate_day(&request())
            .await
            .expect("meals");
        assert_eq!(meals.len(), 4);
        assert!(meals.iter().all(|m| m.day == DayOfWeek::Saturday));
    }

    #[tokio::test]
    async fn surfaces_provider_error_message() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(serde_json::json!({ "error": { "message": "slow down" } })),
                )
            }),
        );
        let base_url = spawn(app).await;

        let err = backend(base_url)
            .generate_day(&request())
            .await
            .expect_err("should fail");
        match err {
            LlmError::ApiError { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
