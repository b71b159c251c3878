//! HTTP client for the diet planner API, including the generation stream.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use evals::EvalReport;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{DietPlan, DietPlanId, UserProfile},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        AuthResponse, ChangePasswordRequest, GenerateDietPlanRequest, LoginRequest, PdfResponse,
        ProfileUpdate, RegisterRequest, RenameDietPlanRequest, StreamEvent,
    },
};
use thiserror::Error;
use tracing::debug;
use url::Url;

mod progress;
mod sse;

pub use progress::{GenerationProgress, GenerationStatus};
pub use sse::SseDecoder;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Api(#[from] ApiException),
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid stream event: {0}")]
    Event(#[from] serde_json::Error),
    #[error("invalid pdf payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("not logged in")]
    NotAuthenticated,
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("stream ended before the plan was complete")]
    StreamEnded,
}

impl ClientError {
    /// The server's error code, when the server produced the error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api(exception) => Some(exception.code),
            _ => None,
        }
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct DietPlanClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl DietPlanClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(server_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ClientError::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }

    pub async fn register(&mut self, request: &RegisterRequest) -> Result<AuthResponse> {
        let url = self.endpoint("api/auth/register")?;
        let auth: AuthResponse = json(self.http.post(url).json(request)).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthResponse> {
        let url = self.endpoint("api/auth/login")?;
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = json(self.http.post(url).json(&request)).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub async fn me(&self) -> Result<UserProfile> {
        let url = self.endpoint("api/me")?;
        json(self.authed(self.http.get(url))?).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        let url = self.endpoint("api/me")?;
        json(self.authed(self.http.put(url))?.json(update)).await
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<()> {
        let url = self.endpoint("api/me/password")?;
        let request = ChangePasswordRequest {
            current_password: current.to_string(),
            new_password: new.to_string(),
        };
        send(self.authed(self.http.post(url))?.json(&request)).await?;
        Ok(())
    }

    pub async fn delete_account(&mut self) -> Result<()> {
        let url = self.endpoint("api/me")?;
        send(self.authed(self.http.delete(url))?).await?;
        self.token = None;
        Ok(())
    }

    pub async fn list_plans(&self) -> Result<Vec<DietPlan>> {
        let url = self.endpoint("api/diet-plans")?;
        json(self.authed(self.http.get(url))?).await
    }

    pub async fn get_plan(&self, id: DietPlanId) -> Result<DietPlan> {
        let url = self.endpoint(&format!("api/diet-plans/{}", id.0))?;
        json(self.authed(self.http.get(url))?).await
    }

    pub async fn rename_plan(&self, id: DietPlanId, name: &str) -> Result<DietPlan> {
        let url = self.endpoint(&format!("api/diet-plans/{}", id.0))?;
        let request = RenameDietPlanRequest {
            name: name.to_string(),
        };
        json(self.authed(self.http.patch(url))?.json(&request)).await
    }

    pub async fn delete_plan(&self, id: DietPlanId) -> Result<()> {
        let url = self.endpoint(&format!("api/diet-plans/{}", id.0))?;
        send(self.authed(self.http.delete(url))?).await?;
        Ok(())
    }

    /// Blocks until all seven days are generated.
    pub async fn generate_plan(&self, request: &GenerateDietPlanRequest) -> Result<DietPlan> {
        let url = self.endpoint("api/diet-plans/generate")?;
        json(self.authed(self.http.post(url))?.json(request)).await
    }

    /// Streams a generation, calling `on_event` with each event and the
    /// progress folded so far. Resolves with the finished plan.
    pub async fn generate_stream<F>(
        &self,
        request: &GenerateDietPlanRequest,
        mut on_event: F,
    ) -> Result<DietPlan>
    where
        F: FnMut(&StreamEvent, &GenerationProgress),
    {
        let url = self.endpoint("api/generate-diet-plan-stream")?;
        let response = send(self.authed(self.http.post(url))?.json(request)).await?;

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut progress = GenerationProgress::default();
        while let Some(chunk) = body.next().await {
            for data in decoder.push(&chunk?) {
                if let Some(done) = handle_event(&data, &mut progress, &mut on_event)? {
                    return Ok(done);
                }
            }
        }
        if let Some(data) = decoder.finish() {
            if let Some(done) = handle_event(&data, &mut progress, &mut on_event)? {
                return Ok(done);
            }
        }
        Err(ClientError::StreamEnded)
    }

    pub async fn download_pdf(&self, id: DietPlanId) -> Result<Download> {
        let url = self.endpoint(&format!("api/diet-plans/{}/pdf", id.0))?;
        let pdf: PdfResponse = json(self.authed(self.http.post(url))?).await?;
        Ok(Download {
            filename: pdf.filename,
            bytes: STANDARD.decode(pdf.pdf_b64)?,
        })
    }

    pub async fn export_csv(&self, id: DietPlanId) -> Result<Download> {
        let url = self.endpoint(&format!("api/diet-plans/{}/csv", id.0))?;
        let response = send(self.authed(self.http.get(url))?).await?;
        let filename = attachment_filename(&response)
            .unwrap_or_else(|| format!("diet-plan-{}.csv", id.0));
        Ok(Download {
            filename,
            bytes: response.bytes().await?.to_vec(),
        })
    }

    pub async fn evaluate_plan(&self, id: DietPlanId) -> Result<EvalReport> {
        let url = self.endpoint(&format!("api/diet-plans/{}/evaluation", id.0))?;
        json(self.authed(self.http.get(url))?).await
    }
}

fn handle_event<F>(
    data: &str,
    progress: &mut GenerationProgress,
    on_event: &mut F,
) -> Result<Option<DietPlan>>
where
    F: FnMut(&StreamEvent, &GenerationProgress),
{
    let event: StreamEvent = serde_json::from_str(data)?;
    debug!(kind = event.kind(), "stream event");
    progress.apply(&event);
    on_event(&event, progress);
    match event {
        StreamEvent::PlanComplete { plan } => Ok(Some(plan)),
        StreamEvent::Error { message } => Err(ClientError::Generation(message)),
        _ => Ok(None),
    }
}

async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&text).unwrap_or_else(|_| {
        ApiError::new(
            ErrorCode::Internal,
            format!("server returned {status}: {}", text.trim()),
        )
    });
    Err(ApiException::from(error).into())
}

async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    Ok(send(request).await?.json().await?)
}

fn attachment_filename(response: &Response) -> Option<String> {
    let value = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)?
        .to_str()
        .ok()?;
    let (_, rest) = value.split_once("filename=")?;
    Some(rest.trim_matches('"').to_string()).filter(|name| !name.is_empty())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
