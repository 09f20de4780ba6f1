//! Remote staging backend: upload, prompt enhancement, generation and
//! refinement calls, plus the health probe and asset download.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{AssetRef, TaskType},
    protocol::{
        BackendOutcome, EnhancePromptRequest, EnhancePromptResponse, GenerateImageRequest,
        GenerateImageResponse, HealthResponse, RefineDesignRequest, RefineDesignResponse,
        UploadResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::{
    error::{RemoteStep, StagingError},
    session::InputFile,
};

const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedPrompt {
    pub sd_prompt: String,
    pub reasoning: String,
    pub task_type: TaskType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinedDesign {
    pub staged: AssetRef,
    pub reasoning: String,
    pub sd_prompt: String,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn base_url(&self) -> &Url;
    async fn upload_input(&self, file: &InputFile) -> Result<AssetRef, StagingError>;
    async fn enhance_prompt(
        &self,
        request: &EnhancePromptRequest,
    ) -> Result<EnhancedPrompt, StagingError>;
    async fn generate_image(&self, request: &GenerateImageRequest)
        -> Result<AssetRef, StagingError>;
    async fn refine_design(
        &self,
        request: &RefineDesignRequest,
    ) -> Result<RefinedDesign, StagingError>;
    async fn fetch_asset(&self, url: &Url) -> Result<Vec<u8>, StagingError>;
    async fn is_healthy(&self) -> bool;
}

/// Turns a decoded body into an `Application` error when it reports
/// `success: false`.
pub fn check_outcome<T: BackendOutcome>(step: RemoteStep, body: T) -> Result<T, StagingError> {
    if body.succeeded() {
        return Ok(body);
    }
    let message = body
        .error_message()
        .map(str::to_string)
        .unwrap_or_else(|| step.fallback_message());
    Err(StagingError::Application { step, message })
}

pub struct HttpBackend {
    http: Client,
    base_url: Url,
    health_timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    fn endpoint(&self, step: RemoteStep, path: &str) -> Result<Url, StagingError> {
        self.base_url
            .join(path)
            .map_err(|err| StagingError::transport(step, format!("invalid endpoint {path}: {err}")))
    }

    fn resolve_asset(&self, step: RemoteStep, raw: &str) -> Result<AssetRef, StagingError> {
        AssetRef::resolve(raw, &self.base_url)
            .map_err(|err| StagingError::unexpected(step, format!("bad image path '{raw}': {err}")))
    }

    async fn decode<T: DeserializeOwned>(
        step: RemoteStep,
        res: reqwest::Response,
    ) -> Result<T, StagingError> {
        let status = res.status();
        if !status.is_success() {
            return Err(StagingError::transport(step, format!("HTTP {status}")));
        }
        res.json::<T>()
            .await
            .map_err(|err| StagingError::unexpected(step, format!("undecodable body: {err}")))
    }

    async fn post_json<Req, Resp>(
        &self,
        step: RemoteStep,
        path: &str,
        body: &Req,
    ) -> Result<Resp, StagingError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(step, path)?;
        debug!(step = %step, %url, "posting backend request");
        let res = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| StagingError::transport(step, err.to_string()))?;
        Self::decode(step, res).await
    }
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn upload_input(&self, file: &InputFile) -> Result<AssetRef, StagingError> {
        let step = RemoteStep::Upload;
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.media_type)
            .map_err(|err| StagingError::transport(step, err.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let res = self
            .http
            .post(self.endpoint(step, "/upload")?)
            .multipart(form)
            .send()
            .await
            .map_err(|err| StagingError::transport(step, err.to_string()))?;
        let body: UploadResponse = Self::decode(step, res).await?;

        let path = body
            .path
            .ok_or_else(|| StagingError::unexpected(step, "response is missing path"))?;
        let display = self.resolve_asset(step, body.url.as_deref().unwrap_or(&path))?;
        Ok(AssetRef::new(path, display.url().clone()))
    }

    async fn enhance_prompt(
        &self,
        request: &EnhancePromptRequest,
    ) -> Result<EnhancedPrompt, StagingError> {
        let step = RemoteStep::Enhance;
        let body: EnhancePromptResponse = self.post_json(step, "/enhance-prompt", request).await?;
        let body = check_outcome(step, body)?;
        let sd_prompt = body
            .sd_prompt
            .ok_or_else(|| StagingError::unexpected(step, "response is missing sd_prompt"))?;
        Ok(EnhancedPrompt {
            sd_prompt,
            reasoning: body.reasoning,
            task_type: body.task_type.unwrap_or_default(),
        })
    }

    async fn generate_image(
        &self,
        request: &GenerateImageRequest,
    ) -> Result<AssetRef, StagingError> {
        let step = RemoteStep::Generate;
        let body: GenerateImageResponse = self.post_json(step, "/generate-image", request).await?;
        let body = check_outcome(step, body)?;
        let image_path = body
            .image_path
            .ok_or_else(|| StagingError::unexpected(step, "response is missing image_path"))?;
        self.resolve_asset(step, &image_path)
    }

    async fn refine_design(
        &self,
        request: &RefineDesignRequest,
    ) -> Result<RefinedDesign, StagingError> {
        let step = RemoteStep::Refine;
        let body: RefineDesignResponse = self.post_json(step, "/refine-design", request).await?;
        let body = check_outcome(step, body)?;
        let image_path = body
            .image_path
            .ok_or_else(|| StagingError::unexpected(step, "response is missing image_path"))?;
        Ok(RefinedDesign {
            staged: self.resolve_asset(step, &image_path)?,
            reasoning: body.reasoning,
            sd_prompt: body.sd_prompt,
        })
    }

    async fn fetch_asset(&self, url: &Url) -> Result<Vec<u8>, StagingError> {
        let step = RemoteStep::Download;
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| StagingError::transport(step, err.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(StagingError::transport(step, format!("HTTP {status}")));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|err| StagingError::transport(step, err.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn is_healthy(&self) -> bool {
        let Ok(url) = self.endpoint(RemoteStep::Health, "/health") else {
            return false;
        };
        let res = match self.http.get(url).timeout(self.health_timeout).send().await {
            Ok(res) => res,
            Err(err) => {
                debug!(error = %err, "backend health probe failed");
                return false;
            }
        };
        match Self::decode::<HealthResponse>(RemoteStep::Health, res).await {
            Ok(body) => body.is_healthy(),
            Err(err) => {
                debug!(error = %err, "backend health probe returned unusable body");
                false
            }
        }
    }
}
