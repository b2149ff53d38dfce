use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use crate::procure::tools::agent::{
    ExtractionModel, ModelRequest, SourceDocument, ToolHandler, tool_declarations,
};
use crate::procure::tools::config::{ApiKey, ModelConfig};
use crate::procure::tools::error::{Result, ToolError};

const API_VERSION: &str = "v1beta";
const PDF_MIME: &str = "application/pdf";
const UPLOAD_POLL_ATTEMPTS: usize = 10;
const UPLOAD_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Gemini client using the Files API for documents and automatic function
/// calling driven from the local side.
pub struct GeminiClient {
    endpoint: String,
    api_key: ApiKey,
    model: String,
    max_tool_rounds: usize,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.as_str().to_string(),
            max_tool_rounds: config.max_tool_rounds,
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{API_VERSION}/{path}", self.endpoint)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/{API_VERSION}/files", self.endpoint)
    }

    /// Uploads one document with the resumable protocol. The returned file
    /// exists remotely but may still be processing.
    #[instrument(level = "debug", skip_all, fields(document = %document.name))]
    fn upload(&self, document: &SourceDocument) -> Result<RemoteFile> {
        let start = self
            .client
            .post(self.upload_url())
            .header("x-goog-api-key", self.api_key.expose())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header(
                "X-Goog-Upload-Header-Content-Length",
                document.bytes.len().to_string(),
            )
            .header("X-Goog-Upload-Header-Content-Type", PDF_MIME)
            .json(&json!({ "file": { "display_name": document.name } }))
            .send()?;
        let start = ensure_success(start)?;
        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ToolError::ExternalService("upload session URL missing".into()))?;

        let finished = self
            .client
            .post(&session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(document.bytes.clone())
            .send()?;
        let envelope: UploadEnvelope = ensure_success(finished)?.json()?;
        debug!(name = %envelope.file.name, state = ?envelope.file.state, "document uploaded");
        Ok(envelope.file)
    }

    /// Polls an uploaded file until the service reports it usable.
    fn wait_until_active(&self, document: &SourceDocument, file: &mut RemoteFile) -> Result<()> {
        for _ in 0..UPLOAD_POLL_ATTEMPTS {
            match file.state.as_deref() {
                Some("ACTIVE") | None => return Ok(()),
                Some("FAILED") => {
                    return Err(ToolError::ExternalService(format!(
                        "processing of '{}' failed",
                        document.name
                    )));
                }
                _ => {
                    thread::sleep(UPLOAD_POLL_INTERVAL);
                    let polled = self
                        .client
                        .get(self.api_url(&file.name))
                        .header("x-goog-api-key", self.api_key.expose())
                        .send()?;
                    *file = ensure_success(polled)?.json()?;
                }
            }
        }

        Err(ToolError::ExternalService(format!(
            "'{}' was not ready after {UPLOAD_POLL_ATTEMPTS} checks",
            document.name
        )))
    }

    /// Uploads every document. Each file is recorded in `uploaded` as soon as
    /// it exists remotely, so the caller can release it even when waiting for
    /// it fails.
    fn upload_all(
        &self,
        documents: &[SourceDocument],
        uploaded: &mut Vec<RemoteFile>,
    ) -> Result<()> {
        for document in documents {
            uploaded.push(self.upload(document)?);
            if let Some(file) = uploaded.last_mut() {
                self.wait_until_active(document, file)?;
            }
        }
        Ok(())
    }

    fn delete(&self, file: &RemoteFile) -> Result<()> {
        let response = self
            .client
            .delete(self.api_url(&file.name))
            .header("x-goog-api-key", self.api_key.expose())
            .send()?;
        ensure_success(response)?;
        Ok(())
    }

    fn delete_all(&self, files: &[RemoteFile]) {
        for file in files {
            match self.delete(file) {
                Ok(()) => debug!(name = %file.name, "deleted uploaded document"),
                Err(error) => {
                    warn!(name = %file.name, %error, "failed to delete uploaded document")
                }
            }
        }
    }

    fn send(&self, contents: &[Content], tools: &Value) -> Result<GenerateResponse> {
        let body = GenerateRequest {
            contents,
            tools: json!([{ "functionDeclarations": tools }]),
            generation_config: json!({ "temperature": 0.0 }),
        };
        let response = self
            .client
            .post(self.api_url(&format!("models/{}:generateContent", self.model)))
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()?;
        Ok(ensure_success(response)?.json()?)
    }

    /// Drives the conversation, executing tool calls until the model answers
    /// with plain text.
    fn converse(
        &self,
        prompt: &str,
        files: &[RemoteFile],
        tools: &mut dyn ToolHandler,
    ) -> Result<String> {
        let declarations = tool_declarations();
        let mut parts = vec![Part::text(prompt)];
        parts.extend(files.iter().map(Part::file));
        let mut contents = vec![Content::new("user", parts)];

        for round in 0..=self.max_tool_rounds {
            let response = self.send(&contents, &declarations)?;
            let content = response.into_content()?;
            let calls: Vec<FunctionCall> = content
                .parts
                .iter()
                .filter_map(|part| part.function_call.clone())
                .collect();

            if calls.is_empty() {
                let text = content.text();
                if text.trim().is_empty() {
                    return Err(ToolError::ExternalService(
                        "model returned no actionable content".into(),
                    ));
                }
                return Ok(text);
            }
            if round == self.max_tool_rounds {
                break;
            }

            info!(round, calls = calls.len(), "model requested tool calls");
            contents.push(content);
            let replies = calls
                .into_iter()
                .map(|call| {
                    let result = tools.call(&call.name, &call.args);
                    Part::function_response(call, result)
                })
                .collect();
            contents.push(Content::new("user", replies));
        }

        Err(ToolError::ExternalService(format!(
            "model kept calling tools after {} rounds",
            self.max_tool_rounds
        )))
    }
}

impl ExtractionModel for GeminiClient {
    #[instrument(
        level = "info",
        skip_all,
        fields(model = %self.model, documents = request.documents.len())
    )]
    fn generate(&self, request: &ModelRequest, tools: &mut dyn ToolHandler) -> Result<String> {
        let mut uploaded = Vec::with_capacity(request.documents.len());
        let result = self
            .upload_all(&request.documents, &mut uploaded)
            .and_then(|()| self.converse(&request.prompt, &uploaded, tools));

        // Uploaded documents are released on success and failure alike.
        self.delete_all(&uploaded);
        result
    }
}

fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ToolError::ExternalService(format!("{status}: {body}")))
}

#[derive(Debug, Deserialize)]
struct UploadEnvelope {
    file: RemoteFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    tools: Value,
    generation_config: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

impl GenerateResponse {
    fn into_content(self) -> Result<Content> {
        let feedback = self.prompt_feedback;
        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            ToolError::ExternalService(match &feedback {
                Some(feedback) => format!("no candidates returned ({feedback})"),
                None => "no candidates returned".into(),
            })
        })?;
        candidate.content.ok_or_else(|| {
            ToolError::ExternalService(format!(
                "candidate without content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Content {
    #[serde(default = "model_role")]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

fn model_role() -> String {
    "model".to_string()
}

impl Content {
    fn new(role: &str, parts: Vec<Part>) -> Self {
        Self {
            role: role.to_string(),
            parts,
        }
    }

    /// Concatenated visible text, skipping thought summaries.
    fn text(&self) -> String {
        self.parts
            .iter()
            .filter(|part| part.extra.get("thought") != Some(&Value::Bool(true)))
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// One content part. Fields the client does not interpret, such as thought
/// signatures, are carried in `extra` so they round-trip to the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    fn file(file: &RemoteFile) -> Self {
        Self {
            file_data: Some(FileData {
                mime_type: file
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| PDF_MIME.to_string()),
                file_uri: file.uri.clone(),
            }),
            ..Self::default()
        }
    }

    fn function_response(call: FunctionCall, result: String) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                id: call.id,
                name: call.name,
                response: json!({ "result": result }),
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procure::tools::config::GeminiModel;

    fn client(endpoint: &str) -> GeminiClient {
        let mut config = ModelConfig::new(ApiKey::new("key").unwrap(), GeminiModel::Flash25);
        config.endpoint = endpoint.to_string();
        GeminiClient::new(&config).unwrap()
    }

    #[test]
    fn urls_are_built_from_trimmed_endpoint() {
        let client = client("http://localhost:8080/");
        assert_eq!(
            client.api_url("models/gemini-2.5-flash:generateContent"),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(client.upload_url(), "http://localhost:8080/upload/v1beta/files");
    }

    #[test]
    fn function_calls_keep_unknown_fields() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "functionCall": {"name": "lookup_tool", "args": {"file_key": "a.xlsx"}},
                        "thoughtSignature": "abc"
                    }]
                },
                "finishReason": "STOP"
            }]
        });
        let response: GenerateResponse = serde_json::from_value(raw).unwrap();
        let content = response.into_content().unwrap();
        let part = &content.parts[0];
        assert_eq!(part.function_call.as_ref().unwrap().name, "lookup_tool");

        let echoed = serde_json::to_value(part).unwrap();
        assert_eq!(echoed["thoughtSignature"], "abc");
        assert!(echoed.get("text").is_none());
    }

    #[test]
    fn function_responses_wrap_the_result() {
        let call = FunctionCall {
            id: None,
            name: "lookup_tool".into(),
            args: Value::Null,
        };
        let part = Part::function_response(call, "V100".into());
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"functionResponse": {"name": "lookup_tool", "response": {"result": "V100"}}})
        );
    }

    #[test]
    fn thought_parts_are_not_returned_as_text() {
        let content: Content = serde_json::from_value(json!({
            "role": "model",
            "parts": [
                {"text": "planning...", "thought": true},
                {"text": "Done. "},
                {"text": "CSV generated."}
            ]
        }))
        .unwrap();
        assert_eq!(content.text(), "Done. CSV generated.");
    }

    #[test]
    fn missing_candidates_are_a_service_failure() {
        let response: GenerateResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert!(matches!(
            response.into_content(),
            Err(ToolError::ExternalService(_))
        ));
    }
}
