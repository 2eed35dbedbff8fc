// API client module: a small blocking HTTP client that talks to an Open WebUI
// instance. It finds which knowledge endpoint variant the server exposes,
// uploads files and links them into a knowledge collection.
//
// Every operation is best effort: failures are logged and reported as
// `None`/`false`, never returned as errors, so a batch keeps going.

use crate::config::ClientSettings;
use crate::error::{Result, UploadError};
use crate::files::is_allowed_file;
use anyhow::Context;
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Listing paths, in the order they are tried.
pub const LIST_ENDPOINTS: &[&str] = &[
    "/api/v1/workspace/knowledge",
    "/api/v1/knowledges",
    "/api/v1/knowledge",
];

/// Creation paths tried after `<discovered base>/create`.
pub const CREATE_ENDPOINTS: &[&str] = &[
    "/api/v1/workspace/knowledge/create",
    "/api/v1/knowledges/create",
    "/api/v1/knowledge/create",
];

/// Base used for creation when listing never succeeded.
const DEFAULT_KNOWLEDGE_BASE: &str = "/api/v1/workspace/knowledge";

pub const UPLOAD_ENDPOINT: &str = "/api/v1/files/";

/// Longest slice of a response body kept in error messages.
const BODY_PREVIEW_LEN: usize = 200;

/// A knowledge collection as returned by the listing endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct KnowledgeCollection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize, Debug)]
struct CreateKnowledgeRequest<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Deserialize, Debug)]
struct CreatedKnowledge {
    id: String,
}

/// Body of the link call. Only `file_id` is sent: the server's vector store
/// rejects the request when a metadata field is present, even empty.
#[derive(Serialize, Debug)]
struct AddFileRequest<'a> {
    file_id: &'a str,
}

/// Raw response of `POST /api/v1/files/`.
///
/// Only `id` is required. The server has stored the file once it answers, so
/// the informational fields fall back to `None` when they have an unexpected type.
#[derive(Deserialize, Debug)]
struct FileUploadResponse {
    id: String,
    #[serde(default, deserialize_with = "lenient")]
    filename: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    meta: Option<FileMeta>,
    #[serde(default, deserialize_with = "lenient")]
    data: Option<FileData>,
}

#[derive(Deserialize, Debug, Default)]
struct FileMeta {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    size: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct FileData {
    #[serde(default, deserialize_with = "lenient")]
    status: Option<String>,
}

/// Decode a field as `T`, or `None` if it holds anything else.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// A file accepted by the server, not yet linked to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub id: String,
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub status: String,
}

impl From<FileUploadResponse> for UploadedFile {
    fn from(res: FileUploadResponse) -> Self {
        let meta = res.meta.unwrap_or_default();
        UploadedFile {
            id: res.id,
            filename: res.filename.or(meta.name),
            size: meta.size,
            status: res
                .data
                .and_then(|d| d.status)
                .unwrap_or_else(|| "unknown".into()),
        }
    }
}

/// Terminal state of one file in a batch.
///
/// A file moves `pending -> uploaded -> linked`; it stops at `UploadFailed`
/// when the upload is rejected (locally or by the server) and at `LinkFailed`
/// when every link attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Linked,
    UploadFailed,
    LinkFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub state: FileState,
}

/// Aggregate of one batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub outcomes: Vec<FileOutcome>,
    /// Set when the run was stopped before every file was processed.
    pub interrupted: bool,
}

impl BatchResult {
    fn new(total: usize) -> Self {
        BatchResult {
            total,
            ..Default::default()
        }
    }

    /// The whole batch fails when the target collection is unavailable.
    fn collection_unavailable(total: usize, err: &UploadError) -> Self {
        BatchResult {
            total,
            failed: total,
            errors: vec![err.to_string()],
            ..Default::default()
        }
    }

    fn record(&mut self, path: &Path, state: FileState) {
        match state {
            FileState::Linked => self.success += 1,
            FileState::UploadFailed => {
                self.failed += 1;
                self.errors
                    .push(format!("Failed to upload {}", path.display()));
            }
            FileState::LinkFailed => {
                self.failed += 1;
                self.errors.push(format!(
                    "Failed to add {} to knowledge collection",
                    path.display()
                ));
            }
        }
        self.outcomes.push(FileOutcome {
            path: path.to_path_buf(),
            state,
        });
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }
}

/// Blocking client bound to one Open WebUI instance and one API key.
pub struct ApiClient {
    client: Client,
    base_url: String,
    settings: ClientSettings,
    /// Listing path that answered with JSON, reused as base for creation.
    knowledge_endpoint: Option<String>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl ApiClient {
    /// Build a client for `base_url` authenticating with `api_key`.
    pub fn new(base_url: &str, api_key: &str, settings: ClientSettings) -> anyhow::Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .context("API key contains characters not allowed in a header")?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            settings,
            knowledge_endpoint: None,
            interrupt: None,
        })
    }

    /// Stop batches between files once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// The listing path discovered so far, if any.
    pub fn knowledge_endpoint(&self) -> Option<&str> {
        self.knowledge_endpoint.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }

    /// Send a request and turn non-2xx statuses into errors.
    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let res = req.send()?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            return Err(UploadError::Status {
                status,
                body: preview(&body),
            });
        }
        Ok(res)
    }

    /// Decode a JSON body into `T`. HTML pages (the web UI answering an
    /// unknown API path) and bodies of the wrong shape are protocol mismatches.
    fn json_body<T: DeserializeOwned>(path: &str, res: Response) -> Result<T> {
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if content_type.contains("text/html") {
            return Err(UploadError::ProtocolMismatch {
                path: path.to_string(),
                reason: "server returned an HTML page".into(),
            });
        }

        let text = res.text()?;
        serde_json::from_str(&text).map_err(|e| UploadError::ProtocolMismatch {
            path: path.to_string(),
            reason: format!("{} (body: {})", e, preview(&text)),
        })
    }

    /// Try each candidate path in order and return the first one whose
    /// response decodes as `T`, together with the decoded value.
    fn probe<T, F>(&self, candidates: &[String], build: F) -> Option<(String, T)>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder,
    {
        for path in candidates {
            let outcome = self
                .send(build(&self.url(path)))
                .and_then(|res| Self::json_body::<T>(path, res));
            match outcome {
                Ok(value) => return Some((path.clone(), value)),
                Err(e) if e.is_wrong_path() => {
                    tracing::debug!(path = %path, error = %e, "Endpoint variant not available");
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Endpoint variant failed");
                }
            }
        }
        None
    }

    /// List all knowledge collections, or an empty list when no endpoint
    /// variant answers with JSON.
    pub fn list_knowledge_collections(&mut self) -> Vec<KnowledgeCollection> {
        let candidates: Vec<String> = LIST_ENDPOINTS.iter().map(|s| s.to_string()).collect();
        let client = &self.client;
        let found = self.probe::<Vec<serde_json::Value>, _>(&candidates, |url| client.get(url));

        let Some((path, entries)) = found else {
            tracing::error!(
                "Failed to list knowledge collections: all endpoint variations returned non-JSON responses"
            );
            return Vec::new();
        };

        tracing::debug!(path = %path, count = entries.len(), "Listed knowledge collections");
        self.knowledge_endpoint = Some(path);

        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(collection) => Some(collection),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed knowledge collection entry");
                    None
                }
            })
            .collect()
    }

    /// Id of the collection whose name matches `name` exactly.
    pub fn get_knowledge_collection_id(&mut self, name: &str) -> Option<String> {
        self.list_knowledge_collections()
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    /// Create a collection and return its id.
    pub fn create_knowledge_collection(&mut self, name: &str, description: &str) -> Option<String> {
        let base = self
            .knowledge_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_KNOWLEDGE_BASE.to_string());

        let mut candidates = vec![format!("{}/create", base)];
        for path in CREATE_ENDPOINTS {
            if !candidates.iter().any(|c| c == path) {
                candidates.push(path.to_string());
            }
        }

        let payload = CreateKnowledgeRequest { name, description };
        let client = &self.client;
        let found = self.probe::<CreatedKnowledge, _>(&candidates, |url| {
            client.post(url).json(&payload)
        });

        match found {
            Some((path, created)) => {
                tracing::info!(name, id = %created.id, "Created knowledge collection");
                if self.knowledge_endpoint.is_none() {
                    let discovered = path.strip_suffix("/create").unwrap_or(&path);
                    self.knowledge_endpoint = Some(discovered.to_string());
                }
                Some(created.id)
            }
            None => {
                tracing::error!(
                    name,
                    "Failed to create knowledge collection: all endpoint variations failed"
                );
                None
            }
        }
    }

    /// Upload one file as multipart field `file`.
    ///
    /// The multipart content type and boundary are set by reqwest; only the
    /// JSON calls carry `application/json`.
    pub fn try_upload_file(&self, path: &Path) -> Result<UploadedFile> {
        if !path.is_file() {
            return Err(UploadError::Validation {
                path: path.to_path_buf(),
                reason: "file not found".into(),
            });
        }
        if !is_allowed_file(path) {
            return Err(UploadError::Validation {
                path: path.to_path_buf(),
                reason: "file type not allowed".into(),
            });
        }

        let form = multipart::Form::new().part("file", file_part(path)?);

        let res = self.send(self.client.post(self.url(UPLOAD_ENDPOINT)).multipart(form))?;
        let body: FileUploadResponse = Self::json_body(UPLOAD_ENDPOINT, res)?;
        Ok(body.into())
    }

    /// Upload one file and return the server's file id.
    pub fn upload_file(&self, path: &Path) -> Option<String> {
        match self.try_upload_file(path) {
            Ok(file) => {
                tracing::info!(
                    path = %path.display(),
                    id = %file.id,
                    filename = file.filename.as_deref().unwrap_or("?"),
                    size = ?file.size,
                    status = %file.status,
                    "Uploaded file"
                );
                Some(file.id)
            }
            Err(UploadError::Validation { reason, .. }) if path.is_file() => {
                tracing::debug!(path = %path.display(), reason = %reason, "Skipping file");
                None
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Upload failed");
                None
            }
        }
    }

    /// Link an uploaded file to a collection, retrying on failure.
    pub fn add_file_to_knowledge(&self, knowledge_id: &str, file_id: &str) -> bool {
        let path = format!("/api/v1/knowledge/{}/file/add", knowledge_id);
        let payload = AddFileRequest { file_id };
        let attempts = self.settings.retries;

        for attempt in 1..=attempts {
            match self.send(self.client.post(self.url(&path)).json(&payload)) {
                Ok(_) => {
                    tracing::info!(file_id, knowledge_id, "Added file to knowledge collection");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(file_id, attempt, attempts, error = %e, "Linking attempt failed");
                }
            }

            if attempt < attempts {
                tracing::debug!(delay = ?self.settings.retry_delay, "Waiting before retry");
                thread::sleep(self.settings.retry_delay);
            }
        }

        tracing::error!(
            file_id,
            knowledge_id,
            attempts,
            "Failed to add file to knowledge collection"
        );
        false
    }

    /// Find the collection, creating it when allowed.
    fn resolve_collection(
        &mut self,
        name: &str,
        create_if_missing: bool,
        description: &str,
    ) -> Result<String> {
        if let Some(id) = self.get_knowledge_collection_id(name) {
            return Ok(id);
        }
        if !create_if_missing {
            return Err(UploadError::NotFound(name.to_string()));
        }
        self.create_knowledge_collection(name, description)
            .ok_or_else(|| UploadError::CreateFailed(name.to_string()))
    }

    fn process_file(&self, knowledge_id: &str, path: &Path) -> FileState {
        let Some(file_id) = self.upload_file(path) else {
            return FileState::UploadFailed;
        };

        thread::sleep(self.settings.settle_delay);

        if self.add_file_to_knowledge(knowledge_id, &file_id) {
            FileState::Linked
        } else {
            FileState::LinkFailed
        }
    }

    /// Upload `paths` in order into the collection named `knowledge_name`.
    pub fn upload_files_to_knowledge<P: AsRef<Path>>(
        &mut self,
        knowledge_name: &str,
        paths: &[P],
        create_if_missing: bool,
        description: &str,
    ) -> BatchResult {
        self.upload_files_to_knowledge_with_progress(
            knowledge_name,
            paths,
            create_if_missing,
            description,
            |_| {},
        )
    }

    /// Like [`ApiClient::upload_files_to_knowledge`], calling `on_file` after
    /// each file reaches its terminal state.
    pub fn upload_files_to_knowledge_with_progress<P, F>(
        &mut self,
        knowledge_name: &str,
        paths: &[P],
        create_if_missing: bool,
        description: &str,
        mut on_file: F,
    ) -> BatchResult
    where
        P: AsRef<Path>,
        F: FnMut(&FileOutcome),
    {
        let knowledge_id =
            match self.resolve_collection(knowledge_name, create_if_missing, description) {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!(error = %e, "Knowledge collection unavailable");
                    return BatchResult::collection_unavailable(paths.len(), &e);
                }
            };

        let mut result = BatchResult::new(paths.len());
        for path in paths {
            if self.is_interrupted() {
                tracing::warn!(
                    processed = result.outcomes.len(),
                    total = result.total,
                    "Upload interrupted"
                );
                result.interrupted = true;
                break;
            }

            let path = path.as_ref();
            let state = self.process_file(&knowledge_id, path);
            result.record(path, state);
            if let Some(outcome) = result.outcomes.last() {
                on_file(outcome);
            }
        }
        result
    }
}

/// Open `path` as a multipart part; the mime type is guessed from the extension.
fn file_part(path: &Path) -> Result<multipart::Part> {
    multipart::Part::file(path).map_err(|source| UploadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn preview(text: &str) -> String {
    text.chars().take(BODY_PREVIEW_LEN).collect()
}
