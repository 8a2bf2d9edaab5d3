//! Upload engine
//!
//! Drives a [`TransferSession`] to completion for one local file:
//!
//! 1. `POST /<collection>/` registers the object and yields its identifier.
//! 2. For each chunk, in ascending order: `POST .../<singular>chunk/` registers
//!    the chunk, then the bytes are posted as multipart to
//!    `.../<singular>chunk/<chunk_id>/chunk/`.
//! 3. `POST .../finish_upload/` with the metadata of the last chunk.
//!
//! Chunk N+1 is never requested before both calls for chunk N succeeded, so
//! the server can assemble the object by concatenation. The first failure
//! ends the transfer; nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use runpilot::config::UploadConfig;
//! use runpilot::routes::Routes;
//! use runpilot::transport::{HttpTransport, TransportConfig};
//! use runpilot::upload::{SourceFile, UploadEngine, UploadTarget};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(TransportConfig {
//!     token: Some("secret".into()),
//!     user_agent: "runpilot".into(),
//!     timeout: None,
//! })?;
//! let routes = Routes::new("https://api.example.com/v1")?;
//! let engine = UploadEngine::new(transport, routes, UploadConfig::default());
//!
//! let source = SourceFile::open("dist/code.zip").await?;
//! let outcome = engine.upload(source, &UploadTarget::package("proj123")).await;
//! println!("{}", outcome.message);
//! # Ok(())
//! # }
//! ```

use super::payload::{
    guess_mime_type, transfer_identifier, RegisterChunkRequest, RegisterUploadRequest,
    RegisteredObject, TransferMetadata,
};
use super::planner::{ChunkDescriptor, ChunkPlanner};
use super::session::TransferSession;
use super::source::SourceFile;
use super::{ChunkStep, UploadError, UploadOutcome, UploadTarget};
use crate::config::UploadConfig;
use crate::metrics;
use crate::routes::Routes;
use crate::transport::HttpTransport;
use reqwest::{Response, StatusCode};
use std::time::Instant;

/// Per-transfer values shared by every chunk's metadata
struct TransferContext {
    chunk_size: u64,
    total_size: u64,
    total_chunks: u64,
    mime_type: String,
    identifier: String,
    filename: String,
}

impl TransferContext {
    fn metadata(&self, chunk: &ChunkDescriptor) -> TransferMetadata {
        TransferMetadata {
            chunk_number: chunk.number(),
            chunk_size: self.chunk_size,
            current_chunk_size: chunk.length,
            total_size: self.total_size,
            mime_type: self.mime_type.clone(),
            identifier: self.identifier.clone(),
            filename: self.filename.clone(),
            relative_path: self.filename.clone(),
            total_chunks: self.total_chunks,
        }
    }
}

/// Chunked upload engine
pub struct UploadEngine {
    transport: HttpTransport,
    routes: Routes,
    options: UploadConfig,
}

impl UploadEngine {
    /// Create a new engine
    pub fn new(transport: HttpTransport, routes: Routes, options: UploadConfig) -> Self {
        Self {
            transport,
            routes,
            options,
        }
    }

    /// Upload `source` to `target`
    ///
    /// Never panics or propagates: every failure is folded into the returned
    /// outcome with a user-facing message.
    #[tracing::instrument(
        name = "upload",
        skip(self, source, target),
        fields(
            upload.target = %target.kind,
            upload.parent = %target.parent_suuid,
            upload.file = %source.filename(),
            upload.bytes = source.size(),
            upload.id = tracing::field::Empty
        )
    )]
    pub async fn upload(&self, mut source: SourceFile, target: &UploadTarget) -> UploadOutcome {
        let start_time = Instant::now();
        let planner = ChunkPlanner::new(source.size(), self.options.chunk_size);
        let mut session = TransferSession::new(target.kind, planner.total_chunks());

        let result = self.run(&mut source, target, planner, &mut session).await;

        let duration = start_time.elapsed();
        metrics::record_transfer_duration("upload", duration.as_secs_f64());
        metrics::record_upload(target.kind.singular(), result.is_ok(), source.size());

        match result {
            Ok(()) => {
                tracing::info!(
                    id = session.remote_object_id().unwrap_or_default(),
                    chunks = session.chunks_uploaded(),
                    duration_ms = duration.as_millis(),
                    "Upload completed"
                );
                UploadOutcome {
                    ok: true,
                    message: format!("{} is uploaded", target.kind),
                    status: None,
                    remote_object_id: session.remote_object_id().map(str::to_string),
                }
            }
            Err(e) => {
                session.fail();
                tracing::error!(
                    error = %e,
                    chunks_uploaded = session.chunks_uploaded(),
                    total_chunks = session.total_chunks(),
                    "Upload failed"
                );
                if self.options.abort_on_failure {
                    self.abort(&session).await;
                }
                UploadOutcome {
                    ok: false,
                    message: e.to_string(),
                    status: e.status(),
                    remote_object_id: session.remote_object_id().map(str::to_string),
                }
            }
        }
    }

    async fn run(
        &self,
        source: &mut SourceFile,
        target: &UploadTarget,
        planner: ChunkPlanner,
        session: &mut TransferSession,
    ) -> Result<(), UploadError> {
        session.begin_register()?;
        let id = self.register(source, target).await?;
        tracing::Span::current().record("upload.id", id.as_str());
        session.registered(id.clone())?;

        let context = TransferContext {
            chunk_size: planner.chunk_size(),
            total_size: source.size(),
            total_chunks: planner.total_chunks(),
            mime_type: guess_mime_type(source.filename()),
            identifier: transfer_identifier(source.size(), source.filename()),
            filename: source.filename().to_string(),
        };

        let mut last_metadata = None;
        for chunk in planner {
            let metadata = context.metadata(&chunk);
            self.upload_chunk(source, target, &id, &chunk, metadata.clone())
                .await?;
            session.chunk_uploaded()?;
            metrics::record_chunk(target.kind.singular());
            last_metadata = Some(metadata);
        }

        session.begin_finish()?;
        // The planner always yields at least one chunk.
        if let Some(metadata) = last_metadata {
            self.finish(target, &id, &metadata).await?;
        }
        session.finished()?;
        Ok(())
    }

    #[tracing::instrument(
        name = "upload.register",
        skip(self, source, target),
        fields(http.status_code = tracing::field::Empty),
        err
    )]
    async fn register(
        &self,
        source: &SourceFile,
        target: &UploadTarget,
    ) -> Result<String, UploadError> {
        let mut request = RegisterUploadRequest::new(
            source.filename(),
            source.size(),
            target.kind.parent_field(),
            &target.parent_suuid,
        );
        request.description = target.description.clone();
        request.job_name = target.job_name.clone();

        let url = self.routes.collection(target.kind)?;
        let response = self.transport.post_json(url, &request).await?;
        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            return Err(UploadError::RegisterFailed {
                kind: target.kind,
                status: status.as_u16(),
            });
        }

        let registered: RegisteredObject = parse_json(response).await;
        registered
            .identifier()
            .map(str::to_string)
            .ok_or(UploadError::MissingIdentifier { kind: target.kind })
    }

    #[tracing::instrument(
        name = "upload.chunk",
        skip(self, source, target, metadata),
        fields(chunk.number = chunk.number(), chunk.bytes = chunk.length, chunk.last = chunk.is_last),
        err
    )]
    async fn upload_chunk(
        &self,
        source: &mut SourceFile,
        target: &UploadTarget,
        id: &str,
        chunk: &ChunkDescriptor,
        metadata: TransferMetadata,
    ) -> Result<(), UploadError> {
        let chunk_failed = |step: ChunkStep, status: StatusCode| UploadError::ChunkFailed {
            kind: target.kind,
            id: id.to_string(),
            chunk: chunk.number(),
            step,
            status: status.as_u16(),
        };

        let url = self.routes.chunks(target.kind, id)?;
        let response = self
            .transport
            .post_json(url, &RegisterChunkRequest::from(chunk))
            .await?;
        if !response.status().is_success() {
            return Err(chunk_failed(ChunkStep::Register, response.status()));
        }

        let registered: RegisteredObject = parse_json(response).await;
        let chunk_id = registered
            .uuid
            .as_deref()
            .or(registered.suuid.as_deref())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| UploadError::MissingChunkIdentifier {
                kind: target.kind,
                id: id.to_string(),
                chunk: chunk.number(),
            })?;

        let bytes = source.read_chunk(chunk).await?;
        let url = self.routes.chunk_upload(target.kind, id, &chunk_id)?;
        let response = self
            .transport
            .post_multipart(url, metadata.into_form(bytes))
            .await?;
        if !response.status().is_success() {
            return Err(chunk_failed(ChunkStep::Upload, response.status()));
        }

        tracing::debug!(chunk_id = %chunk_id, "Chunk uploaded");
        Ok(())
    }

    #[tracing::instrument(
        name = "upload.finish",
        skip(self, target, metadata),
        fields(http.status_code = tracing::field::Empty),
        err
    )]
    async fn finish(
        &self,
        target: &UploadTarget,
        id: &str,
        metadata: &TransferMetadata,
    ) -> Result<(), UploadError> {
        let url = self.routes.finish_upload(target.kind, id)?;
        let response = self.transport.post_json(url, metadata).await?;
        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if status != StatusCode::OK {
            return Err(UploadError::FinishFailed {
                kind: target.kind,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Best-effort removal of a partially uploaded object
    async fn abort(&self, session: &TransferSession) {
        let Some(id) = session.remote_object_id() else {
            return;
        };
        let url = match self.routes.object(session.target_kind(), id) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot build cleanup URL");
                return;
            }
        };
        match self.transport.delete(url).await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(id = %id, "Removed partially uploaded object");
            }
            Ok(response) => {
                tracing::warn!(
                    id = %id,
                    status = response.status().as_u16(),
                    "Cleanup of partially uploaded object was rejected"
                );
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Cleanup of partially uploaded object failed");
            }
        }
    }
}

/// Parse a JSON body, treating an empty or malformed body as no fields
async fn parse_json(response: Response) -> RegisteredObject {
    match response.json::<RegisteredObject>().await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Response body is not the expected JSON");
            RegisteredObject::default()
        }
    }
}
