//! src/services/blob_relay.rs
//!
//! BlobRelay — moves bytes to and from the remote blob backend without
//! buffering whole downloads in memory. The backend is shared, rate-limited
//! infrastructure: the relay keeps at most one remote fetch in flight per
//! archive and never retries on its own; retries, if any, belong to the
//! caller's collaborators.

use async_zip::{Compression, ZipEntryBuilder, tokio::write::ZipFileWriter};
use bytes::Bytes;
use futures::{Stream, StreamExt, stream::BoxStream};
use serde::Deserialize;
use std::{io, time::Duration};
use tokio::io::DuplexStream;
use tracing::{debug, warn};

use crate::errors::{DriveError, DriveResult};

/// Connect timeout for remote calls, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Per-request read timeout, in seconds. Kept generous: a 50 MiB object on a
/// slow link takes a while, and mid-stream stalls are surfaced by the
/// transport, not by relay policy.
const READ_TIMEOUT_SECS: u64 = 120;

/// User agent presented to the blob backend.
const USER_AGENT: &str = "cloud-drive/0.1";

/// Upper bound on handles per bundled archive, checked before any fetch.
pub const MAX_ARCHIVE_ENTRIES: usize = 200;

/// Buffer size of the in-process pipe behind archive streaming.
const ARCHIVE_PIPE_CAPACITY: usize = 64 * 1024;

/// One requested entry of a bundled archive download.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    /// Remote handle to fetch.
    pub handle: String,
    /// Name the entry gets inside the archive.
    pub display_name: String,
}

/// An open download from the remote backend.
///
/// `stream` is forward-only and lazily consumed; dropping it releases the
/// upstream connection. When `range` is set the stream emits exactly that
/// inclusive sub-range and `total_size` still reports the full object size,
/// which is what a transport boundary needs to answer a range request.
pub struct BlobDownload {
    pub stream: BoxStream<'static, io::Result<Bytes>>,
    pub total_size: u64,
    pub range: Option<(u64, u64)>,
}

impl std::fmt::Debug for BlobDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobDownload")
            .field("stream", &"<stream>")
            .field("total_size", &self.total_size)
            .field("range", &self.range)
            .finish()
    }
}

#[derive(Deserialize)]
struct StoreResponse {
    id: String,
}

/// HTTP relay in front of the remote blob backend.
#[derive(Clone)]
pub struct BlobRelay {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl BlobRelay {
    /// Build a relay for the backend at `base_url`, authenticating with
    /// `token` on every call.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> DriveResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| DriveError::Internal(format!("building relay client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn object_url(&self, handle: &str) -> String {
        format!("{}/objects/{}", self.base_url, handle)
    }

    /// Upload a byte buffer, returning the opaque handle the backend minted.
    ///
    /// A single call, no internal retry. Any failure is fatal for the
    /// surrounding operation and carries the upstream status where one was
    /// received.
    pub async fn store(&self, bytes: Bytes, filename: &str, mime_type: &str) -> DriveResult<String> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|err| DriveError::InvalidArgument(format!("content type: {err}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/objects", self.base_url))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|err| DriveError::ServiceUnavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DriveError::ServiceUnavailable(format!(
                "upload rejected with status {status}"
            )));
        }

        let body: StoreResponse = response
            .json()
            .await
            .map_err(|err| DriveError::ServiceUnavailable(format!("decoding upload reply: {err}")))?;

        Ok(body.id)
    }

    /// Open a streaming download, optionally limited to an inclusive byte
    /// range.
    ///
    /// The backend is asked to honor the range itself; if it answers with the
    /// whole object instead, the relay enforces the range with a forward-only
    /// skip/take adapter so the contract holds either way. An unsatisfiable
    /// range (`start > end` or `end >= total_size`) is rejected.
    pub async fn fetch_stream(
        &self,
        handle: &str,
        range: Option<(u64, u64)>,
    ) -> DriveResult<BlobDownload> {
        if let Some((start, end)) = range {
            if start > end {
                return Err(DriveError::InvalidArgument(
                    "range start exceeds range end".into(),
                ));
            }
        }

        let mut request = self
            .client
            .get(self.object_url(handle))
            .bearer_auth(&self.token);
        if let Some((start, end)) = range {
            request = request.header(reqwest::header::RANGE, format!("bytes={start}-{end}"));
        }

        let response = request
            .send()
            .await
            .map_err(|err| DriveError::ServiceUnavailable(err.to_string()))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => return Err(DriveError::NotFound("blob".into())),
            reqwest::StatusCode::RANGE_NOT_SATISFIABLE => {
                return Err(DriveError::InvalidArgument(
                    "requested range not satisfiable".into(),
                ));
            }
            status if !status.is_success() => {
                return Err(DriveError::ServiceUnavailable(format!(
                    "fetch rejected with status {status}"
                )));
            }
            _ => {}
        }

        let partial = response.status() == reqwest::StatusCode::PARTIAL_CONTENT;
        let content_range_total = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        let content_length = response.content_length();

        let raw = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));

        if partial {
            let total_size = content_range_total
                .or(content_length)
                .ok_or_else(|| DriveError::ServiceUnavailable("no size in range reply".into()))?;
            return Ok(BlobDownload {
                stream: raw.boxed(),
                total_size,
                range,
            });
        }

        let total_size = content_length
            .ok_or_else(|| DriveError::ServiceUnavailable("no content length in reply".into()))?;

        match range {
            None => Ok(BlobDownload {
                stream: raw.boxed(),
                total_size,
                range: None,
            }),
            Some((start, end)) => {
                if end >= total_size {
                    return Err(DriveError::InvalidArgument(
                        "requested range not satisfiable".into(),
                    ));
                }
                // Backend ignored the Range header; enforce it here.
                let clamped = clamp_stream(raw, start, end - start + 1);
                Ok(BlobDownload {
                    stream: clamped.boxed(),
                    total_size,
                    range: Some((start, end)),
                })
            }
        }
    }

    /// Fetch a whole object into memory. Used for archive entries, which are
    /// bounded by the per-object size ceiling.
    async fn fetch_bytes(&self, handle: &str) -> DriveResult<Bytes> {
        let download = self.fetch_stream(handle, None).await?;
        let mut buf = Vec::with_capacity(download.total_size as usize);
        let mut stream = download.stream;
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }

    /// Reachability probe for readiness checks. Any HTTP answer from the
    /// backend counts; only a transport-level failure is reported.
    pub async fn ping(&self) -> DriveResult<()> {
        self.client
            .get(&self.base_url)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| DriveError::ServiceUnavailable(err.to_string()))
    }

    /// Best-effort remote release of a stored object.
    ///
    /// Permanent deletion paths call this so the backend does not accumulate
    /// orphaned objects; callers treat failures as log-and-continue.
    pub async fn delete(&self, handle: &str) -> DriveResult<()> {
        let response = self
            .client
            .delete(self.object_url(handle))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| DriveError::ServiceUnavailable(err.to_string()))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(DriveError::ServiceUnavailable(format!(
                "delete rejected with status {status}"
            )))
        }
    }

    /// Bundle several handles into a zip stream, tolerant of per-entry
    /// failures.
    ///
    /// Entries are fetched strictly one at a time, appended and flushed as
    /// they arrive, so memory stays bounded by a single object. A failed
    /// fetch becomes a small diagnostic text entry in place of the file and
    /// the bundle continues. Bundles over [`MAX_ARCHIVE_ENTRIES`] are
    /// rejected before the first fetch.
    pub fn build_archive(&self, entries: Vec<ArchiveEntry>) -> DriveResult<DuplexStream> {
        if entries.len() > MAX_ARCHIVE_ENTRIES {
            return Err(DriveError::InvalidArgument(format!(
                "archive limited to {MAX_ARCHIVE_ENTRIES} entries, got {}",
                entries.len()
            )));
        }

        let (writer, reader) = tokio::io::duplex(ARCHIVE_PIPE_CAPACITY);
        let relay = self.clone();

        tokio::spawn(async move {
            let mut zip = ZipFileWriter::with_tokio(writer);
            for entry in entries {
                let (name, data) = match relay.fetch_bytes(&entry.handle).await {
                    Ok(bytes) => (entry.display_name.clone(), bytes),
                    Err(err) => {
                        warn!(
                            handle = %entry.handle,
                            error = %err,
                            "archive entry fetch failed, writing diagnostic entry"
                        );
                        let note =
                            format!("failed to fetch `{}`: {}", entry.display_name, err);
                        (
                            format!("{}.error.txt", entry.display_name),
                            Bytes::from(note.into_bytes()),
                        )
                    }
                };
                let builder = ZipEntryBuilder::new(name.into(), Compression::Deflate);
                if let Err(err) = zip.write_entry_whole(builder, &data).await {
                    // Receiver hung up or the pipe broke; nothing left to do.
                    debug!(error = %err, "archive stream aborted");
                    return;
                }
            }
            if let Err(err) = zip.close().await {
                debug!(error = %err, "closing archive stream failed");
            }
        });

        Ok(reader)
    }
}

/// Forward-only skip/take over a byte stream: drop `skip` bytes, then pass
/// through exactly `len` bytes and end.
fn clamp_stream<S>(stream: S, skip: u64, len: u64) -> impl Stream<Item = io::Result<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    stream
        .scan((skip, len), |state, item| {
            let out = match item {
                Err(err) => Some(Err(err)),
                Ok(chunk) => {
                    if state.1 == 0 {
                        return futures::future::ready(None);
                    }
                    let chunk_len = chunk.len() as u64;
                    if state.0 >= chunk_len {
                        state.0 -= chunk_len;
                        Some(Ok(Bytes::new()))
                    } else {
                        let begin = state.0 as usize;
                        state.0 = 0;
                        let take = (chunk_len - begin as u64).min(state.1) as usize;
                        state.1 -= take as u64;
                        Some(Ok(chunk.slice(begin..begin + take)))
                    }
                }
            };
            futures::future::ready(out)
        })
        .filter(|item| futures::future::ready(!matches!(item, Ok(chunk) if chunk.is_empty())))
}

/// Extract the total size from a `Content-Range: bytes 0-499/1234` header.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
pub(crate) mod test_backend {
    //! In-memory blob backend served over HTTP, used by relay and file
    //! service tests. Honors `Range` requests the way a real backend would.

    use axum::{
        Router,
        body::Body,
        extract::{Multipart, Path, State},
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
        routing::{get, post},
    };
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };
    use uuid::Uuid;

    type Blobs = Arc<Mutex<HashMap<String, Vec<u8>>>>;

    #[derive(Clone)]
    pub(crate) struct StubBackend {
        pub(crate) base_url: String,
        blobs: Blobs,
    }

    impl StubBackend {
        pub(crate) fn insert(&self, handle: &str, data: &[u8]) {
            self.blobs
                .lock()
                .unwrap()
                .insert(handle.to_string(), data.to_vec());
        }

        pub(crate) fn contains(&self, handle: &str) -> bool {
            self.blobs.lock().unwrap().contains_key(handle)
        }

        pub(crate) fn len(&self) -> usize {
            self.blobs.lock().unwrap().len()
        }
    }

    async fn upload(State(blobs): State<Blobs>, mut multipart: Multipart) -> Response {
        while let Some(field) = multipart.next_field().await.unwrap() {
            if field.name() == Some("file") {
                let data = field.bytes().await.unwrap();
                let id = Uuid::new_v4().to_string();
                blobs.lock().unwrap().insert(id.clone(), data.to_vec());
                return axum::Json(serde_json::json!({ "id": id })).into_response();
            }
        }
        StatusCode::BAD_REQUEST.into_response()
    }

    async fn download(
        State(blobs): State<Blobs>,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> Response {
        let data = match blobs.lock().unwrap().get(&id) {
            Some(data) => data.clone(),
            None => return StatusCode::NOT_FOUND.into_response(),
        };
        let total = data.len() as u64;

        let range = headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_range);
        if let Some((start, end)) = range {
            if start >= total {
                return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
            }
            let end = end.min(total - 1);
            let slice = data[start as usize..=end as usize].to_vec();
            return Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
                .header(header::CONTENT_LENGTH, slice.len())
                .body(Body::from(slice))
                .unwrap();
        }

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, data.len())
            .body(Body::from(data))
            .unwrap()
    }

    async fn remove(State(blobs): State<Blobs>, Path(id): Path<String>) -> StatusCode {
        match blobs.lock().unwrap().remove(&id) {
            Some(_) => StatusCode::NO_CONTENT,
            None => StatusCode::NOT_FOUND,
        }
    }

    fn parse_range(value: &str) -> Option<(u64, u64)> {
        let spec = value.strip_prefix("bytes=")?;
        let (start, end) = spec.split_once('-')?;
        Some((start.parse().ok()?, end.parse().ok()?))
    }

    /// Bind the stub backend on an ephemeral port and serve it in the
    /// background for the rest of the test.
    pub(crate) async fn spawn() -> StubBackend {
        let blobs: Blobs = Arc::new(Mutex::new(HashMap::new()));
        let app = Router::new()
            .route("/objects", post(upload))
            .route("/objects/{id}", get(download).delete(remove))
            .with_state(blobs.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        StubBackend {
            base_url: format!("http://{addr}"),
            blobs,
        }
    }
}
