//! Client and call builders.
//!
//! # Design
//! `RestClient` holds the base URL, an immutable `ClientConfig` and the
//! shared capabilities (transport, worker pool, storage) behind one `Arc`, so
//! clones are cheap and share a single concurrency cap. Every call starts as
//! a builder (`Call`, `Upload` or `Download`) and ends in a destination that
//! returns a cold `ResponseStream`. Nothing touches the network until the
//! stream is polled.
//!
//! Request construction happens when the destination is chosen. A request
//! that cannot be built (malformed URL) still produces a stream; it yields the
//! error as its only item.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClientConfig, ConnectivityPolicy};
use crate::decode::{Decode, Json, JsonDecodable, Model, Models, Raw, Void};
use crate::http::{Headers, HttpMethod};
use crate::multipart::{Boundary, MultipartPart};
use crate::params::{ParamValue, Params};
use crate::pool::WorkerPool;
use crate::request::{build_download_request, build_multipart_request, build_request, Encoding, RequestParts};
use crate::response::ResponseStream;
use crate::storage::{CacheDirStorage, Storage};
use crate::task::{TaskKind, TaskStream};
use crate::transport::Transport;

/// Entry point for building calls against one base URL.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<Inner>,
}

struct Inner {
    base_url: String,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    pool: WorkerPool,
    storage: Arc<dyn Storage>,
}

impl RestClient {
    /// Downloads are kept in `config.resolved_cache_dir()`.
    pub fn new(base_url: impl Into<String>, config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let storage = Arc::new(CacheDirStorage::new(config.resolved_cache_dir()));
        Self::with_storage(base_url, config, transport, storage)
    }

    pub fn with_storage(
        base_url: impl Into<String>,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let pool = WorkerPool::new(config.max_concurrent);
        Self {
            inner: Arc::new(Inner {
                base_url: base_url.into(),
                config,
                transport,
                pool,
                storage,
            }),
        }
    }

    /// Client backed by the blocking `ureq` transport.
    #[cfg(feature = "ureq")]
    pub fn with_ureq(base_url: impl Into<String>, config: ClientConfig) -> Self {
        Self::new(base_url, config, Arc::new(crate::ureq_transport::UreqTransport::new()))
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The pool shared by every call that does not bring its own.
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    pub fn request(&self, method: HttpMethod, route: impl Into<String>) -> Call {
        Call {
            client: self.clone(),
            method,
            route: route.into(),
            options: Options::default(),
            encoding: None,
            keypath: None,
        }
    }

    pub fn get(&self, route: impl Into<String>) -> Call {
        self.request(HttpMethod::Get, route)
    }

    pub fn post(&self, route: impl Into<String>) -> Call {
        self.request(HttpMethod::Post, route)
    }

    pub fn put(&self, route: impl Into<String>) -> Call {
        self.request(HttpMethod::Put, route)
    }

    pub fn patch(&self, route: impl Into<String>) -> Call {
        self.request(HttpMethod::Patch, route)
    }

    pub fn delete(&self, route: impl Into<String>) -> Call {
        self.request(HttpMethod::Delete, route)
    }

    fn upload(&self, method: HttpMethod, route: impl Into<String>) -> Upload {
        Upload {
            client: self.clone(),
            method,
            route: route.into(),
            options: Options::default(),
            parts: Vec::new(),
            keypath: None,
        }
    }

    pub fn upload_post(&self, route: impl Into<String>) -> Upload {
        self.upload(HttpMethod::Post, route)
    }

    pub fn upload_put(&self, route: impl Into<String>) -> Upload {
        self.upload(HttpMethod::Put, route)
    }

    pub fn upload_patch(&self, route: impl Into<String>) -> Upload {
        self.upload(HttpMethod::Patch, route)
    }

    pub fn download(&self, route: impl Into<String>) -> Download {
        Download {
            client: self.clone(),
            route: route.into(),
            options: Options::default(),
        }
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.inner.base_url)
            .field("config", &self.inner.config)
            .field("pool", &self.inner.pool)
            .finish_non_exhaustive()
    }
}

/// Settings every builder accepts.
#[derive(Debug, Default)]
struct Options {
    params: Params,
    headers: Headers,
    timeout: Option<Duration>,
    connectivity: Option<ConnectivityPolicy>,
    pool: Option<WorkerPool>,
}

impl Options {
    fn parts<'a>(
        &'a self,
        client: &'a RestClient,
        method: HttpMethod,
        route: &'a str,
        encoding: Option<Encoding>,
    ) -> RequestParts<'a> {
        let config = &client.inner.config;
        RequestParts {
            base_url: &client.inner.base_url,
            route,
            method,
            params: &self.params,
            client_headers: &config.headers,
            call_headers: &self.headers,
            encoding: encoding.unwrap_or(config.encoding),
            timeout: self.timeout.or(config.timeout),
            connectivity: self.connectivity.unwrap_or(config.connectivity),
        }
    }

    fn pool(&self, client: &RestClient) -> WorkerPool {
        self.pool.clone().unwrap_or_else(|| client.inner.pool.clone())
    }
}

macro_rules! builder_options {
    ($builder:ty) => {
        impl $builder {
            pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
                self.options.params.insert(key, value);
                self
            }

            /// Merge `params` into the call's parameters; later keys win.
            pub fn params(mut self, params: impl IntoIterator<Item = (String, ParamValue)>) -> Self {
                for (key, value) in params {
                    self.options.params.insert(key, value);
                }
                self
            }

            pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
                self.options.headers.insert(key.into(), value.into());
                self
            }

            pub fn headers(mut self, headers: Headers) -> Self {
                self.options.headers.extend(headers);
                self
            }

            pub fn timeout(mut self, timeout: Duration) -> Self {
                self.options.timeout = Some(timeout);
                self
            }

            pub fn connectivity(mut self, connectivity: ConnectivityPolicy) -> Self {
                self.options.connectivity = Some(connectivity);
                self
            }

            /// Run this call on `pool` instead of the client's.
            pub fn pool(mut self, pool: WorkerPool) -> Self {
                self.options.pool = Some(pool);
                self
            }
        }
    };
}

/// A plain request. Parameters go in the query for GET and in the body
/// otherwise.
#[derive(Debug)]
pub struct Call {
    client: RestClient,
    method: HttpMethod,
    route: String,
    options: Options,
    encoding: Option<Encoding>,
    keypath: Option<String>,
}

builder_options!(Call);

impl Call {
    /// Body encoding for this call, overriding the client's.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Top-level key `model` and `models` decode from.
    pub fn keypath(mut self, keypath: impl Into<String>) -> Self {
        self.keypath = Some(keypath.into());
        self
    }

    pub fn data(self) -> ResponseStream<Vec<u8>, Raw> {
        self.respond(Raw)
    }

    pub fn json(self) -> ResponseStream<Vec<u8>, Json> {
        self.respond(Json)
    }

    pub fn model<T: JsonDecodable + Send + 'static>(mut self) -> ResponseStream<Vec<u8>, Model<T>> {
        let keypath = self.keypath.take();
        self.respond(Model::new(keypath))
    }

    pub fn models<T: JsonDecodable + Send + 'static>(mut self) -> ResponseStream<Vec<u8>, Models<T>> {
        let keypath = self.keypath.take();
        self.respond(Models::new(keypath))
    }

    pub fn void(self) -> ResponseStream<Vec<u8>, Void> {
        self.respond(Void)
    }

    fn respond<D: Decode<Vec<u8>>>(self, decoder: D) -> ResponseStream<Vec<u8>, D> {
        ResponseStream::new(self.task(), decoder)
    }

    fn task(&self) -> TaskStream<Vec<u8>> {
        let parts = self
            .options
            .parts(&self.client, self.method, &self.route, self.encoding);
        match build_request(&parts) {
            Ok(request) => {
                tracing::debug!(method = %request.method, url = %request.url, "built request");
                let transport = Arc::clone(&self.client.inner.transport);
                TaskStream::fetch(transport, self.options.pool(&self.client), request)
            }
            Err(err) => TaskStream::rejected(TaskKind::Fetch, err),
        }
    }
}

/// A multipart upload. Parameters become form fields ahead of the parts.
#[derive(Debug)]
pub struct Upload {
    client: RestClient,
    method: HttpMethod,
    route: String,
    options: Options,
    parts: Vec<MultipartPart>,
    keypath: Option<String>,
}

builder_options!(Upload);

impl Upload {
    pub fn part(mut self, part: MultipartPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn parts(mut self, parts: impl IntoIterator<Item = MultipartPart>) -> Self {
        self.parts.extend(parts);
        self
    }

    pub fn keypath(mut self, keypath: impl Into<String>) -> Self {
        self.keypath = Some(keypath.into());
        self
    }

    pub fn data(self) -> ResponseStream<Vec<u8>, Raw> {
        self.respond(Raw)
    }

    pub fn json(self) -> ResponseStream<Vec<u8>, Json> {
        self.respond(Json)
    }

    pub fn model<T: JsonDecodable + Send + 'static>(mut self) -> ResponseStream<Vec<u8>, Model<T>> {
        let keypath = self.keypath.take();
        self.respond(Model::new(keypath))
    }

    pub fn models<T: JsonDecodable + Send + 'static>(mut self) -> ResponseStream<Vec<u8>, Models<T>> {
        let keypath = self.keypath.take();
        self.respond(Models::new(keypath))
    }

    pub fn void(self) -> ResponseStream<Vec<u8>, Void> {
        self.respond(Void)
    }

    fn respond<D: Decode<Vec<u8>>>(self, decoder: D) -> ResponseStream<Vec<u8>, D> {
        ResponseStream::new(self.task(), decoder)
    }

    fn task(&self) -> TaskStream<Vec<u8>> {
        let parts = self.options.parts(&self.client, self.method, &self.route, None);
        let boundary = Boundary::generate();
        match build_multipart_request(&parts, &self.parts, &boundary) {
            Ok(request) => {
                tracing::debug!(
                    method = %request.method,
                    url = %request.url,
                    parts = self.parts.len(),
                    "built multipart upload"
                );
                let transport = Arc::clone(&self.client.inner.transport);
                TaskStream::upload(transport, self.options.pool(&self.client), request)
            }
            Err(err) => TaskStream::rejected(TaskKind::Upload, err),
        }
    }
}

/// A GET whose body is streamed to a file.
#[derive(Debug)]
pub struct Download {
    client: RestClient,
    route: String,
    options: Options,
}

builder_options!(Download);

impl Download {
    /// Yields the path of the downloaded file inside the client's cache
    /// directory.
    pub fn file(self) -> ResponseStream<PathBuf, Raw> {
        ResponseStream::new(self.task(true), Raw)
    }

    /// Success only. Nothing is left in the cache directory.
    pub fn void(self) -> ResponseStream<PathBuf, Void> {
        ResponseStream::new(self.task(false), Void)
    }

    fn task(&self, keep: bool) -> TaskStream<PathBuf> {
        let parts = self.options.parts(&self.client, HttpMethod::Get, &self.route, None);
        match build_download_request(&parts) {
            Ok(request) => {
                tracing::debug!(url = %request.url, "built download");
                let inner = &self.client.inner;
                let transport = Arc::clone(&inner.transport);
                let pool = self.options.pool(&self.client);
                if keep {
                    TaskStream::download(transport, pool, request, Arc::clone(&inner.storage))
                } else {
                    TaskStream::download_discarding(transport, pool, request)
                }
            }
            Err(err) => TaskStream::rejected(TaskKind::Download, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use serde::Deserialize;

    use super::*;
    use crate::error::ErrorKind;
    use crate::request::{APPLICATION_JSON, CONTENT_TYPE};
    use crate::task::TaskState;
    use crate::testing::{FakeTransport, Script};

    const BASE: &str = "https://api.example.com";

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
    }

    fn client(fake: &Arc<FakeTransport>) -> RestClient {
        RestClient::new(BASE, ClientConfig::DEFAULT.with_header("Accept", "*/*"), fake.clone())
    }

    #[tokio::test]
    async fn get_sends_params_in_query_with_merged_headers() {
        let fake = FakeTransport::responding(200, b"ok");
        let body = client(&fake)
            .get("/search")
            .param("q", "rust lang")
            .param("page", 2)
            .header("Accept", "application/json")
            .data()
            .single()
            .await
            .unwrap();
        assert_eq!(body, b"ok");

        let request = fake.last_request().unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://api.example.com/search?page=2&q=rust%20lang");
        assert_eq!(request.headers["Accept"], "application/json");
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn per_call_encoding_overrides_client_default() {
        let fake = FakeTransport::responding(201, b"{}");
        client(&fake)
            .post("/things")
            .param("name", "widget")
            .encoding(Encoding::Json)
            .void()
            .single()
            .await
            .unwrap();

        let request = fake.last_request().unwrap();
        assert_eq!(request.headers[CONTENT_TYPE], APPLICATION_JSON);
        assert_eq!(request.body.as_deref(), Some(br#"{"name":"widget"}"#.as_slice()));
    }

    #[tokio::test]
    async fn call_timeout_falls_back_to_client_timeout() {
        let fake = FakeTransport::responding(200, b"");
        let config = ClientConfig::DEFAULT.with_timeout(Duration::from_secs(5));
        let client = RestClient::new(BASE, config, fake.clone());

        client.delete("/a").void().single().await.unwrap();
        assert_eq!(fake.last_request().unwrap().timeout, Some(Duration::from_secs(5)));

        client
            .delete("/a")
            .timeout(Duration::from_millis(250))
            .void()
            .single()
            .await
            .unwrap();
        assert_eq!(fake.last_request().unwrap().timeout, Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn models_honour_keypath() {
        let fake = FakeTransport::responding(200, br#"{"items":[{"id":1},{"id":2},{"bad":true}]}"#);
        let items = client(&fake)
            .get("/items")
            .keypath("items")
            .models::<Item>()
            .single()
            .await
            .unwrap();
        assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }]);
    }

    #[tokio::test]
    async fn error_status_reaches_caller_classified() {
        let fake = FakeTransport::responding(422, br#"{"error":"invalid"}"#);
        let err = client(&fake).put("/things/1").model::<Item>().single().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HttpStatus);
        assert_eq!(err.status(), Some(422));
        assert_eq!(err.json_payload().unwrap()["error"], "invalid");
    }

    #[tokio::test]
    async fn malformed_url_fails_without_transport_call() {
        let fake = FakeTransport::responding(200, b"");
        let client = RestClient::new("not a url", ClientConfig::DEFAULT, fake.clone());
        let err = client.get("/x").data().single().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedUrl);
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn builders_are_cold() {
        let fake = FakeTransport::responding(200, b"");
        let stream = client(&fake).get("/lazy").data();
        assert_eq!(stream.state(), TaskState::Idle);
        drop(stream);
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn uploads_use_a_fresh_boundary_each_call() {
        let fake = FakeTransport::new(Script::Respond {
            status: 200,
            body: b"{}".to_vec(),
            progress: vec![0.5],
        });
        let client = client(&fake);
        let upload = || {
            client
                .upload_post("/upload")
                .param("album", "holiday")
                .part(MultipartPart::new("file", b"PNG".to_vec(), "a.png", "image/png"))
        };

        let items: Vec<_> = upload().json().collect().await;
        assert_eq!(items.len(), 2);
        let first = fake.last_request().unwrap();
        upload().void().single().await.unwrap();
        let second = fake.last_request().unwrap();

        let content_type = &first.headers[CONTENT_TYPE];
        assert!(content_type.starts_with("multipart/form-data; boundary=Boundary-"));
        assert_ne!(content_type, &second.headers[CONTENT_TYPE]);
        assert!(!first.url.contains('?'));
        let body = String::from_utf8(first.body.unwrap()).unwrap();
        assert!(body.contains("name=\"album\"\r\n\r\nholiday"));
        assert!(body.contains("filename=\"a.png\""));
    }

    #[tokio::test]
    async fn download_lands_in_cache_dir_with_query_params() {
        let fake = FakeTransport::responding(200, b"archive");
        let cache = tempfile::tempdir().unwrap();
        let config = ClientConfig::DEFAULT.with_cache_dir(cache.path());
        let client = RestClient::new(BASE, config, fake.clone());

        let path = client
            .download("/files/report")
            .param("format", "pdf")
            .file()
            .single()
            .await
            .unwrap();

        assert!(path.starts_with(cache.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"archive");
        let request = fake.last_request().unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://api.example.com/files/report?format=pdf");
    }

    #[tokio::test]
    async fn void_downloads_leave_the_cache_dir_empty() {
        let fake = FakeTransport::responding(200, b"archive");
        let cache = tempfile::tempdir().unwrap();
        let config = ClientConfig::DEFAULT.with_cache_dir(cache.path());
        let client = RestClient::new(BASE, config, fake.clone());

        for _ in 0..3 {
            client.download("/files/report").void().single().await.unwrap();
        }

        assert_eq!(fake.calls(), 3);
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn per_call_pool_overrides_client_pool() {
        let fake = FakeTransport::new(Script::Hold);
        let client = client(&fake);
        let private = WorkerPool::new(1);

        let mut stream = client.get("/slow").pool(private.clone()).data();
        assert!(futures_util::FutureExt::now_or_never(stream.next()).is_none());
        assert_eq!(private.available(), 0);
        assert_eq!(client.pool().available(), client.pool().capacity());
        stream.cancel();
    }
}
