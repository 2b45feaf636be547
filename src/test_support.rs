//! Scripted in-memory registry used by unit tests.

use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::constants::media_type;
use crate::registry::{HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Debug, Clone)]
pub enum Reply {
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Fail(String),
    Hang,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Reply::Respond {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn json(body: Value) -> Self {
        Reply::Respond {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    pub fn with_header(self, name: &str, value: &str) -> Self {
        match self {
            Reply::Respond {
                status,
                mut headers,
                body,
            } => {
                headers.push((name.to_string(), value.to_string()));
                Reply::Respond {
                    status,
                    headers,
                    body,
                }
            }
            other => other,
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    routes: Mutex<HashMap<(Method, String), Reply>>,
    calls: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.to_string()), reply);
    }

    pub fn catalog(&self, base: &str, repositories: &[&str]) {
        self.on(
            Method::GET,
            &format!("{}/v2/_catalog", base),
            Reply::json(serde_json::json!({ "repositories": repositories })),
        );
    }

    pub fn tags(&self, base: &str, repository: &str, tags: &[&str]) {
        self.on(
            Method::GET,
            &format!("{}/v2/{}/tags/list", base, repository),
            Reply::json(serde_json::json!({ "name": repository, "tags": tags })),
        );
    }

    pub fn manifest(&self, base: &str, repository: &str, reference: &str, body: Value, digest: Option<&str>) {
        let mut reply = Reply::json(body);
        if let Some(digest) = digest {
            reply = reply.with_header("docker-content-digest", digest);
        }
        self.on(
            Method::GET,
            &format!("{}/v2/{}/manifests/{}", base, repository, reference),
            reply,
        );
    }

    pub fn blob(&self, base: &str, repository: &str, digest: &str, body: Value) {
        self.on(
            Method::GET,
            &format!("{}/v2/{}/blobs/{}", base, repository, digest),
            Reply::json(body),
        );
    }

    /// A single-platform image: manifest under `tag`, config blob with
    /// `architecture`, layers of the given sizes.
    pub fn image(
        &self,
        base: &str,
        repository: &str,
        tag: &str,
        architecture: &str,
        created: &str,
        layer_sizes: &[u64],
    ) -> u64 {
        let config_digest = format!("sha256:config-{}-{}-{}", repository.replace('/', "-"), tag, architecture);
        let layers: Vec<Value> = layer_sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                serde_json::json!({
                    "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                    "size": size,
                    "digest": format!("sha256:layer{}", i)
                })
            })
            .collect();
        self.manifest(
            base,
            repository,
            tag,
            serde_json::json!({
                "schemaVersion": 2,
                "mediaType": media_type::OCI_MANIFEST,
                "config": {
                    "mediaType": "application/vnd.oci.image.config.v1+json",
                    "size": 100,
                    "digest": config_digest
                },
                "layers": layers
            }),
            Some(&format!("sha256:manifest-{}-{}", repository.replace('/', "-"), tag)),
        );
        self.blob(
            base,
            repository,
            &config_digest,
            serde_json::json!({ "architecture": architecture, "os": "linux", "created": created }),
        );
        100 + layer_sizes.iter().sum::<u64>()
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.method.clone(), r.url.clone()))
            .collect()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &Method, fragment: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(m, url)| m == method && url.contains(fragment))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
        self.peak.store(0, Ordering::SeqCst);
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeRegistry {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        // Let sibling requests of the same wave start before this one ends.
        tokio::task::yield_now().await;

        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(&(request.method.clone(), request.url.clone()))
            .cloned()
            .unwrap_or_else(|| Reply::status(404));

        match reply {
            Reply::Respond {
                status,
                headers,
                body,
            } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.insert(
                        HeaderName::from_bytes(name.as_bytes()).unwrap(),
                        HeaderValue::from_str(&value).unwrap(),
                    );
                }
                Ok(HttpResponse {
                    status,
                    headers: map,
                    body: Bytes::from(body),
                })
            }
            Reply::Fail(reason) => Err(TransportError(reason)),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
