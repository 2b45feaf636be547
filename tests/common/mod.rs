//! A tiny Docker Registry v2 server on localhost for end-to-end tests.

#![allow(dead_code)]

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;

pub const MANIFEST_DIGEST: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
pub const CONFIG_DIGEST: &str = "sha256:2222222222222222222222222222222222222222222222222222222222222222";
pub const LAYER_SIZE: u64 = 4096;
pub const CONFIG_SIZE: u64 = 512;

fn manifest() -> String {
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "size": CONFIG_SIZE,
            "digest": CONFIG_DIGEST
        },
        "layers": [{
            "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
            "size": LAYER_SIZE,
            "digest": "sha256:3333333333333333333333333333333333333333333333333333333333333333"
        }]
    })
    .to_string()
}

fn respond(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

async fn handle(request: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = request.uri().path().to_string();
    let response = match (request.method().clone(), path.as_str()) {
        (Method::GET, "/v2/") => respond(StatusCode::OK, "{}".to_string()),
        (Method::GET, "/v2/_catalog") => respond(
            StatusCode::OK,
            r#"{"repositories":["demo/app","empty"]}"#.to_string(),
        ),
        (Method::GET, "/v2/demo/app/tags/list") => {
            respond(StatusCode::OK, r#"{"name":"demo/app","tags":["v1"]}"#.to_string())
        }
        (Method::GET, "/v2/empty/tags/list") => {
            respond(StatusCode::OK, r#"{"name":"empty","tags":[]}"#.to_string())
        }
        (Method::HEAD, "/v2/demo/app/manifests/v1") => {
            let unchanged = request
                .headers()
                .get("if-none-match")
                .is_some_and(|v| v == MANIFEST_DIGEST);
            if unchanged {
                respond(StatusCode::NOT_MODIFIED, String::new())
            } else {
                respond(StatusCode::OK, String::new())
            }
        }
        (Method::GET, "/v2/demo/app/manifests/v1") => {
            let mut response = respond(StatusCode::OK, manifest());
            response.headers_mut().insert(
                "docker-content-digest",
                hyper::header::HeaderValue::from_static(MANIFEST_DIGEST),
            );
            response.headers_mut().insert(
                "content-type",
                hyper::header::HeaderValue::from_static("application/vnd.oci.image.manifest.v1+json"),
            );
            response
        }
        (Method::GET, p) if p == format!("/v2/demo/app/blobs/{}", CONFIG_DIGEST) => respond(
            StatusCode::OK,
            r#"{"architecture":"arm64","os":"linux","created":"2024-04-01T12:00:00Z"}"#.to_string(),
        ),
        (Method::DELETE, p) if p == format!("/v2/demo/app/manifests/{}", MANIFEST_DIGEST) => {
            respond(StatusCode::ACCEPTED, String::new())
        }
        _ => respond(StatusCode::NOT_FOUND, r#"{"errors":[]}"#.to_string()),
    };
    Ok(response)
}

/// Serve the registry on a background thread and return its address.
pub fn start_registry() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service_fn(handle))
                        .await;
                });
            }
        });
    });

    addr
}
