// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Axum glue: one request, one render, one streamed body.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::PathAndQuery, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use weft_app_core::prefs::ServerPrefs;
use weft_proto::DataProtector;
use weft_stream::{
    response_channel, BootstrapAssets, ConfiguredRenderModes, EndpointOptions, ErrorDetail,
    Orchestrator, RenderError, RenderRequest, ResponsePart, ResponseStream,
};

use crate::demo::{DemoRenderer, DemoRoute};

/// Unread response parts buffered between the writer and hyper.
const RESPONSE_BUFFER: usize = 32;

/// Shared across requests.
#[derive(Debug)]
pub(crate) struct AppState {
    pub(crate) orchestrator: Orchestrator,
    pub(crate) prevent_streaming: bool,
    pub(crate) base_uri: Option<String>,
    pub(crate) demo_delay: Duration,
}

impl AppState {
    /// State for a host configured by `prefs`, sealing server descriptors with `protector`.
    pub(crate) fn from_prefs(prefs: &ServerPrefs, protector: Arc<dyn DataProtector>) -> Self {
        let mut configured = ConfiguredRenderModes::new();
        if prefs.render_modes.server {
            configured = configured.with_server();
        }
        if prefs.render_modes.webassembly {
            configured = configured.with_webassembly();
        }
        let error_detail = if prefs.environment.is_development() {
            ErrorDetail::Detailed
        } else {
            ErrorDetail::Generic
        };
        let options = EndpointOptions::new(protector)
            .with_configured(configured)
            .with_error_detail(error_detail)
            .with_descriptor_lifetime(Duration::from_secs(prefs.descriptor_lifetime_secs))
            .with_bootstrap(BootstrapAssets {
                server_script: prefs.bootstrap.server_script.clone(),
                webassembly_script: prefs.bootstrap.webassembly_script.clone(),
            });
        Self {
            orchestrator: Orchestrator::new(options),
            prevent_streaming: prefs.prevent_streaming,
            base_uri: prefs.base_uri.clone(),
            demo_delay: Duration::from_millis(400),
        }
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(page))
        .route("/{*path}", get(page))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn page(State(state): State<Arc<AppState>>, uri: Uri, headers: HeaderMap) -> Response {
    let Some(route) = DemoRoute::from_path(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut request = RenderRequest::new(
        route.root(),
        request_base_uri(state.base_uri.as_deref(), &headers, &uri),
    );
    request.prevent_streaming = state.prevent_streaming;

    let (writer, mut stream) = response_channel(RESPONSE_BUFFER);
    let orchestrator = state.orchestrator.clone();
    let renderer = DemoRenderer::new(route, state.demo_delay);
    tokio::spawn(async move {
        match orchestrator.render(renderer, request, writer).await {
            Ok(outcome) => debug!(completion = ?outcome.completion, "render finished"),
            Err(RenderError::Aborted) => debug!("client disconnected mid-render"),
            Err(err) if err.reported_to_client() => {
                error!(%err, "render failed after response started; client saw an error fragment");
            }
            Err(err) => error!(%err, "render failed"),
        }
    });

    let Some(ResponsePart::Head(head)) = stream.recv().await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "render failed").into_response();
    };
    let mut builder = Response::builder().status(head.status);
    if let Some(location) = head.location {
        builder = builder.header(header::LOCATION, location);
    }
    if let Some(content_type) = head.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    match builder.body(Body::from_stream(body_stream(stream))) {
        Ok(response) => response,
        Err(err) => {
            error!(%err, "invalid response head");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn body_stream(
    stream: ResponseStream,
) -> impl futures_util::Stream<Item = Result<axum::body::Bytes, Infallible>> + Send + 'static {
    futures_util::stream::unfold(stream, |mut stream| async move {
        loop {
            match stream.recv().await? {
                ResponsePart::Body(bytes) => return Some((Ok(bytes), stream)),
                ResponsePart::Head(_) => {}
            }
        }
    })
}

/// Absolute URI navigation targets resolve against.
fn request_base_uri(configured: Option<&str>, headers: &HeaderMap, uri: &Uri) -> String {
    let path = uri.path_and_query().map_or("/", PathAndQuery::as_str);
    if let Some(origin) = configured {
        return format!("{}{path}", origin.trim_end_matches('/'));
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use weft_app_core::prefs::Environment;
    use weft_proto::{KeyedProtector, STREAM_TERMINATOR};

    async fn serve(prefs: ServerPrefs) -> SocketAddr {
        serve_with(prefs, Arc::new(KeyedProtector::ephemeral())).await
    }

    async fn serve_with(prefs: ServerPrefs, protector: Arc<dyn DataProtector>) -> SocketAddr {
        let mut state = AppState::from_prefs(&prefs, protector);
        state.demo_delay = Duration::from_millis(10);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(state))).await.unwrap();
        });
        addr
    }

    async fn fetch(addr: SocketAddr, path: &str) -> String {
        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(
            format!("GET {path} HTTP/1.1\r\nHost: demo.test\r\nConnection: close\r\n\r\n")
                .as_bytes(),
        )
        .await
        .unwrap();
        let mut out = String::new();
        conn.read_to_string(&mut out).await.unwrap();
        out
    }

    #[test]
    fn base_uri_prefers_configured_origin() {
        let uri: Uri = "/weather?city=oslo".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "internal:8088".parse().unwrap());
        assert_eq!(
            request_base_uri(Some("https://public.test/"), &headers, &uri),
            "https://public.test/weather?city=oslo"
        );
        assert_eq!(
            request_base_uri(None, &headers, &uri),
            "http://internal:8088/weather?city=oslo"
        );
    }

    #[tokio::test]
    async fn home_streams_placeholder_then_forecast() {
        let addr = serve(ServerPrefs::default()).await;
        let raw = fetch(addr, "/").await;
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.contains("text/html; charset=utf-8"));
        let placeholder = raw.find("Loading forecast...").unwrap();
        let fragment = raw.find("<template blazor-component-id=\"2\">").unwrap();
        assert!(placeholder < fragment);
        assert!(raw.contains("weft.server.js"));
        assert!(raw.contains(STREAM_TERMINATOR));
    }

    #[tokio::test]
    async fn early_navigation_is_a_redirect() {
        let addr = serve(ServerPrefs::default()).await;
        let raw = fetch(addr, "/moved").await.to_ascii_lowercase();
        assert!(raw.starts_with("http/1.1 302 found"));
        assert!(raw.contains("location: http://demo.test/\r\n"));
    }

    #[tokio::test]
    async fn late_navigation_is_a_redirection_fragment() {
        let addr = serve(ServerPrefs::default()).await;
        let raw = fetch(addr, "/late-redirect").await;
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.contains("<template type=\"redirection\">http://demo.test/</template>"));
        assert!(!raw.contains(STREAM_TERMINATOR));
    }

    #[tokio::test]
    async fn late_failure_detail_follows_environment() {
        let addr = serve(ServerPrefs::default()).await;
        let raw = fetch(addr, "/boom").await;
        assert!(raw.contains(weft_stream::GENERIC_ERROR_MESSAGE));

        let dev = ServerPrefs {
            environment: Environment::Development,
            ..ServerPrefs::default()
        };
        let addr = serve(dev).await;
        let raw = fetch(addr, "/boom").await;
        assert!(raw.contains("ForecastError: weather service unavailable"));
    }

    #[tokio::test]
    async fn unregistered_runtime_is_a_server_error() {
        let mut prefs = ServerPrefs::default();
        prefs.render_modes.webassembly = false;
        let addr = serve(prefs).await;
        assert!(fetch(addr, "/").await.starts_with("HTTP/1.1 500"));
    }

    #[tokio::test]
    async fn server_descriptors_are_sealed_by_the_host_protector() {
        let protector = Arc::new(KeyedProtector::new([9u8; 32]));
        let addr = serve_with(ServerPrefs::default(), protector.clone()).await;
        let raw = fetch(addr, "/").await;

        let server: Vec<_> = raw
            .split(weft_proto::html::DESCRIPTOR_PREFIX)
            .skip(1)
            .filter_map(|rest| weft_proto::ComponentDescriptor::parse_json(&rest[..rest.find("-->")?]))
            .filter(|d| d.kind == Some(weft_proto::DescriptorKind::Server))
            .collect();
        assert_eq!(server.len(), 1);

        let payloads = weft_proto::ServerDescriptorVerifier::new(protector)
            .verify(&server)
            .unwrap();
        assert_eq!(payloads[0].type_name, "Counter");
        assert!(weft_proto::ServerDescriptorVerifier::new(Arc::new(KeyedProtector::ephemeral()))
            .verify(&server)
            .is_err());
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let addr = serve(ServerPrefs::default()).await;
        assert!(fetch(addr, "/nope").await.starts_with("HTTP/1.1 404"));
    }
}
