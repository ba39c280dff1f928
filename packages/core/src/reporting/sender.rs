//! Report delivery over HTTP(S)

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Request, StatusCode};
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::errors::{ReportError, TrustKitError};
use crate::pinning::load_system_roots;

const REPORT_USER_AGENT: &str = concat!("trustpin/", env!("CARGO_PKG_VERSION"));

/// POSTs a JSON report body to one collector
pub trait ReportSender: Send + Sync {
    fn send<'a>(&'a self, uri: &'a Url, payload: Bytes) -> BoxFuture<'a, Result<StatusCode, ReportError>>;
}

/// HTTP/1.1 sender on hyper; collector connections use plain baseline trust
#[derive(Clone)]
pub struct HyperReportSender {
    tls: TlsConnector,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl std::fmt::Debug for HyperReportSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperReportSender")
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl HyperReportSender {
    pub fn new(tls_config: Arc<ClientConfig>, connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            tls: TlsConnector::from(tls_config),
            connect_timeout,
            request_timeout,
        }
    }

    /// Sender trusting the OS roots (or the bundled webpki roots)
    pub fn with_platform_roots(
        use_native_roots: bool,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TrustKitError> {
        let (roots, _) = load_system_roots(use_native_roots);
        let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| TrustKitError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self::new(Arc::new(config), connect_timeout, request_timeout))
    }

    async fn post(&self, uri: &Url, payload: Bytes) -> Result<StatusCode, ReportError> {
        let https = match uri.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(ReportError::UnsupportedScheme(other.to_string())),
        };
        let host = uri
            .host_str()
            .ok_or_else(|| ReportError::MissingHost(uri.to_string()))?;
        let port = uri
            .port_or_known_default()
            .ok_or_else(|| ReportError::MissingHost(uri.to_string()))?;
        let connect_host = host.trim_start_matches('[').trim_end_matches(']');

        let authority = match uri.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let path_and_query = &uri[url::Position::BeforePath..url::Position::AfterQuery];
        let request = Request::post(path_and_query)
            .header(HOST, authority)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, REPORT_USER_AGENT)
            .body(Full::new(payload))
            .map_err(|e| ReportError::Http(e.to_string()))?;

        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect((connect_host, port)))
            .await
            .map_err(|_| ReportError::Timeout)?
            .map_err(|e| ReportError::Network(format!("{host}:{port}: {e}")))?;
        let _ = tcp.set_nodelay(true);

        if https {
            let server_name = ServerName::try_from(connect_host.to_string())
                .map_err(|e| ReportError::Tls(format!("Invalid hostname '{host}': {e}")))?;
            let tls = self
                .tls
                .connect(server_name, tcp)
                .await
                .map_err(|e| ReportError::Tls(format!("TLS handshake failed: {e}")))?;
            exchange(tls, request).await
        } else {
            exchange(tcp, request).await
        }
    }
}

async fn exchange<T>(io: T, request: Request<Full<Bytes>>) -> Result<StatusCode, ReportError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| ReportError::Http(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!("Report connection closed with error: {}", e);
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| ReportError::Http(e.to_string()))?;
    Ok(response.status())
}

impl ReportSender for HyperReportSender {
    fn send<'a>(&'a self, uri: &'a Url, payload: Bytes) -> BoxFuture<'a, Result<StatusCode, ReportError>> {
        Box::pin(async move {
            let status = tokio::time::timeout(self.request_timeout, self.post(uri, payload))
                .await
                .map_err(|_| ReportError::Timeout)??;
            if status.is_success() {
                Ok(status)
            } else {
                Err(ReportError::Status(status))
            }
        })
    }
}
