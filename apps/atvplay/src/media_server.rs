//! Local HTTP server that publishes the media file to the receiver.
//!
//! The receiver fetches media itself, so the file is exposed on the interface
//! the control link reached it from, at `/atv.<ext>` on an ephemeral port.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

/// Errors that can occur when starting the media server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind media server on {ip}: {source}")]
    Bind {
        ip: IpAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Path the media file is published under.
fn media_path(extension: &str) -> String {
    format!("/atv.{}", extension.trim_start_matches('.'))
}

/// Builds the router serving `file` at [`media_path`].
pub fn create_router(file: &Path, extension: &str) -> Router {
    Router::new()
        .route_service(&media_path(extension), ServeFile::new(file))
        .layer(TraceLayer::new_for_http())
}

/// A running media server. Dropping it leaves the server task running;
/// call [`MediaServer::shutdown`] to stop it.
pub struct MediaServer {
    url: String,
    handle: JoinHandle<()>,
}

impl MediaServer {
    /// URL the receiver should be told to play.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stops serving.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

/// Binds `ip` on an ephemeral port and serves `file` there.
pub async fn start_media_server(
    file: &Path,
    ip: IpAddr,
    extension: &str,
) -> Result<MediaServer, ServerError> {
    let listener = TcpListener::bind(SocketAddr::new(ip, 0))
        .await
        .map_err(|source| ServerError::Bind { ip, source })?;
    let addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { ip, source })?;

    log::info!("[Media] Listening on {}", addr);
    let app = create_router(file, extension);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("[Media] Server error: {}", e);
        }
    });

    Ok(MediaServer {
        url: format!("http://{}{}", addr, media_path(extension)),
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::Ipv4Addr;

    #[test]
    fn media_path_tolerates_leading_dot() {
        assert_eq!(media_path("mp4"), "/atv.mp4");
        assert_eq!(media_path(".mov"), "/atv.mov");
    }

    #[tokio::test]
    async fn serves_file_at_published_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not really a movie").unwrap();

        let server = start_media_server(file.path(), IpAddr::V4(Ipv4Addr::LOCALHOST), "mp4")
            .await
            .unwrap();
        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.url().ends_with("/atv.mp4"));

        let response = reqwest::get(server.url()).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"not really a movie");

        let other = server.url().replace("/atv.mp4", "/other");
        let response = reqwest::get(&other).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);

        server.shutdown();
    }
}
