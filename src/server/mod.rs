pub mod api;

use crate::cli::ServeArgs;
use crate::runner::TextGenerator;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::Router;
use log::{ info, error };
use tokio::net::TcpListener;

pub struct Server {
    addr: String,
    generator: Arc<dyn TextGenerator>,
    args: ServeArgs,
}

impl Server {
    pub fn new(addr: String, generator: Arc<dyn TextGenerator>, args: ServeArgs) -> Self {
        Self { addr, generator, args }
    }

    pub fn router(&self) -> Router {
        let state = api::AppState
            ::new(self.generator.clone())
            .with_rate_limit(self.args.rate_limit_per_second);
        api::router(state, self.args.max_message_bytes)
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = self.router();

        if self.args.enable_tls {
            let (cert_path, key_path) = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert_path), Some(key_path)) => (cert_path, key_path),
                (Some(_), None) | (None, Some(_)) => {
                    error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                    return Err("Missing TLS certificate or key path".into());
                }
                (None, None) => {
                    error!("--enable-tls was set but no certificate/key paths provided.");
                    return Err("TLS enabled without cert/key".into());
                }
            };
            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let tls_config = axum_server::tls_rustls::RustlsConfig
                ::from_pem_file(cert_path, key_path).await?;

            info!("Starting HTTPS server on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            return Ok(());
        }

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                return Err(e.into());
            }
        };
        info!("Starting HTTP server on: http://{}", addr);
        serve(listener, app).await
    }
}

/// Serves `app` on an already bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), Box<dyn Error + Send + Sync>> {
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
