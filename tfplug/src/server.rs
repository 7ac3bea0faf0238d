//! Server module for running Terraform providers
//!
//! This module starts the gRPC server, negotiates TLS with Terraform and
//! prints the go-plugin handshake line on stdout. Nothing else may write to
//! stdout while the provider runs; logs go to stderr.

use crate::error::{Result, TfplugError};
use crate::grpc::GrpcProviderServer;
use crate::proto::ProviderServer;
use crate::provider::Provider;
use base64::Engine;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};

/// Magic cookie Terraform sets when it launches a plugin
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

const CORE_PROTOCOL_VERSION: u32 = 1;
const PLUGIN_PROTOCOL_VERSION: u32 = 6;

/// Server configuration for running a Terraform provider
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to a PEM certificate, used when Terraform does not request AutoMTLS
    pub cert_path: Option<PathBuf>,
    /// Path to the PEM key matching cert_path
    pub key_path: Option<PathBuf>,
    /// Maximum message size in bytes
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            max_message_size: 256 << 20, // 256MB
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the certificate and key paths
    pub fn with_tls_files(mut self, cert_path: PathBuf, key_path: PathBuf) -> Self {
        self.cert_path = Some(cert_path);
        self.key_path = Some(key_path);
        self
    }

    /// Set the maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

/// TLS material chosen for this run
struct TlsSetup {
    config: ServerTlsConfig,
    /// DER certificate announced in the handshake (AutoMTLS only)
    announced_cert: Option<Vec<u8>>,
}

/// Main entry point for running a provider
pub async fn serve<P: Provider + 'static>(provider: P, config: ServerConfig) -> Result<()> {
    check_magic_cookie(std::env::var(MAGIC_COOKIE_KEY).ok().as_deref())?;
    check_protocol_versions(std::env::var("PLUGIN_PROTOCOL_VERSIONS").ok().as_deref())?;

    // Another component may already have installed a provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let tls = load_tls(&config).await?;

    let service = ProviderServer::new(GrpcProviderServer::new(provider))
        .max_decoding_message_size(config.max_message_size)
        .max_encoding_message_size(config.max_message_size);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let mut builder = Server::builder();
    let announced_cert = match tls {
        Some(tls) => {
            builder = builder.tls_config(tls.config)?;
            tls.announced_cert
        }
        None => {
            tracing::warn!("serving without TLS");
            None
        }
    };

    let line = handshake_line(addr, announced_cert.as_deref());
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    tracing::info!(%addr, "provider server listening");

    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    builder
        .add_service(service)
        .serve_with_incoming(incoming)
        .await?;

    Ok(())
}

/// Convenience function to run a provider with default configuration
pub async fn serve_default<P: Provider + 'static>(provider: P) -> Result<()> {
    serve(provider, ServerConfig::default()).await
}

fn check_magic_cookie(value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if v == MAGIC_COOKIE_VALUE => Ok(()),
        _ => {
            eprintln!(
                "This binary is a plugin. These are not meant to be executed directly.\n\
                 Please execute the program that consumes these plugins, which will\n\
                 load any plugins automatically"
            );
            Err(TfplugError::HandshakeFailed(
                "magic cookie mismatch".to_string(),
            ))
        }
    }
}

/// Terraform lists the protocol versions it speaks, version 6 must be among them
fn check_protocol_versions(value: Option<&str>) -> Result<()> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(());
    };

    let supported = value
        .split(',')
        .filter_map(|v| v.trim().parse::<u32>().ok())
        .any(|v| v == PLUGIN_PROTOCOL_VERSION);

    if supported {
        Ok(())
    } else {
        Err(TfplugError::HandshakeFailed(format!(
            "Terraform requested protocol versions {}, this provider speaks {}",
            value, PLUGIN_PROTOCOL_VERSION
        )))
    }
}

async fn load_tls(config: &ServerConfig) -> Result<Option<TlsSetup>> {
    if let Ok(client_cert) = std::env::var("PLUGIN_CLIENT_CERT") {
        if !client_cert.is_empty() {
            return auto_mtls(&client_cert).map(Some);
        }
    }

    let (Some(cert_path), Some(key_path)) = (&config.cert_path, &config.key_path) else {
        return Ok(None);
    };

    let cert = tokio::fs::read(cert_path)
        .await
        .map_err(|e| TfplugError::TlsError(format!("Failed to read certificate: {}", e)))?;
    let key = tokio::fs::read(key_path)
        .await
        .map_err(|e| TfplugError::TlsError(format!("Failed to read key: {}", e)))?;

    Ok(Some(TlsSetup {
        config: ServerTlsConfig::new().identity(Identity::from_pem(cert, key)),
        announced_cert: None,
    }))
}

/// Generates a throwaway server certificate and trusts only Terraform's client certificate
fn auto_mtls(client_cert_pem: &str) -> Result<TlsSetup> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| TfplugError::TlsError(format!("Failed to generate certificate: {}", e)))?;

    let identity = Identity::from_pem(certified.cert.pem(), certified.key_pair.serialize_pem());
    let config = ServerTlsConfig::new()
        .identity(identity)
        .client_ca_root(Certificate::from_pem(client_cert_pem));

    Ok(TlsSetup {
        config,
        announced_cert: Some(certified.cert.der().to_vec()),
    })
}

fn handshake_line(addr: SocketAddr, cert_der: Option<&[u8]>) -> String {
    let mut line = format!(
        "{}|{}|tcp|{}|grpc",
        CORE_PROTOCOL_VERSION, PLUGIN_PROTOCOL_VERSION, addr
    );
    if let Some(der) = cert_der {
        line.push('|');
        line.push_str(&base64::engine::general_purpose::STANDARD_NO_PAD.encode(der));
    }
    line
}
