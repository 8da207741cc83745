//! Connection server (component E, §4.E): binds one TCP or Unix-domain
//! listener, spawns one task per accepted connection, and drives that
//! connection's request loop. Mirrors the teacher's per-session task shape
//! (`SessionListener::run`) but over a stream-oriented transport instead of
//! UDP datagrams.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

use chunkcache_core::config::ListenerConfig;
use chunkcache_core::error::CodecError;
use chunkcache_core::model::Response;
use chunkcache_core::wire::BINARY_REQUEST_MAGIC;
use chunkcache_core::{binary, text};
use chunkcache_engine::backend::BackendFactory;
use chunkcache_engine::metrics::Metrics;
use chunkcache_engine::orchestrator::Orchestrator;

use crate::dispatch::{binary_opcode_and_opaque, dispatch};

/// TCP keep-alive idle time before the first probe (§4.E: 30s).
const KEEPALIVE_IDLE: Duration = Duration::from_secs(30);

pub async fn serve(
    listener_config: ListenerConfig,
    chunk_size: u32,
    l1_factory: Arc<BackendFactory>,
    l2_factory: Arc<BackendFactory>,
    metrics: Arc<Metrics>,
) -> Result<()> {
    match listener_config {
        ListenerConfig::Tcp { port } => serve_tcp(port, chunk_size, l1_factory, l2_factory, metrics).await,
        ListenerConfig::Unix { path } => serve_unix(path, chunk_size, l1_factory, l2_factory, metrics).await,
    }
}

/// Build the per-connection pair of backend handlers and the `Orchestrator`
/// that owns them (§4.E: "construct one L1 and one L2 backend handler via
/// the configured factories... on either failure, close the partial set of
/// resources and drop the client"; §5: handlers are never shared between
/// connections). If L2 fails to connect, `l1_handler` simply drops here,
/// closing whatever socket it opened.
async fn build_connection_orchestrator(
    chunk_size: u32,
    l1_factory: &BackendFactory,
    l2_factory: &BackendFactory,
    metrics: &Arc<Metrics>,
) -> Result<Orchestrator> {
    let l1_handler = l1_factory.connect().await.context("failed to construct L1 backend handler")?;
    metrics.l1_connections_established.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    let l2_handler = l2_factory.connect().await.context("failed to construct L2 backend handler")?;
    metrics.l2_connections_established.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    Ok(Orchestrator::new(chunk_size, l1_handler, l2_handler, Arc::clone(metrics)))
}

async fn serve_tcp(
    port: u16,
    chunk_size: u32,
    l1_factory: Arc<BackendFactory>,
    l2_factory: Arc<BackendFactory>,
    metrics: Arc<Metrics>,
) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind tcp 0.0.0.0:{port}"))?;
    tracing::info!(port, "chunkcached listening (tcp)");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        if let Err(e) = apply_keepalive(&stream) {
            tracing::warn!(error = %e, "failed to set TCP keepalive, continuing anyway");
        }

        metrics.connections_established.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let l1_factory = Arc::clone(&l1_factory);
        let l2_factory = Arc::clone(&l2_factory);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            tracing::debug!(%peer, "connection established");
            let orchestrator = match build_connection_orchestrator(chunk_size, &l1_factory, &l2_factory, &metrics).await {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "failed to construct backend handlers, dropping client");
                    return;
                }
            };
            if let Err(e) = handle_connection(stream, &orchestrator, &metrics).await {
                tracing::debug!(%peer, error = %e, "connection closed with error");
            } else {
                tracing::debug!(%peer, "connection closed");
            }
        });
    }
}

async fn serve_unix(
    path: std::path::PathBuf,
    chunk_size: u32,
    l1_factory: Arc<BackendFactory>,
    l2_factory: Arc<BackendFactory>,
    metrics: Arc<Metrics>,
) -> Result<()> {
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).with_context(|| format!("failed to bind unix {path:?}"))?;
    tracing::info!(?path, "chunkcached listening (unix)");

    loop {
        let (stream, _addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        metrics.connections_established.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let l1_factory = Arc::clone(&l1_factory);
        let l2_factory = Arc::clone(&l2_factory);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            let orchestrator = match build_connection_orchestrator(chunk_size, &l1_factory, &l2_factory, &metrics).await {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to construct backend handlers, dropping client");
                    return;
                }
            };
            if let Err(e) = handle_unix_connection(stream, &orchestrator, &metrics).await {
                tracing::debug!(error = %e, "connection closed with error");
            }
        });
    }
}

fn apply_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    let sock = socket2::SockRef::from(stream);
    sock.set_keepalive(true)?;
    sock.set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(KEEPALIVE_IDLE))?;
    Ok(())
}

async fn handle_connection(stream: TcpStream, orchestrator: &Orchestrator, metrics: &Metrics) -> Result<()> {
    let mut reader = BufReader::new(stream);
    run_request_loop(&mut reader, orchestrator, metrics).await
}

async fn handle_unix_connection(stream: UnixStream, orchestrator: &Orchestrator, metrics: &Metrics) -> Result<()> {
    let mut reader = BufReader::new(stream);
    run_request_loop(&mut reader, orchestrator, metrics).await
}

/// Protocol auto-detection (§4.A): peek the first byte without consuming
/// it. A connection never switches protocol once bound.
async fn detect_binary<S>(reader: &mut BufReader<S>) -> std::io::Result<bool>
where
    S: AsyncRead + Unpin,
{
    let peeked = reader.fill_buf().await?;
    Ok(peeked.first() == Some(&BINARY_REQUEST_MAGIC))
}

/// Translate a dispatch outcome into the binary framing for GET/GAT.
///
/// `dispatch` builds its response list for the text protocol's batched-GET
/// shape (zero or more `Value`s plus a terminating `End`), since `Request`
/// doesn't carry which codec produced it. Binary GET/GAT always carry
/// exactly one key and have no "END" concept: a hit is exactly one `Value`
/// frame, a miss is exactly one `NotFound` frame, and the terminator is
/// dropped once it's served its purpose. Every other response variant
/// (STORED/DELETED/errors/...) is already a single, protocol-correct frame,
/// so it's written through unchanged.
async fn write_binary_responses<S>(
    writer: &mut S,
    opcode: u8,
    opaque: u32,
    responses: &[Response],
) -> Result<(), CodecError>
where
    S: AsyncWrite + Unpin,
{
    let mut wrote_value = false;
    for resp in responses {
        match resp {
            Response::Value(_) => {
                wrote_value = true;
                binary::write_response(writer, opcode, opaque, resp).await?;
            }
            Response::End if wrote_value => {}
            Response::End => binary::write_response(writer, opcode, opaque, &Response::NotFound).await?,
            other => binary::write_response(writer, opcode, opaque, other).await?,
        }
    }
    Ok(())
}

async fn run_request_loop<S>(reader: &mut BufReader<S>, orchestrator: &Orchestrator, metrics: &Metrics) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let is_binary = match detect_binary(reader).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    loop {
        let outcome = if is_binary {
            match binary::read_request(reader).await {
                Ok(req) => {
                    let outcome = dispatch(&req, orchestrator, metrics).await;
                    let (opcode, opaque) = binary_opcode_and_opaque(&req);
                    write_binary_responses(reader, opcode, opaque, &outcome.responses).await?;
                    outcome
                }
                Err(CodecError::ConnectionClosed) => return Ok(()),
                Err(CodecError::MalformedRequest(msg)) => {
                    metrics.malformed_requests.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    binary::write_response(reader, 0, 0, &Response::ClientError(msg)).await?;
                    reader.flush().await?;
                    return Ok(());
                }
                Err(CodecError::Io(e)) => {
                    metrics.client_io_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    return Err(e.into());
                }
            }
        } else {
            match text::read_request(reader).await {
                Ok(req) => {
                    let outcome = dispatch(&req, orchestrator, metrics).await;
                    for resp in &outcome.responses {
                        text::write_response(reader, resp).await?;
                    }
                    outcome
                }
                Err(CodecError::ConnectionClosed) => return Ok(()),
                Err(CodecError::MalformedRequest(msg)) => {
                    metrics.malformed_requests.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    text::write_response(reader, &Response::ClientError(msg)).await?;
                    reader.flush().await?;
                    return Ok(());
                }
                Err(CodecError::Io(e)) => {
                    metrics.client_io_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    return Err(e.into());
                }
            }
        };

        reader.flush().await?;
        if outcome.close {
            return Ok(());
        }
    }
}
