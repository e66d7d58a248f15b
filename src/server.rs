//! WebSocket accept loop and per-connection handler (spec.md §4.1, §4.2,
//! §5 "Concurrency").
//!
//! Grounded on `other_examples` `start_ws_server`/`handle_connection`
//! (typemill's `mill-transport` WS layer): TLS-required check ahead of
//! binding, a Bearer-token handshake gate, an idle-timeout read loop. The
//! MCP session/dispatch split there becomes `SessionManager`/`dispatcher`
//! here; the max-clients `AtomicUsize` counter becomes the per-IP
//! `ConnectionGuard` since BAP limits connections per address, not
//! globally (spec.md §4.2).

use crate::audit::{record, AuditEvent};
use crate::config::Config;
use crate::dispatcher;
use crate::protocol::{decode_frame, encode_response_error, Frame};
use crate::session::{OutboundMessage, Session, SessionManager};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::{Response as HttpResponse, StatusCode};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Bind and serve until the process is killed. TLS is required for any
/// non-loopback host (spec.md §6.5 "Security defaults"); a loopback bind
/// without TLS is allowed but logged.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);

    if !config.host.is_loopback() {
        if !config.require_tls {
            anyhow::bail!(
                "Refusing to bind non-loopback address {} without BAP_REQUIRE_TLS=1. \
                 Terminate TLS in front of this process or bind to 127.0.0.1.",
                config.host
            );
        }
        tracing::info!(host = %config.host, "binding non-loopback address; TLS must be terminated upstream");
    } else if config.require_tls {
        tracing::warn!("BAP_REQUIRE_TLS is set but host is loopback; binding anyway");
    }

    let addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "bap-server listening");

    let manager = SessionManager::global();
    manager.spawn_cleanup_task();

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept connection");
                continue;
            }
        };

        let config = config.clone();
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, config, manager).await {
                tracing::debug!(client = %peer, error = %e, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<Config>,
    manager: Arc<SessionManager>,
) -> anyhow::Result<()> {
    let guard = match manager.reserve_connection(peer.ip()) {
        Ok(g) => g,
        Err(_) => {
            tracing::warn!(client = %peer, "rejecting connection: per-IP limit reached");
            record(AuditEvent::ConnectionLimit, json!({ "ip": peer.ip().to_string() }));
            return Ok(());
        }
    };

    let auth_token = config.auth_token.clone();
    let mut authorized = auth_token.is_none();

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, |req: &Request, response: Response| {
        if let Some(expected) = &auth_token {
            let provided = extract_token(req);
            match provided {
                Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
                    authorized = true;
                    Ok(response)
                }
                _ => {
                    record(AuditEvent::AuthFailed, json!({ "ip": peer.ip().to_string() }));
                    let mut rejection: HttpResponse<Option<String>> = HttpResponse::new(Some("Unauthorized".to_string()));
                    *rejection.status_mut() = StatusCode::UNAUTHORIZED;
                    Err(rejection)
                }
            }
        } else {
            Ok(response)
        }
    })
    .await
    {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(client = %peer, error = %e, "websocket handshake failed");
            return Ok(());
        }
    };

    if !authorized {
        return Ok(());
    }

    if config.auth_token.is_some() {
        record(AuditEvent::AuthSuccess, json!({ "ip": peer.ip().to_string() }));
    }
    tracing::info!(client = %peer, "connection established");

    let (session, mut outbound_rx, close_rx) = manager.create_session(config.scopes.clone(), Instant::now());
    let session_id = session.lock().await.id.clone();

    let (mut sink, mut stream) = ws_stream.split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            match msg {
                OutboundMessage::Frame(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame { code: code.into(), reason: Cow::Owned(reason) };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    run_request_loop(&session, &config, &mut stream, peer, close_rx).await;

    // Give the writer task a moment to flush any queued close frame
    // (`Session::request_close` sends one before the read loop breaks) before
    // forcing it down.
    if tokio::time::timeout(std::time::Duration::from_secs(2), writer).await.is_err() {
        tracing::debug!(client = %peer, "writer task did not flush in time");
    }
    manager.remove_session(&session_id).await;
    drop(guard);
    tracing::info!(client = %peer, session_id = %session_id, "connection closed");
    Ok(())
}

/// Read and dispatch frames until the socket closes, the idle timeout
/// fires, or a message exceeds the configured size cap (spec.md §4.1 "oversize
/// frames close the connection").
async fn run_request_loop(
    session: &Mutex<Session>,
    config: &Config,
    stream: &mut (impl futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    peer: SocketAddr,
    mut close_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = close_rx.changed() => {
                // `Session::request_close` already queued the `Close` frame
                // on the outbound channel; just stop reading so the writer
                // task's send isn't racing a `shutdown()`-torn-down engine.
                if changed.is_ok() {
                    tracing::info!(client = %peer, "session closed externally, ending read loop");
                } else {
                    tracing::debug!(client = %peer, "close signal sender dropped");
                }
                break;
            }
            next = tokio::time::timeout(crate::session::DEFAULT_IDLE_TIMEOUT, stream.next()) => {
                let msg = match next {
                    Ok(Some(Ok(msg))) => msg,
                    Ok(Some(Err(e))) => {
                        tracing::debug!(client = %peer, error = %e, "websocket read error");
                        break;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tracing::info!(client = %peer, "idle timeout, closing connection");
                        session.lock().await.request_close(1008, "idle timeout exceeded");
                        break;
                    }
                };

                match msg {
                    Message::Text(text) => {
                        if text.len() > config.max_message_bytes {
                            tracing::warn!(client = %peer, size = text.len(), "oversize frame, closing connection");
                            session.lock().await.request_close(1009, "message exceeds size limit");
                            break;
                        }
                        handle_text(session, config, &text).await;
                    }
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
                }
            }
        }
    }
}

async fn handle_text(session: &Mutex<Session>, config: &Config, text: &str) {
    let mut guard = session.lock().await;
    match decode_frame(text) {
        Ok(Frame::Request { id, method, params }) => {
            let response = dispatcher::handle_request(&mut guard, config, id, &method, params).await;
            guard.notify(response);
        }
        Ok(Frame::Notification { method, .. }) => {
            tracing::debug!(method = %method, "ignoring client notification");
        }
        Ok(Frame::Response { .. }) => {
            // A response frame addressed to us would only occur if the
            // client echoed a server-initiated request; BAP never sends
            // the client one, so these are always stray and dropped.
        }
        Err(err) => {
            guard.notify(encode_response_error(json!(null), &err));
        }
    }
}

/// Pull the auth token off the handshake request, checked in the order
/// spec.md §4.2/§6.1 lists: `Authorization: Bearer <token>`, then the
/// `X-BAP-Token` header, then a `?token=` query parameter (for browser-based
/// clients that cannot set custom headers on a WebSocket upgrade).
fn extract_token(req: &Request) -> Option<String> {
    if let Some(bearer) = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.to_string());
    }
    if let Some(header) = req.headers().get("X-BAP-Token").and_then(|h| h.to_str().ok()) {
        return Some(header.to_string());
    }
    let query = req.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

/// Constant-time comparison for the bearer token check (spec.md §4.2
/// "Authentication"): a length- and content-dependent-time `==` would leak
/// token bytes through a timing side channel.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
