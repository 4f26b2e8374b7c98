/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/


//! Newline-delimited JSON duplex connections.
//!
//! The first line must authenticate the peer; every following line is one
//! [`SessionRequest`]. Replies and pushes are written back as JSON lines in the
//! order the session enqueued them. A line longer than [`MAX_LINE_BYTES`] is rejected and
//! ends the connection.

use hive_hub::session::{Reply, ReplyStatus, SessionRequest};
use hive_hub::{HiveHub, HubError, Principal};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

const COMPONENT: &str = "connection";

const AUTHENTICATE: &str = "authenticate";

/// Longest accepted request line, without its terminator.
pub(crate) const MAX_LINE_BYTES: usize = 64 * 1024;

/// How long frames enqueued before close may take to reach the peer.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

enum Inbound {
    Line(String),
    TooLong,
    Eof,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Authenticate {
    action: String,
    principal: String,
}

#[derive(Serialize)]
struct AuthenticateAck {
    action: &'static str,
    status: ReplyStatus,
}

struct Rejected {
    action: String,
    request_id: Option<String>,
    err: HubError,
}

pub(crate) async fn serve(hub: HiveHub, stream: TcpStream, peer: SocketAddr) {
    let (reader, writer) = stream.into_split();
    serve_io(hub, reader, writer, peer.to_string()).await;
}

pub(crate) async fn serve_io<R, W>(hub: HiveHub, reader: R, mut writer: W, peer: String)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    let principal = match read_line(&mut reader, &mut buf).await {
        Ok(Inbound::Line(line)) => match authenticate(&line) {
            Ok(principal) => principal,
            Err(err) => {
                warn!(component = COMPONENT, peer = %peer, err = %err, "authentication rejected");
                let _ = write_line(&mut writer, &Reply::failure(AUTHENTICATE, None, &err)).await;
                return;
            }
        },
        Ok(Inbound::TooLong) => {
            warn!(component = COMPONENT, peer = %peer, "authentication line too long");
            let err = line_too_long();
            let _ = write_line(&mut writer, &Reply::failure(AUTHENTICATE, None, &err)).await;
            return;
        }
        Ok(Inbound::Eof) => {
            debug!(component = COMPONENT, peer = %peer, "peer left before authenticating");
            return;
        }
        Err(e) => {
            warn!(component = COMPONENT, peer = %peer, err = %e, "failed to read from peer");
            return;
        }
    };

    let ack = AuthenticateAck {
        action: AUTHENTICATE,
        status: ReplyStatus::Success,
    };
    if let Err(e) = write_line(&mut writer, &ack).await {
        warn!(component = COMPONENT, peer = %peer, err = %e, "failed to write to peer");
        return;
    }

    let (session, mut outbound) = hub.open_session(principal);
    info!(
        component = COMPONENT,
        peer = %peer,
        session_id = session.id(),
        principal = %session.principal(),
        "connection authenticated"
    );

    let writer_peer = peer.clone();
    let mut writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = write_line(&mut writer, &frame).await {
                warn!(component = COMPONENT, peer = %writer_peer, err = %e, "failed to write to peer");
                break;
            }
        }
    });

    loop {
        match read_line(&mut reader, &mut buf).await {
            Ok(Inbound::Line(line)) if line.trim().is_empty() => continue,
            Ok(Inbound::Line(line)) => match parse_request(&line) {
                Ok(request) => session.handle(request).await,
                Err(rejected) => {
                    session
                        .reject(&rejected.action, rejected.request_id, &rejected.err)
                        .await
                }
            },
            Ok(Inbound::TooLong) => {
                session.reject("unknown", None, &line_too_long()).await;
                break;
            }
            Ok(Inbound::Eof) => break,
            Err(e) => {
                warn!(component = COMPONENT, peer = %peer, err = %e, "failed to read from peer");
                break;
            }
        }
    }

    let removed = session.close();
    drop(session);
    if tokio::time::timeout(WRITER_DRAIN, &mut writer_task).await.is_err() {
        writer_task.abort();
    }
    info!(component = COMPONENT, peer = %peer, removed, "connection closed");
}

/// Reads one `\n`-terminated line, reading at most one byte past [`MAX_LINE_BYTES`].
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Inbound>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_LINE_BYTES as u64 + 1;
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(Inbound::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > MAX_LINE_BYTES {
        return Ok(Inbound::TooLong);
    }
    let line = String::from_utf8(std::mem::take(buf))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Inbound::Line(line))
}

fn line_too_long() -> HubError {
    HubError::validation(format!("request line exceeds {MAX_LINE_BYTES} bytes"))
}

fn authenticate(line: &str) -> Result<Principal, HubError> {
    let request: Authenticate = serde_json::from_str(line)
        .map_err(|e| HubError::validation(format!("expected an authenticate request: {e}")))?;
    if request.action != AUTHENTICATE {
        return Err(HubError::validation(format!(
            "expected action {AUTHENTICATE}, got {}",
            request.action
        )));
    }
    if request.principal.trim().is_empty() {
        return Err(HubError::validation("principal must not be empty"));
    }
    Ok(Principal::new(request.principal))
}

fn parse_request(line: &str) -> Result<SessionRequest, Rejected> {
    let value: Value = serde_json::from_str(line).map_err(|e| Rejected {
        action: "unknown".to_string(),
        request_id: None,
        err: HubError::validation(format!("malformed request: {e}")),
    })?;

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let request_id = value
        .get("requestId")
        .and_then(Value::as_str)
        .map(str::to_string);

    serde_json::from_value(value).map_err(|e| Rejected {
        err: HubError::validation(format!("invalid {action} request: {e}")),
        action,
        request_id,
    })
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(value).map_err(io::Error::other)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
