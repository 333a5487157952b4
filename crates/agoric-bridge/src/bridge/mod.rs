//! The message router: reads tagged requests, runs each operation on its own task, and writes
//! exactly one reply per recognised request.

pub mod protocol;
pub mod transport;

use crate::{
    errors::{ReplyError, UNKNOWN_ERROR},
    offers,
    session::Bridge,
    wallet, watcher,
};
use protocol::{InboundMessage, Operation, Outbound, Reply, MAX_LINE_BYTES};
use serde_json::Value;
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt as _, AsyncRead, AsyncWrite, BufReader},
    sync::mpsc,
    task::JoinSet,
};
use tracing::{debug, info, warn};

/// `SIGN_DATA` carries the text to sign directly or as `{data}`; anything else is signed as its
/// compact JSON rendering.
fn sign_payload(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other
            .get("data")
            .and_then(Value::as_str)
            .map_or_else(|| other.to_string(), str::to_owned),
    }
}

async fn dispatch(bridge: &Bridge, op: Operation, data: Value) -> eyre::Result<Value> {
    let v = match op {
        Operation::ConnectWallet => {
            let network = data.get("network").and_then(Value::as_str);
            serde_json::to_value(wallet::connect(bridge, network).await?)?
        }
        Operation::SignData => {
            serde_json::to_value(wallet::sign(bridge, &sign_payload(&data)).await?)?
        }
        Operation::FundSurvey => serde_json::to_value(offers::fund(bridge, data).await?)?,
        Operation::ClaimRewards => serde_json::to_value(offers::claim(bridge, data).await?)?,
        Operation::GetStatus => serde_json::to_value(bridge.status().await)?,
    };
    Ok(v)
}

async fn handle(
    bridge: Arc<Bridge>,
    op: Operation,
    msg: InboundMessage,
    out: mpsc::UnboundedSender<Outbound>,
) {
    let InboundMessage { id, data, .. } = msg;
    debug!(?op, %id, "request");
    // A nested task so a panicking operation still gets its reply.
    let task = tokio::spawn(async move { dispatch(&bridge, op, data).await });
    let reply = match task.await {
        Ok(Ok(v)) => Reply::ok(id, v),
        Ok(Err(e)) => {
            let re = ReplyError::from_report(&e);
            warn!(?op, code = %re.code, message = %re.message, "request failed");
            Reply::err(id, re)
        }
        Err(e) => Reply::err(
            id,
            ReplyError::new(UNKNOWN_ERROR, format!("request handler failed: {e}")),
        ),
    };
    if out.send(Outbound::Reply(reply)).is_err() {
        warn!("reply dropped: output closed");
    }
}

/// Start the watcher for the session's network, mark the session initialized, and announce it.
/// A request that already started a watcher (possibly on another network) takes precedence.
pub async fn initialize(bridge: Arc<Bridge>, out: mpsc::UnboundedSender<Outbound>) {
    let pending = {
        let st = bridge.state.lock().await;
        st.watcher.is_none().then_some(st.profile)
    };
    if let Some(profile) = pending {
        watcher::ensure_started(&bridge, profile).await;
    }
    let network = {
        let mut st = bridge.state.lock().await;
        st.initialized = true;
        st.profile.name
    };
    info!(network, "bridge ready");
    if out.send(Outbound::ready()).is_err() {
        warn!("ready announcement dropped: output closed");
    }
}

fn log_handler_exit(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        warn!(error = %e, "request task ended abnormally");
    }
}

/// Serve requests from `reader` until EOF, writing replies to `writer`.
pub async fn serve<R, W>(bridge: Arc<Bridge>, reader: R, writer: W) -> eyre::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(frame) = out_rx.recv().await {
            transport::write_frame(&mut writer, &frame).await?;
        }
        Ok::<(), eyre::Report>(())
    });

    let init = tokio::spawn(initialize(Arc::clone(&bridge), out_tx.clone()));
    let mut handlers = JoinSet::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "input read failed; closing");
                break;
            }
        }
        if buf.len() > MAX_LINE_BYTES {
            warn!(len = buf.len(), "input line too long; closing");
            break;
        }
        let Ok(text) = std::str::from_utf8(&buf) else {
            warn!(len = buf.len(), "input line is not utf-8; dropped");
            continue;
        };
        let line = text.trim();
        if line.is_empty() {
            continue;
        }
        let Some((op, msg)) = protocol::parse_line(line) else {
            continue;
        };
        handlers.spawn(handle(Arc::clone(&bridge), op, msg, out_tx.clone()));
        while let Some(res) = handlers.try_join_next() {
            log_handler_exit(res);
        }
    }

    info!(in_flight = handlers.len(), "input closed; draining requests");
    init.abort();
    while let Some(res) = handlers.join_next().await {
        log_handler_exit(res);
    }
    drop(out_tx);
    writer_task.await??;
    Ok(())
}
