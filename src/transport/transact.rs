//! Synchronous request/response exchanges over message sockets
//!
//! [`transact`] is the single client-side primitive every control-plane call
//! goes through: serialize a request, wait up to a timeout for exactly one
//! reply, and map the three outcomes (reply, timeout, remote failure) onto
//! `Ok(Some(_))`, `Ok(None)` and `Err(Error::Remote)`. A timeout is not a
//! hard error; call sites decide whether it retries or latches a failure.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

use super::frame::Message;
use super::socket::MessageSocket;

/// Implemented by every response enum of the control protocols.
///
/// Gives the transaction layer uniform success/failure constructors and a
/// way to recognize an error-tagged reply without knowing the payload kinds.
pub trait Reply: Serialize + DeserializeOwned {
    fn success() -> Self;
    fn failure(message: impl Into<String>) -> Self;

    /// The peer-supplied message if this reply is the error variant.
    fn as_error(&self) -> Option<&str>;
}

/// Issue one request and wait for its reply.
///
/// A zero `timeout` blocks indefinitely; reserve that for bootstrap
/// rendezvous paths. Returns `Ok(None)` when the wait times out with no
/// message, `Err(Error::Remote)` when the peer replied with an error, and
/// `Err(Error::Protocol)` when the reply does not deserialize.
pub async fn transact<Req, Resp>(
    channel: &mut MessageSocket,
    request: &Req,
    timeout: Duration,
) -> Result<Option<Resp>>
where
    Req: Serialize,
    Resp: Reply,
{
    let body = serde_json::to_vec(request)
        .map_err(|e| Error::Protocol(format!("unable to serialize transaction: {e}")))?;

    channel.send(&[body]).await?;

    let message = match recv_with_timeout(channel, timeout).await? {
        Some(message) => message,
        None => return Ok(None),
    };

    let part = message
        .first()
        .ok_or_else(|| Error::Protocol("empty transaction reply".to_string()))?;

    let response: Resp = serde_json::from_slice(part)
        .map_err(|e| Error::Protocol(format!("unable to deserialize transaction: {e}")))?;

    if let Some(what) = response.as_error() {
        return Err(Error::Remote(what.to_string()));
    }

    Ok(Some(response))
}

/// Write a minimal success reply.
pub async fn send_success<T: Reply>(channel: &mut MessageSocket) -> Result<()> {
    send_reply(channel, &T::success()).await
}

/// Write an error-tagged reply carrying `message`.
pub async fn send_failure<T: Reply>(
    channel: &mut MessageSocket,
    message: impl Into<String>,
) -> Result<()> {
    send_reply(channel, &T::failure(message)).await
}

/// Serialize and send an arbitrary reply value.
pub async fn send_reply<T: Reply>(channel: &mut MessageSocket, reply: &T) -> Result<()> {
    let body = serde_json::to_vec(reply)
        .map_err(|e| Error::Protocol(format!("unable to serialize reply: {e}")))?;

    channel.send(&[body]).await
}

/// Relay an opaque request through `target` and pass the reply back to
/// `originator` unmodified, preserving part boundaries.
///
/// Returns `Ok(false)` if `target` does not answer within the timeout.
pub async fn forward(
    target: &mut MessageSocket,
    originator: &mut MessageSocket,
    payload: Message,
    timeout: Duration,
) -> Result<bool> {
    target.send(&payload).await?;

    let reply = match recv_with_timeout(target, timeout).await? {
        Some(reply) => reply,
        None => return Ok(false),
    };

    originator.send(&reply).await?;

    Ok(true)
}

async fn recv_with_timeout(
    channel: &mut MessageSocket,
    timeout: Duration,
) -> Result<Option<Message>> {
    if timeout.is_zero() {
        return channel.recv().await.map(Some);
    }

    match tokio::time::timeout(timeout, channel.recv()).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
    }
}
