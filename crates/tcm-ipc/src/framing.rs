use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io;
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use tcm_core::proto::{Envelope, Outbound, Request, Response};

pub type FramedStream = Framed<UnixStream, LengthDelimitedCodec>;

pub fn framed(stream: UnixStream) -> FramedStream {
    Framed::new(stream, LengthDelimitedCodec::new())
}

/// Client -> daemon.
pub async fn send_request(framed: &mut FramedStream, req: &Envelope<Request>) -> io::Result<()> {
    send_json(framed, req).await
}

/// Daemon side: `None` once the client hung up.
pub async fn read_request(framed: &mut FramedStream) -> io::Result<Option<Envelope<Request>>> {
    read_json(framed).await
}

/// Daemon -> client, either a response or an event.
pub async fn send_outbound(framed: &mut FramedStream, out: &Outbound) -> io::Result<()> {
    send_json(framed, out).await
}

pub async fn read_outbound(framed: &mut FramedStream) -> io::Result<Option<Outbound>> {
    read_json(framed).await
}

/// Read outbound frames until a response arrives, dropping interleaved events.
pub async fn read_response(framed: &mut FramedStream) -> io::Result<Envelope<Response>> {
    loop {
        match read_outbound(framed).await? {
            Some(Outbound::Response(env)) => return Ok(env),
            Some(Outbound::Event(_)) => continue,
            None => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "socket closed")),
        }
    }
}

async fn send_json<T: Serialize>(framed: &mut FramedStream, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    framed.send(tokio_util::bytes::Bytes::from(bytes)).await
}

async fn read_json<T: DeserializeOwned>(framed: &mut FramedStream) -> io::Result<Option<T>> {
    let Some(frame) = framed.next().await else {
        return Ok(None);
    };
    let frame = frame?;
    serde_json::from_slice::<T>(&frame)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
