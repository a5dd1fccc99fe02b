//! Minimal gateway client

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One op-0 dispatch received from the server
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub event: String,
    pub data: Value,
}

/// What the server did with the socket
#[derive(Debug)]
pub enum Frame {
    Json(Value),
    Closed(Option<u16>),
}

pub struct WsClient {
    socket: Socket,
    pub user_id: String,
    pub connection_id: String,
    pub online_users: Vec<String>,
}

/// Open a socket and read the Hello frame, without identifying.
pub async fn open_socket(url: &str) -> Result<(Socket, Value)> {
    let (mut socket, _) = connect_async(url).await?;
    let hello = match next_frame(&mut socket, RECV_TIMEOUT).await? {
        Frame::Json(value) => value,
        Frame::Closed(code) => bail!("Closed before Hello: {code:?}"),
    };
    if hello["op"] != 10 {
        bail!("Expected Hello, got {hello}");
    }
    Ok((socket, hello))
}

pub async fn send_json(socket: &mut Socket, value: &Value) -> Result<()> {
    socket.send(Message::Text(value.to_string())).await?;
    Ok(())
}

/// Next text or close frame, skipping pings.
pub async fn next_frame(socket: &mut Socket, wait: Duration) -> Result<Frame> {
    loop {
        let message = tokio::time::timeout(wait, socket.next())
            .await
            .map_err(|_| anyhow!("Timed out waiting for a frame"))?;
        match message {
            Some(Ok(Message::Text(text))) => return Ok(Frame::Json(serde_json::from_str(&text)?)),
            Some(Ok(Message::Close(frame))) => {
                return Ok(Frame::Closed(frame.map(|f| u16::from(f.code))))
            }
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return Ok(Frame::Closed(None)),
        }
    }
}

/// Read until the server closes the socket and return the close code.
pub async fn expect_close(socket: &mut Socket) -> Result<Option<u16>> {
    loop {
        if let Frame::Closed(code) = next_frame(socket, RECV_TIMEOUT).await? {
            return Ok(code);
        }
    }
}

impl WsClient {
    /// Open, identify with `token` and wait for `ready`.
    pub async fn connect(url: &str, token: &str) -> Result<Self> {
        let (mut socket, _) = open_socket(url).await?;
        send_json(&mut socket, &json!({ "op": 2, "d": { "token": token } })).await?;

        let mut client = Self {
            socket,
            user_id: String::new(),
            connection_id: String::new(),
            online_users: Vec::new(),
        };
        let ready = client.expect("ready").await?;
        client.user_id = string_field(&ready, "userId")?;
        client.connection_id = string_field(&ready, "connectionId")?;
        client.online_users = ready["onlineUsers"]
            .as_array()
            .map(|users| {
                users
                    .iter()
                    .filter_map(|u| u.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(client)
    }

    pub async fn send_event(&mut self, event: &str, data: Value) -> Result<()> {
        send_json(&mut self.socket, &json!({ "op": 3, "t": event, "d": data })).await
    }

    pub async fn heartbeat(&mut self) -> Result<()> {
        send_json(&mut self.socket, &json!({ "op": 1 })).await
    }

    pub async fn send_raw(&mut self, value: &Value) -> Result<()> {
        send_json(&mut self.socket, value).await
    }

    /// Next frame of any kind
    pub async fn next_frame(&mut self, wait: Duration) -> Result<Frame> {
        next_frame(&mut self.socket, wait).await
    }

    /// Wait for the dispatch named `event`, skipping any others.
    pub async fn expect(&mut self, event: &str) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match next_frame(&mut self.socket, left).await? {
                Frame::Json(value) => {
                    if let Some(dispatch) = as_dispatch(&value) {
                        if dispatch.event == event {
                            return Ok(dispatch.data);
                        }
                    }
                }
                Frame::Closed(code) => bail!("Socket closed ({code:?}) while waiting for {event}"),
            }
        }
    }

    /// Round-trip through the engine and return every dispatch received
    /// before the reply.
    ///
    /// An unknown event name is answered with an `error` by the engine,
    /// after everything this socket sent earlier has been processed.
    pub async fn sync(&mut self) -> Result<Vec<Dispatch>> {
        self.send_event("sync", json!({})).await?;
        let mut seen = Vec::new();
        loop {
            match next_frame(&mut self.socket, RECV_TIMEOUT).await? {
                Frame::Json(value) => {
                    let Some(dispatch) = as_dispatch(&value) else {
                        continue;
                    };
                    if dispatch.event == "error" && dispatch.data["event"] == "sync" {
                        return Ok(seen);
                    }
                    seen.push(dispatch);
                }
                Frame::Closed(code) => bail!("Socket closed ({code:?}) during sync"),
            }
        }
    }

    /// Join a chat room and wait until the engine has applied it.
    pub async fn join(&mut self, chat_id: impl std::fmt::Display) -> Result<Vec<Dispatch>> {
        self.send_event("join-room", json!({ "chatId": chat_id.to_string() }))
            .await?;
        self.sync().await
    }

    /// Collect every dispatch that arrives within `wait`.
    pub async fn drain(&mut self, wait: Duration) -> Vec<Dispatch> {
        let mut seen = Vec::new();
        while let Ok(Frame::Json(value)) = next_frame(&mut self.socket, wait).await {
            if let Some(dispatch) = as_dispatch(&value) {
                seen.push(dispatch);
            }
        }
        seen
    }

    /// Wait for the server to close the socket.
    pub async fn expect_close(&mut self) -> Result<Option<u16>> {
        expect_close(&mut self.socket).await
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}

fn as_dispatch(value: &Value) -> Option<Dispatch> {
    if value["op"] != 0 {
        return None;
    }
    Some(Dispatch {
        event: value["t"].as_str()?.to_string(),
        data: value["d"].clone(),
    })
}

fn string_field(value: &Value, name: &str) -> Result<String> {
    value[name]
        .as_str()
        .map(String::from)
        .ok_or_else(|| anyhow!("Missing {name} in {value}"))
}
