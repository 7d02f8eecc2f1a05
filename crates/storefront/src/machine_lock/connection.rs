//! A single hub connection: negotiate, open the socket, handshake, then
//! exchange records until either side goes away.

use std::collections::VecDeque;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;
use vending_core::SessionId;

use super::LockError;
use super::protocol::{
    self, HubMessage, NegotiateResponse, UNLOCK, encode_close, encode_invocation, encode_ping,
    handshake_request, parse_handshake_response, split_records,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the release sequence (Unlock, Close, socket close).
const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens hub connections for one session.
#[derive(Debug, Clone)]
pub(crate) struct HubConnector {
    http: reqwest::Client,
    hub_url: Url,
    session_id: SessionId,
    skip_negotiation: bool,
    handshake_timeout: Duration,
}

impl HubConnector {
    pub(crate) fn new(
        http: reqwest::Client,
        hub_url: Url,
        session_id: SessionId,
        skip_negotiation: bool,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            http,
            hub_url,
            session_id,
            skip_negotiation,
            handshake_timeout,
        }
    }

    /// Open a connection and complete the handshake.
    pub(crate) async fn connect(&self) -> Result<HubConnection, LockError> {
        tokio::time::timeout(self.handshake_timeout, self.open())
            .await
            .map_err(|_| LockError::Timeout)?
    }

    async fn open(&self) -> Result<HubConnection, LockError> {
        let token = if self.skip_negotiation {
            None
        } else {
            Some(self.negotiate().await?)
        };

        let url = socket_url(&self.hub_url, &self.session_id, token.as_deref())?;
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| LockError::Connect(format!("Failed to open {}: {e}", self.hub_url)))?;

        let mut conn = HubConnection {
            ws,
            pending: VecDeque::new(),
            next_invocation_id: 0,
        };
        conn.handshake().await?;

        tracing::debug!(session_id = %self.session_id, "Hub connection established");
        Ok(conn)
    }

    async fn negotiate(&self) -> Result<String, LockError> {
        let url = negotiate_url(&self.hub_url, &self.session_id)?;
        let response = self.http.post(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LockError::Negotiate(format!("HTTP {status}")));
        }

        let body: NegotiateResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(LockError::Negotiate(error));
        }
        if body.url.is_some() {
            return Err(LockError::Negotiate("redirects are not supported".to_string()));
        }
        if !body.offers_websockets() {
            return Err(LockError::Negotiate("server does not offer WebSockets".to_string()));
        }

        body.connection_token()
            .map(str::to_string)
            .ok_or_else(|| LockError::Negotiate("missing connection token".to_string()))
    }
}

/// `{hub}/negotiate?negotiateVersion=1&sessionId=..`, keeping any query the
/// hub URL already carries.
pub(crate) fn negotiate_url(hub_url: &Url, session_id: &SessionId) -> Result<Url, LockError> {
    if hub_url.cannot_be_a_base() {
        return Err(LockError::InvalidUrl(hub_url.to_string()));
    }
    let mut url = hub_url.clone();
    let path = format!("{}/negotiate", hub_url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .append_pair("negotiateVersion", "1")
        .append_pair("sessionId", session_id.as_str());
    Ok(url)
}

/// Socket URL: the hub URL with a ws/wss scheme, the session token and,
/// after negotiation, the connection token.
pub(crate) fn socket_url(
    hub_url: &Url,
    session_id: &SessionId,
    connection_token: Option<&str>,
) -> Result<Url, LockError> {
    let scheme = match hub_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(LockError::InvalidUrl(format!("unsupported scheme {other}"))),
    };

    let mut url = hub_url.clone();
    url.set_scheme(scheme)
        .map_err(|()| LockError::InvalidUrl(hub_url.to_string()))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("sessionId", session_id.as_str());
        if let Some(token) = connection_token {
            query.append_pair("id", token);
        }
    }
    Ok(url)
}

/// A live, handshaken hub connection.
pub(crate) struct HubConnection {
    ws: WsStream,
    /// Records already read off the socket but not yet handed out.
    pending: VecDeque<HubMessage>,
    next_invocation_id: u64,
}

impl HubConnection {
    async fn handshake(&mut self) -> Result<(), LockError> {
        self.send_record(handshake_request()?).await?;

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let mut records = split_records(&text);
                    let Some(answer) = records.next() else {
                        continue;
                    };
                    parse_handshake_response(answer)?;
                    let rest: Vec<&str> = records.collect();
                    self.queue_records(rest);
                    return Ok(());
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(LockError::Handshake("connection closed during handshake".to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(LockError::Transport(e.to_string())),
            }
        }
    }

    fn queue_records<'a>(&mut self, records: impl IntoIterator<Item = &'a str>) {
        for record in records {
            match protocol::parse_message(record) {
                Ok(message) => self.pending.push_back(message),
                Err(e) => tracing::warn!(error = %e, "Dropping malformed hub record"),
            }
        }
    }

    /// Next message from the server. Cancel-safe: records of a frame are
    /// queued before the first one is returned.
    pub(crate) async fn recv(&mut self) -> Result<HubMessage, LockError> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(message);
            }

            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => self.queue_records(split_records(&text)),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Binary(_))) => {
                    tracing::warn!("Ignoring binary frame on a text hub connection");
                }
                Some(Ok(Message::Close(_))) | None => return Err(LockError::Closed),
                Some(Err(e)) => return Err(LockError::Transport(e.to_string())),
            }
        }
    }

    /// Invoke a parameterless hub method and return the invocation id its
    /// completion will carry.
    pub(crate) async fn invoke(&mut self, target: &str) -> Result<String, LockError> {
        let id = self.next_invocation_id.to_string();
        self.next_invocation_id += 1;
        self.send_record(encode_invocation(Some(&id), target)?).await?;
        tracing::debug!(target, invocation_id = %id, "Hub method invoked");
        Ok(id)
    }

    pub(crate) async fn ping(&mut self) -> Result<(), LockError> {
        self.send_record(encode_ping()?).await
    }

    async fn send_record(&mut self, record: String) -> Result<(), LockError> {
        self.ws
            .send(Message::Text(record))
            .await
            .map_err(|e| LockError::Transport(e.to_string()))
    }

    /// Best-effort teardown: `Unlock`, a close record, then the socket
    /// close. Failures are logged and swallowed.
    pub(crate) async fn release(mut self) {
        let sequence = async {
            match self.invoke(UNLOCK).await {
                Ok(_) => tracing::debug!("Unlock sent"),
                Err(e) => tracing::debug!(error = %e, "Unlock not delivered"),
            }
            let closed = match encode_close() {
                Ok(close) => self.send_record(close).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = closed {
                tracing::debug!(error = %e, "Close record not delivered");
            }
            if let Err(e) = self.ws.close(None).await {
                tracing::debug!(error = %e, "Socket close failed");
            }
        };

        if tokio::time::timeout(RELEASE_TIMEOUT, sequence).await.is_err() {
            tracing::debug!("Hub release timed out");
        }
    }
}
