//! Client-server API transport built on `reqwest`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};

use weft_core::{
    AccountRecord, BoxedTransport, Event, SyncBatch, Transport, TransportError, TransportFactory,
    TransportResult,
};

/// Path prefix of every client-server endpoint.
const API_PREFIX: [&str; 3] = ["_matrix", "client", "v3"];

/// Extra time granted on top of the long-poll timeout before a sync request
/// is considered dead.
const SYNC_GRACE: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errcode: String,
    #[serde(default)]
    error: String,
}

/// One account's connection to its homeserver.
pub struct HttpTransport {
    http: Client,
    base: Url,
    access_token: String,
    txn_counter: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport with the default request timeout.
    pub fn new(homeserver: &str, access_token: impl Into<String>) -> TransportResult<Self> {
        Self::with_timeout(homeserver, access_token, Duration::from_secs(30))
    }

    /// Creates a transport whose non-sync requests time out after `timeout`.
    pub fn with_timeout(
        homeserver: &str,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> TransportResult<Self> {
        let base = Url::parse(homeserver).map_err(|e| {
            TransportError::InvalidConfig(format!("invalid homeserver URL '{homeserver}': {e}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(TransportError::InvalidConfig(format!(
                "homeserver URL '{homeserver}' cannot be a base"
            )));
        }

        let http = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            base,
            access_token: access_token.into(),
            txn_counter: AtomicU64::new(0),
        })
    }

    /// Builds the URL of an endpoint, percent-encoding every segment.
    fn endpoint(&self, segments: &[&str]) -> TransportResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidConfig("homeserver URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    fn next_txn_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let n = self.txn_counter.fetch_add(1, Ordering::Relaxed);
        format!("weft{millis}.{n}")
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> TransportResult<T> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: e.url().map(Url::to_string).unwrap_or_default(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        trace!(status = status.as_u16(), len = body.len(), "Homeserver response");

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Decodes a protocol error body, tolerating non-JSON bodies.
fn error_from_body(status: u16, body: &[u8]) -> TransportError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) => TransportError::Http {
            status,
            errcode: err.errcode,
            message: err.error,
        },
        Err(_) => TransportError::Http {
            status,
            errcode: String::new(),
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn whoami(&self) -> TransportResult<String> {
        #[derive(Deserialize)]
        struct WhoAmI {
            user_id: String,
        }

        let url = self.endpoint(&["account", "whoami"])?;
        let resp: WhoAmI = self.execute(self.http.get(url)).await?;
        Ok(resp.user_id)
    }

    async fn create_filter(&self, user_id: &str, filter: Value) -> TransportResult<String> {
        #[derive(Deserialize)]
        struct Created {
            filter_id: String,
        }

        let url = self.endpoint(&["user", user_id, "filter"])?;
        let resp: Created = self.execute(self.http.post(url).json(&filter)).await?;
        debug!(user_id, filter_id = %resp.filter_id, "Created sync filter");
        Ok(resp.filter_id)
    }

    async fn sync(
        &self,
        since: Option<&str>,
        filter_id: Option<&str>,
        timeout: Duration,
    ) -> TransportResult<SyncBatch> {
        let mut url = self.endpoint(&["sync"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &timeout.as_millis().to_string());
            if let Some(since) = since {
                query.append_pair("since", since);
            }
            if let Some(filter_id) = filter_id {
                query.append_pair("filter", filter_id);
            }
        }

        let request = self.http.get(url).timeout(timeout + SYNC_GRACE);
        let mut batch: SyncBatch = self.execute(request).await?;
        batch.fill_room_ids();
        Ok(batch)
    }

    async fn send_event(
        &self,
        room_id: &str,
        event_type: &str,
        content: Value,
    ) -> TransportResult<String> {
        #[derive(Deserialize)]
        struct Sent {
            event_id: String,
        }

        let txn_id = self.next_txn_id();
        let url = self.endpoint(&["rooms", room_id, "send", event_type, &txn_id])?;
        let resp: Sent = self.execute(self.http.put(url).json(&content)).await?;
        Ok(resp.event_id)
    }

    async fn join_room(&self, room_id_or_alias: &str) -> TransportResult<String> {
        #[derive(Deserialize)]
        struct Joined {
            room_id: String,
        }

        let url = self.endpoint(&["join", room_id_or_alias])?;
        let resp: Joined = self.execute(self.http.post(url).json(&json!({}))).await?;
        Ok(resp.room_id)
    }

    async fn mark_read(&self, room_id: &str, event_id: &str) -> TransportResult<()> {
        let url = self.endpoint(&["rooms", room_id, "receipt", "m.read", event_id])?;
        let _: Value = self.execute(self.http.post(url).json(&json!({}))).await?;
        Ok(())
    }

    async fn get_event(&self, room_id: &str, event_id: &str) -> TransportResult<Event> {
        let url = self.endpoint(&["rooms", room_id, "event", event_id])?;
        let mut event: Event = self.execute(self.http.get(url)).await?;
        if event.room_id.is_empty() {
            event.room_id = room_id.to_string();
        }
        Ok(event)
    }
}

/// Builds an [`HttpTransport`] per account record.
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    timeout: Duration,
}

impl HttpTransportFactory {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the timeout of non-sync requests.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for HttpTransportFactory {
    fn connect(&self, account: &AccountRecord) -> TransportResult<BoxedTransport> {
        if account.access_token.is_empty() {
            return Err(TransportError::InvalidConfig(format!(
                "account {} has no access token",
                account.user_id
            )));
        }
        let transport =
            HttpTransport::with_timeout(&account.homeserver, &account.access_token, self.timeout)?;
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let transport = HttpTransport::new("https://hs.example.org/", "token").unwrap();
        let url = transport
            .endpoint(&["rooms", "!abc:hs.example.org", "send", "m.room.message", "t1"])
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://hs.example.org/_matrix/client/v3/rooms/!abc:hs.example.org/send/m.room.message/t1"
        );

        let url = transport.endpoint(&["join", "#room/with?odd:hs"]).unwrap();
        assert!(url.path().ends_with("/join/%23room%2Fwith%3Fodd:hs"));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let transport = HttpTransport::new("https://example.org/matrix", "token").unwrap();
        let url = transport.endpoint(&["sync"]).unwrap();
        assert_eq!(url.path(), "/matrix/_matrix/client/v3/sync");
    }

    #[test]
    fn test_invalid_homeserver() {
        assert!(matches!(
            HttpTransport::new("not a url", "token"),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_error_body_decoding() {
        let err = error_from_body(
            401,
            br#"{"errcode":"M_UNKNOWN_TOKEN","error":"Invalid access token"}"#,
        );
        assert!(err.is_unknown_token());

        let err = error_from_body(502, b"Bad Gateway");
        assert!(matches!(
            err,
            TransportError::Http { status: 502, ref message, .. } if message == "Bad Gateway"
        ));
    }

    #[test]
    fn test_factory_rejects_missing_token() {
        let account = AccountRecord::new("@bot:hs", "https://hs", "");
        assert!(HttpTransportFactory::new().connect(&account).is_err());
    }

    #[test]
    fn test_txn_ids_are_unique() {
        let transport = HttpTransport::new("https://hs", "token").unwrap();
        assert_ne!(transport.next_txn_id(), transport.next_txn_id());
    }
}
