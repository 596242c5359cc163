//! Request/response plumbing between the sync client and the chat server.
//!
//! [`ChatTransport`] is the seam the sync loop is written against;
//! [`HttpTransport`] is the production implementation over `reqwest`.
//! Timeouts are applied by the caller, not here.

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use tracing::debug;

use palaver_shared::constants::{
    EVENT_POLL_ENDPOINT, JOIN_ENDPOINT, MESSAGE_ENDPOINT, PARAM_EMAIL, PARAM_MESSAGE,
    PARAM_NICK_NAME, PARAM_SINCE,
};
use palaver_shared::protocol::{decode_batch, EventBatch};

use crate::config::Identity;
use crate::error::{ClientError, Result};

/// The three requests the chat protocol consists of.
pub trait ChatTransport: Send + Sync + 'static {
    /// Announce presence. Resolves once the server acknowledged it.
    fn join(&self, identity: &Identity) -> impl Future<Output = Result<()>> + Send;

    /// Long-poll for events with a sequence strictly greater than `since`.
    fn poll(
        &self,
        since: u64,
        identity: &Identity,
    ) -> impl Future<Output = Result<EventBatch>> + Send;

    /// Post a chat message. The response carries nothing of interest.
    fn send_message(
        &self,
        identity: &Identity,
        text: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// HTTP transport: every request is a GET with URL-encoded query parameters.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(server_uri: &str, connect_timeout: Duration) -> Result<Self> {
        let base = normalize_base_uri(server_uri)?;
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        self.base
            .join(name)
            .map_err(|e| ClientError::InvalidServerUri(format!("{name}: {e}")))
    }

    async fn get(&self, name: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = self.endpoint(name)?;
        let response = self.http.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

impl ChatTransport for HttpTransport {
    async fn join(&self, identity: &Identity) -> Result<()> {
        self.get(
            JOIN_ENDPOINT,
            &[
                (PARAM_NICK_NAME, identity.nick_name.as_str()),
                (PARAM_EMAIL, identity.email.as_str()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn poll(&self, since: u64, identity: &Identity) -> Result<EventBatch> {
        let since = since.to_string();
        let response = self
            .get(
                EVENT_POLL_ENDPOINT,
                &[
                    (PARAM_SINCE, since.as_str()),
                    (PARAM_NICK_NAME, identity.nick_name.as_str()),
                    (PARAM_EMAIL, identity.email.as_str()),
                ],
            )
            .await?;

        let body = response.text().await?;
        debug!(since = %since, len = body.len(), "Event poll answered");

        Ok(decode_batch(&body)?)
    }

    async fn send_message(&self, identity: &Identity, text: &str) -> Result<()> {
        self.get(
            MESSAGE_ENDPOINT,
            &[
                (PARAM_NICK_NAME, identity.nick_name.as_str()),
                (PARAM_EMAIL, identity.email.as_str()),
                (PARAM_MESSAGE, text),
            ],
        )
        .await?;
        Ok(())
    }
}

/// Parse the configured server address and make sure endpoint names resolve
/// below it (`http://host/chat` becomes `http://host/chat/`).
pub fn normalize_base_uri(uri: &str) -> Result<Url> {
    let mut url =
        Url::parse(uri.trim()).map_err(|e| ClientError::InvalidServerUri(format!("{uri}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidServerUri(format!(
            "{uri}: unsupported scheme '{}'",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    use palaver_shared::protocol::EventKind;

    use super::*;

    type Params = HashMap<String, String>;

    #[derive(Clone, Default)]
    struct FakeServer {
        requests: Arc<Mutex<Vec<(&'static str, Params)>>>,
        poll_body: Arc<Mutex<String>>,
    }

    impl FakeServer {
        fn requests(&self) -> Vec<(&'static str, Params)> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn join_handler(State(s): State<FakeServer>, Query(q): Query<Params>) -> StatusCode {
        s.requests.lock().unwrap().push(("join", q));
        StatusCode::OK
    }

    async fn poll_handler(State(s): State<FakeServer>, Query(q): Query<Params>) -> String {
        s.requests.lock().unwrap().push(("eventpoll", q));
        s.poll_body.lock().unwrap().clone()
    }

    async fn message_handler(State(s): State<FakeServer>, Query(q): Query<Params>) -> StatusCode {
        s.requests.lock().unwrap().push(("message", q));
        StatusCode::NO_CONTENT
    }

    async fn spawn_server(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    async fn fake_chat_server(poll_body: &str) -> (HttpTransport, FakeServer) {
        let server = FakeServer::default();
        *server.poll_body.lock().unwrap() = poll_body.to_string();

        let router = Router::new()
            .route("/chat/join", get(join_handler))
            .route("/chat/eventpoll", get(poll_handler))
            .route("/chat/message", get(message_handler))
            .with_state(server.clone());
        let addr = spawn_server(router).await;

        let transport =
            HttpTransport::new(&format!("http://{addr}/chat"), Duration::from_secs(5)).unwrap();
        (transport, server)
    }

    fn alice() -> Identity {
        Identity::new("Alice & Zoë", "alice+chat@example.org")
    }

    #[test]
    fn test_normalize_appends_slash() {
        let url = normalize_base_uri("http://10.0.1.114:8080").unwrap();
        assert_eq!(url.as_str(), "http://10.0.1.114:8080/");

        let url = normalize_base_uri("http://example.org/chat?x=1").unwrap();
        assert_eq!(url.as_str(), "http://example.org/chat/");
        assert_eq!(url.join("eventpoll").unwrap().path(), "/chat/eventpoll");
    }

    #[test]
    fn test_normalize_rejects_bad_uris() {
        assert!(matches!(
            normalize_base_uri("not a uri"),
            Err(ClientError::InvalidServerUri(_))
        ));
        assert!(matches!(
            normalize_base_uri("ftp://example.org/"),
            Err(ClientError::InvalidServerUri(_))
        ));
    }

    #[tokio::test]
    async fn test_join_sends_encoded_identity() {
        let (transport, server) = fake_chat_server("[]").await;

        transport.join(&alice()).await.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let (endpoint, params) = &requests[0];
        assert_eq!(*endpoint, "join");
        assert_eq!(params["nickName"], "Alice & Zoë");
        assert_eq!(params["email"], "alice+chat@example.org");
    }

    #[tokio::test]
    async fn test_poll_sends_cursor_and_decodes_batch() {
        let body = r#"[{"sequence": 42, "type": "message", "nickName": "Bob",
                        "message": "hi", "dateTime": "2024-03-05T13:07:09Z",
                        "gravatar": "b0b"}]"#;
        let (transport, server) = fake_chat_server(body).await;

        let events = transport.poll(17, &alice()).await.unwrap().events;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 42);
        assert_eq!(events[0].kind, EventKind::Message);
        assert_eq!(events[0].avatar_key, "b0b");

        let requests = server.requests();
        let (endpoint, params) = &requests[0];
        assert_eq!(*endpoint, "eventpoll");
        assert_eq!(params["since"], "17");
        assert_eq!(params["nickName"], "Alice & Zoë");
    }

    #[tokio::test]
    async fn test_send_message_posts_text() {
        let (transport, server) = fake_chat_server("[]").await;

        transport
            .send_message(&alice(), "1 + 1 = 2 & more?")
            .await
            .unwrap();

        let requests = server.requests();
        let (endpoint, params) = &requests[0];
        assert_eq!(*endpoint, "message");
        assert_eq!(params["message"], "1 + 1 = 2 & more?");
    }

    #[tokio::test]
    async fn test_bad_entry_does_not_sink_batch() {
        let body = r#"[{"sequence": 1, "type": "join", "nickName": "Alice",
                        "message": null, "dateTime": "2024-03-05T13:07:09Z", "gravatar": null},
                       {"sequence": "2", "type": "message", "nickName": "Bob"}]"#;
        let (transport, _server) = fake_chat_server(body).await;

        let batch = transport.poll(0, &alice()).await.unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].kind, EventKind::Join);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].index, 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_protocol_error() {
        let (transport, _server) = fake_chat_server("<html>oops</html>").await;

        let err = transport.poll(0, &alice()).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let router = Router::new().route(
            "/eventpoll",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let addr = spawn_server(router).await;
        let transport =
            HttpTransport::new(&format!("http://{addr}/"), Duration::from_secs(5)).unwrap();

        let err = transport.poll(0, &alice()).await.unwrap_err();
        assert!(matches!(err, ClientError::Status(503)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport =
            HttpTransport::new(&format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
        let err = transport.join(&alice()).await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
        assert!(err.is_transport());
    }
}
