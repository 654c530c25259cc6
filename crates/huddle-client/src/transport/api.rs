//! HTTP JSON API client.

use huddle_proto::{
    HistoryQuery, Message, MessageId, RoomId,
    api::{
        BatchFetchRequest, BotProfile, DecodedPage, HistoryPage, MemberProfile, TRACK_BATCH_PATH,
        TRACK_EVENT_PATH, TrackBatch, TrackedEvent, batch_fetch_path, bots_path, members_path,
    },
};
use reqwest::RequestBuilder;
use tracing::{debug, warn};

use super::TransportError;

/// Client for the versioned `/v1` endpoints.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Client for an API base URL such as `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http: reqwest::Client::new(), base_url, token: None }
    }

    /// Send a bearer token with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One page of history. Malformed messages are dropped but still counted
    /// in [`DecodedPage::returned`].
    pub async fn history(&self, query: &HistoryQuery) -> Result<DecodedPage, TransportError> {
        let request = self.http.get(self.url(&query.path())).query(&query.query_pairs());
        let page: HistoryPage = self.authorize(request).send().await?.error_for_status()?.json().await?;

        debug!(room_id = query.room_id, count = page.messages.len(), "history page fetched");
        Ok(decode_page(page))
    }

    /// Messages by id. Ids the backend does not know are simply absent.
    pub async fn messages_by_id(
        &self,
        room_id: RoomId,
        ids: &[MessageId],
    ) -> Result<Vec<Message>, TransportError> {
        let body = BatchFetchRequest { msg_ids: ids.to_vec() };
        let request = self.http.post(self.url(&batch_fetch_path(room_id))).json(&body);
        let page: HistoryPage = self.authorize(request).send().await?.error_for_status()?.json().await?;

        Ok(decode_page(page).messages)
    }

    /// Human members of a room.
    pub async fn members(&self, room_id: RoomId) -> Result<Vec<MemberProfile>, TransportError> {
        let request = self.http.get(self.url(&members_path(room_id)));
        Ok(self.authorize(request).send().await?.error_for_status()?.json().await?)
    }

    /// Chatbots of a room.
    pub async fn bots(&self, room_id: RoomId) -> Result<Vec<BotProfile>, TransportError> {
        let request = self.http.get(self.url(&bots_path(room_id)));
        Ok(self.authorize(request).send().await?.error_for_status()?.json().await?)
    }

    /// Submit a telemetry batch.
    pub async fn track_batch(&self, events: &[TrackedEvent]) -> Result<(), TransportError> {
        let body = TrackBatch { events: events.to_vec() };
        let request = self.http.post(self.url(TRACK_BATCH_PATH)).json(&body);
        self.authorize(request).send().await?.error_for_status()?;
        Ok(())
    }

    /// Submit a single telemetry event.
    pub async fn track_event(&self, event: &TrackedEvent) -> Result<(), TransportError> {
        let request = self.http.post(self.url(TRACK_EVENT_PATH)).json(event);
        self.authorize(request).send().await?.error_for_status()?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn decode_page(page: HistoryPage) -> DecodedPage {
    let decoded = page.decode();
    for err in &decoded.dropped {
        warn!(%err, "dropping malformed message");
    }
    decoded
}
