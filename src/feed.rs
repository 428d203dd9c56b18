//! Feed event model and client
//!
//! The feed is an append-only, ordered stream of social-graph events. The
//! wire dialect is loose (activity-shaped JSON with optional nesting and
//! variable timestamp precision), so mapping into the typed [`Event`] is
//! total: unknown shapes become [`EventKind::Other`], missing ids become
//! `None`, timestamps normalize to whole seconds. A malformed record must
//! never stall the stream.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::MannaError;

/// Tracked event kinds. Anything the classifier does not understand maps
/// to `Other` and is dropped without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Post,
    Comment,
    /// Like/unlike toggle
    Counter,
    Relation,
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Post => "post",
            EventKind::Comment => "comment",
            EventKind::Counter => "counter",
            EventKind::Relation => "relation",
            EventKind::Other => "other",
        }
    }
}

/// Typed content payload with explicit optional fields. Absence is a plain
/// `None`, never a lookup error.
#[derive(Debug, Clone, Default)]
pub struct EventContent {
    /// Id of the object this event creates or likes
    pub object_id: Option<String>,
    /// For comments: the id of the post/comment being replied to
    pub in_reply_to: Option<String>,
    /// Legacy counters nest the liked item one level deeper
    pub nested_object_id: Option<String>,
}

/// One feed event, already normalized from the wire dialect
#[derive(Debug, Clone)]
pub struct Event {
    /// Opaque, globally unique, monotonically assigned by the feed
    pub id: String,
    /// Public key of the author
    pub sender_key: String,
    /// Event time, unix seconds
    pub timestamp: i64,
    pub kind: EventKind,
    pub content: EventContent,
}

/// Ordered event source. `fetch_since` returns events with ids strictly
/// greater than the cursor; an empty result signals "caught up".
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch_since(&self, cursor: Option<&str>) -> Result<Vec<Event>, MannaError>;
}

// ============================================================================
// Wire dialect
// ============================================================================

/// Raw feed record as served by the chain API
#[derive(Debug, Deserialize)]
struct RawTrx {
    #[serde(rename = "TrxId")]
    trx_id: String,
    #[serde(rename = "SenderPubkey")]
    sender_pubkey: String,
    #[serde(rename = "TimeStamp", default)]
    timestamp: Value,
    #[serde(rename = "Data", default)]
    data: Value,
}

/// Feed timestamps arrive in seconds, milliseconds or nanoseconds depending
/// on the producer. Keep the leading ten digits, which is seconds precision
/// for any plausible event time.
fn normalize_timestamp(raw: &Value) -> i64 {
    let digits = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return 0,
    };

    let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
    let secs = if digits.len() > 10 { &digits[..10] } else { &digits[..] };
    secs.parse().unwrap_or(0)
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

fn map_kind(data: &Value) -> EventKind {
    let activity = data.get("type").and_then(|v| v.as_str()).unwrap_or("");
    match activity {
        "Like" | "Dislike" | "Undo" => EventKind::Counter,
        "Follow" | "Unfollow" | "Block" | "Unblock" => EventKind::Relation,
        "Create" | "Update" => {
            if str_at(data, &["object", "inreplyto", "id"]).is_some() {
                EventKind::Comment
            } else if data.get("object").is_some() {
                EventKind::Post
            } else {
                EventKind::Other
            }
        }
        _ => EventKind::Other,
    }
}

fn map_trx(raw: RawTrx) -> Event {
    let kind = map_kind(&raw.data);

    let content = EventContent {
        object_id: str_at(&raw.data, &["object", "id"]).map(String::from),
        in_reply_to: str_at(&raw.data, &["object", "inreplyto", "id"]).map(String::from),
        nested_object_id: str_at(&raw.data, &["object", "object", "id"]).map(String::from),
    };

    Event {
        id: raw.trx_id,
        sender_key: raw.sender_pubkey,
        timestamp: normalize_timestamp(&raw.timestamp),
        kind,
        content,
    }
}

// ============================================================================
// HTTP client
// ============================================================================

/// Feed client over the chain's HTTP content API
pub struct HttpFeedClient {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl HttpFeedClient {
    pub fn new(base_url: impl Into<String>, page_size: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            page_size,
        }
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_since(&self, cursor: Option<&str>) -> Result<Vec<Event>, MannaError> {
        let mut url = format!("{}/content?num={}", self.base_url, self.page_size);
        if let Some(cursor) = cursor {
            url.push_str(&format!("&start_trx={}", cursor));
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MannaError::Feed(format!("Feed request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MannaError::Feed(format!(
                "Feed returned {}",
                response.status()
            )));
        }

        let raw: Vec<RawTrx> = response
            .json()
            .await
            .map_err(|e| MannaError::Feed(format!("Feed response parse failed: {}", e)))?;

        debug!(count = raw.len(), cursor = ?cursor, "Fetched feed page");

        Ok(raw.into_iter().map(map_trx).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Event {
        map_trx(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_normalize_timestamp_precisions() {
        assert_eq!(normalize_timestamp(&json!(1_684_000_000)), 1_684_000_000);
        assert_eq!(normalize_timestamp(&json!(1_684_000_000_123i64)), 1_684_000_000);
        assert_eq!(
            normalize_timestamp(&json!(1_684_000_000_123_456_789i64)),
            1_684_000_000
        );
        assert_eq!(normalize_timestamp(&json!("1684000000123")), 1_684_000_000);
        assert_eq!(normalize_timestamp(&json!(null)), 0);
    }

    #[test]
    fn test_map_post() {
        let event = parse(json!({
            "TrxId": "t1",
            "SenderPubkey": "alice",
            "TimeStamp": 1_684_000_000,
            "Data": {"type": "Create", "object": {"type": "Note", "id": "p1"}}
        }));
        assert_eq!(event.kind, EventKind::Post);
        assert_eq!(event.content.object_id.as_deref(), Some("p1"));
        assert_eq!(event.content.in_reply_to, None);
    }

    #[test]
    fn test_map_comment() {
        let event = parse(json!({
            "TrxId": "t2",
            "SenderPubkey": "bob",
            "TimeStamp": 1_684_000_000,
            "Data": {
                "type": "Create",
                "object": {"type": "Note", "id": "c1", "inreplyto": {"id": "p1"}}
            }
        }));
        assert_eq!(event.kind, EventKind::Comment);
        assert_eq!(event.content.object_id.as_deref(), Some("c1"));
        assert_eq!(event.content.in_reply_to.as_deref(), Some("p1"));
    }

    #[test]
    fn test_map_legacy_counter() {
        let event = parse(json!({
            "TrxId": "t3",
            "SenderPubkey": "carol",
            "TimeStamp": 1_684_000_000,
            "Data": {
                "type": "Like",
                "object": {"id": "wrap", "object": {"id": "p1"}}
            }
        }));
        assert_eq!(event.kind, EventKind::Counter);
        assert_eq!(event.content.object_id.as_deref(), Some("wrap"));
        assert_eq!(event.content.nested_object_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_unknown_shape_is_other() {
        let event = parse(json!({
            "TrxId": "t4",
            "SenderPubkey": "dave",
            "TimeStamp": 1_684_000_000,
            "Data": {"type": "Announce"}
        }));
        assert_eq!(event.kind, EventKind::Other);

        // Missing Data entirely must not error
        let event = parse(json!({
            "TrxId": "t5",
            "SenderPubkey": "dave",
            "TimeStamp": 1_684_000_000
        }));
        assert_eq!(event.kind, EventKind::Other);
        assert_eq!(event.content.object_id, None);
    }
}
