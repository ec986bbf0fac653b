//! Request body parsing with a hard size cap.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::{Context, QueryValue, RequestBody, group_pairs};
use crate::failure::Failure;
use crate::stage::{BoxFuture, Flow, Stage};

/// Default cap: 10 KB.
pub const DEFAULT_LIMIT: usize = 10 * 1024;

/// Parses `application/json` and `application/x-www-form-urlencoded`
/// bodies into [`Context::body`].
///
/// Oversized JSON and form bodies fail with `413` before any parsing,
/// malformed ones with `400`. Other content types are not capped here and
/// leave an empty object behind. Their bytes stay in [`Context::raw_body`],
/// which is [`RequestBody::Oversized`] when the server stopped reading at
/// the limit.
#[derive(Clone, Copy, Debug)]
pub struct BodyParser {
    limit: usize,
}

impl BodyParser {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize { self.limit }

    fn parse(&self, mut ctx: Context) -> Flow {
        let Some(media) = media_type(&ctx) else {
            *ctx.body_mut() = Value::Object(Map::new());
            return Flow::Continue(ctx);
        };

        let declared = ctx
            .header(CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<usize>().ok());
        if declared.is_some_and(|n| n > self.limit) {
            return Flow::Fail(Failure::payload_too_large());
        }

        let bytes = match ctx.raw_body() {
            RequestBody::Oversized => return Flow::Fail(Failure::payload_too_large()),
            RequestBody::Buffered(b) if b.len() > self.limit => {
                return Flow::Fail(Failure::payload_too_large());
            }
            RequestBody::Buffered(b) => b.clone(),
        };

        let parsed = match media {
            Media::Json if bytes.is_empty() => Ok(Value::Object(Map::new())),
            Media::Json => serde_json::from_slice::<Value>(&bytes)
                .map_err(|e| Failure::bad_request(format!("Invalid JSON in request body: {e}"))),
            Media::Form => serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes)
                .map(|pairs| form_to_json(group_pairs(pairs)))
                .map_err(|e| Failure::bad_request(format!("Invalid form body: {e}"))),
        };

        match parsed {
            Ok(value) => {
                debug!(bytes = bytes.len(), "body parsed");
                *ctx.body_mut() = value;
                Flow::Continue(ctx)
            }
            Err(f) => Flow::Fail(f),
        }
    }
}

impl Default for BodyParser {
    fn default() -> Self { Self::new(DEFAULT_LIMIT) }
}

impl Stage for BodyParser {
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin(std::future::ready(self.parse(ctx)))
    }

    fn name(&self) -> &'static str { "body_parser" }
}

enum Media {
    Json,
    Form,
}

fn media_type(ctx: &Context) -> Option<Media> {
    let raw = ctx.header(CONTENT_TYPE)?;
    let essence = raw.split(';').next()?.trim().to_ascii_lowercase();
    if essence == "application/json" || essence.ends_with("+json") {
        Some(Media::Json)
    } else if essence == "application/x-www-form-urlencoded" {
        Some(Media::Form)
    } else {
        None
    }
}

/// Whether the request declared a url-encoded form body.
pub(crate) fn is_form(ctx: &Context) -> bool {
    matches!(media_type(ctx), Some(Media::Form))
}

fn form_to_json(fields: crate::context::Query) -> Value {
    let map = fields
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                QueryValue::One(s) => Value::String(s),
                QueryValue::Many(vs) => Value::Array(vs.into_iter().map(Value::String).collect()),
            };
            (k, value)
        })
        .collect();
    Value::Object(map)
}
