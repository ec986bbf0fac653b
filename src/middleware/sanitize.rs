//! Input sanitisation against injection payloads.
//!
//! Two independent passes over the body, the query and the path params:
//!
//! - **operator keys**: any object key starting with `$` or containing `.`
//!   is removed (or, in strict mode, rejects the request). These are the
//!   shapes document-database query operators take.
//! - **markup**: every `<` in a string value becomes `&lt;`.
//!
//! Path params only exist once a route has matched, after the global stages
//! have run. The stage therefore leaves a [`ParamPolicy`] in the context and
//! the router applies it with [`sanitize_params`] right after matching.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::context::{Context, Query, QueryValue};
use crate::failure::Failure;
use crate::stage::{BoxFuture, Flow, Stage};

#[derive(Clone, Copy, Debug, Default)]
pub struct Sanitize {
    reject_injection: bool,
}

impl Sanitize {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `400` instead of silently dropping operator keys.
    pub fn reject_injection(mut self, reject: bool) -> Self {
        self.reject_injection = reject;
        self
    }

    fn clean(&self, mut ctx: Context) -> Flow {
        let mut removed = Vec::new();

        clean_value(ctx.body_mut(), &mut removed);
        clean_query(ctx.query_mut(), &mut removed);
        ctx.extensions_mut()
            .insert(ParamPolicy { reject_injection: self.reject_injection });

        match verdict(&ctx, &removed, self.reject_injection) {
            Some(failure) => Flow::Fail(failure),
            None => Flow::Continue(ctx),
        }
    }
}

impl Stage for Sanitize {
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin(std::future::ready(self.clean(ctx)))
    }

    fn name(&self) -> &'static str { "sanitize" }
}

/// Left in the context by [`Sanitize`] for the params pass.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ParamPolicy {
    reject_injection: bool,
}

/// Cleans route params the way [`Sanitize`] cleaned the rest of the input.
/// Does nothing when no sanitize stage ran for this request.
pub(crate) fn sanitize_params(ctx: &mut Context) -> Result<(), Failure> {
    let Some(policy) = ctx.extensions().get::<ParamPolicy>().copied() else {
        return Ok(());
    };
    let mut removed = Vec::new();
    clean_params(ctx.params_mut(), &mut removed);
    match verdict(ctx, &removed, policy.reject_injection) {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

fn verdict(ctx: &Context, removed: &[String], reject_injection: bool) -> Option<Failure> {
    if removed.is_empty() {
        return None;
    }
    warn!(path = ctx.path(), keys = ?removed, "operator keys in request input");
    reject_injection.then(|| {
        Failure::bad_request(format!("Request contains disallowed key `{}`", removed[0]))
    })
}

fn is_operator_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

fn escape_markup(s: &str) -> Option<String> {
    s.contains('<').then(|| s.replace('<', "&lt;"))
}

fn clean_value(value: &mut Value, removed: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            map.retain(|k, _| {
                let keep = !is_operator_key(k);
                if !keep {
                    removed.push(k.clone());
                }
                keep
            });
            for v in map.values_mut() {
                clean_value(v, removed);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| clean_value(v, removed)),
        Value::String(s) => {
            if let Some(escaped) = escape_markup(s) {
                *s = escaped;
            }
        }
        _ => {}
    }
}

fn clean_query(query: &mut Query, removed: &mut Vec<String>) {
    query.retain(|k, _| {
        let keep = !is_operator_key(k);
        if !keep {
            removed.push(k.clone());
        }
        keep
    });
    for v in query.values_mut() {
        match v {
            QueryValue::One(s) => {
                if let Some(escaped) = escape_markup(s) {
                    *s = escaped;
                }
            }
            QueryValue::Many(vs) => {
                for s in vs.iter_mut() {
                    if let Some(escaped) = escape_markup(s) {
                        *s = escaped;
                    }
                }
            }
        }
    }
}

fn clean_params(params: &mut HashMap<String, String>, removed: &mut Vec<String>) {
    params.retain(|k, _| {
        let keep = !is_operator_key(k);
        if !keep {
            removed.push(k.clone());
        }
        keep
    });
    for v in params.values_mut() {
        if let Some(escaped) = escape_markup(v) {
            *v = escaped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_body(body: Value) -> Context {
        let mut ctx = Context::get("/api/v1/users/login?$where=1&name=%3Cb%3E");
        *ctx.body_mut() = body;
        ctx
    }

    #[tokio::test]
    async fn strips_operator_keys_and_escapes_markup() {
        let ctx = with_body(json!({
            "email": { "$gt": "" },
            "profile.admin": true,
            "bio": "<script>alert(1)</script>",
            "tags": ["<i>x</i>"]
        }));
        let Flow::Continue(ctx) = Sanitize::new().call(ctx).await else { panic!() };
        assert_eq!(
            ctx.body(),
            &json!({
                "email": {},
                "bio": "&lt;script>alert(1)&lt;/script>",
                "tags": ["&lt;i>x&lt;/i>"]
            })
        );
        assert!(ctx.query().get("$where").is_none());
        assert_eq!(ctx.query_value("name"), Some("&lt;b>"));
    }

    #[tokio::test]
    async fn strict_mode_rejects() {
        let ctx = with_body(json!({ "password": { "$ne": null } }));
        match Sanitize::new().reject_injection(true).call(ctx).await {
            Flow::Fail(f) => assert_eq!(f.status(), http::StatusCode::BAD_REQUEST),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn params_are_cleaned_once_matched() {
        let Flow::Continue(mut ctx) = Sanitize::new().call(Context::get("/tour/x")).await else {
            panic!()
        };
        ctx.params_mut().insert("slug".into(), "<img>".into());
        ctx.params_mut().insert("$where".into(), "1".into());
        sanitize_params(&mut ctx).unwrap();
        assert_eq!(ctx.param("slug"), Some("&lt;img>"));
        assert!(ctx.param("$where").is_none());
    }

    #[tokio::test]
    async fn params_follow_strict_mode() {
        let stage = Sanitize::new().reject_injection(true);
        let Flow::Continue(mut ctx) = stage.call(Context::get("/")).await else { panic!() };
        ctx.params_mut().insert("a.b".into(), "1".into());
        let failure = sanitize_params(&mut ctx).unwrap_err();
        assert_eq!(failure.status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn params_untouched_without_a_sanitize_stage() {
        let mut ctx = Context::get("/");
        ctx.params_mut().insert("slug".into(), "<b>".into());
        sanitize_params(&mut ctx).unwrap();
        assert_eq!(ctx.param("slug"), Some("<b>"));
    }

    #[tokio::test]
    async fn clean_input_passes_untouched() {
        let ctx = Context::get("/?page=2");
        let Flow::Continue(ctx) = Sanitize::new().reject_injection(true).call(ctx).await else { panic!() };
        assert_eq!(ctx.query_value("page"), Some("2"));
    }
}
