//! HTTP parameter pollution.
//!
//! `?sort=price&sort=name` arrives as two values. Most handlers expect one,
//! so repeated keys collapse to their last occurrence. Keys on the whitelist
//! are genuine multi-value filters and keep every value.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::context::{Context, QueryValue};
use crate::middleware::body::is_form;
use crate::stage::{BoxFuture, Flow, Stage};

/// Values collapsed out of a url-encoded form body.
#[derive(Clone, Debug, Default)]
pub struct BodyPolluted(pub BTreeMap<String, Vec<String>>);

#[derive(Clone, Debug, Default)]
pub struct ParameterPollution {
    whitelist: HashSet<String>,
}

impl ParameterPollution {
    pub fn new<I, S>(whitelist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { whitelist: whitelist.into_iter().map(Into::into).collect() }
    }

    fn normalise(&self, mut ctx: Context) -> Flow {
        let mut polluted = BTreeMap::new();
        for (key, value) in ctx.query_mut().iter_mut() {
            if !value.is_many() || self.whitelist.contains(key) {
                continue;
            }
            let last = value.last().to_owned();
            let all: Vec<String> = value.values().into_iter().map(str::to_owned).collect();
            polluted.insert(key.clone(), all);
            *value = QueryValue::One(last);
        }
        ctx.query_polluted_mut().extend(polluted);

        if is_form(&ctx) {
            let mut body_polluted = BTreeMap::new();
            if let Value::Object(map) = ctx.body_mut() {
                for (key, value) in map.iter_mut() {
                    if self.whitelist.contains(key) {
                        continue;
                    }
                    if let Value::Array(items) = value {
                        let all: Vec<String> =
                            items.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect();
                        body_polluted.insert(key.clone(), all);
                        let last = items.pop().unwrap_or(Value::Null);
                        *value = last;
                    }
                }
            }
            if !body_polluted.is_empty() {
                ctx.extensions_mut().insert(BodyPolluted(body_polluted));
            }
        }

        Flow::Continue(ctx)
    }
}

impl Stage for ParameterPollution {
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin(std::future::ready(self.normalise(ctx)))
    }

    fn name(&self) -> &'static str { "parameter_pollution" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;
    use serde_json::json;

    fn stage() -> ParameterPollution {
        ParameterPollution::new(["duration", "price"])
    }

    #[tokio::test]
    async fn whitelisted_keys_stay_arrays() {
        let Flow::Continue(ctx) = stage().call(Context::get("/api/v1/tours?price=10&price=20")).await else {
            panic!()
        };
        assert_eq!(ctx.query().get("price").unwrap().values(), vec!["10", "20"]);
        assert!(ctx.query_polluted().is_empty());
    }

    #[tokio::test]
    async fn other_keys_collapse_to_last() {
        let Flow::Continue(ctx) = stage().call(Context::get("/api/v1/tours?page=1&page=2")).await else {
            panic!()
        };
        assert_eq!(ctx.query().get("page"), Some(&QueryValue::One("2".into())));
        assert_eq!(ctx.query_polluted()["page"], vec!["1".to_owned(), "2".to_owned()]);
    }

    #[tokio::test]
    async fn form_bodies_collapse_too() {
        let mut ctx = Context::get("/submit-user-data")
            .with_header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        *ctx.body_mut() = json!({ "name": ["a", "b"], "price": ["1", "2"] });
        let Flow::Continue(ctx) = stage().call(ctx).await else { panic!() };
        assert_eq!(ctx.body(), &json!({ "name": "b", "price": ["1", "2"] }));
        assert!(ctx.extensions().get::<BodyPolluted>().is_some());
    }
}
