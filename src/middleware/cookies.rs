//! `Cookie` header parsing.

use std::collections::HashMap;

use http::header::COOKIE;

use crate::context::Context;
use crate::stage::{BoxFuture, Flow, Stage};

/// Fills [`Context::cookies`] from every `Cookie` header on the request.
/// Values are percent-decoded; the first occurrence of a name wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct CookieParser;

impl Stage for CookieParser {
    fn call(&self, mut ctx: Context) -> BoxFuture {
        let cookies = parse_cookies(ctx.headers().get_all(COOKIE).iter().filter_map(|v| v.to_str().ok()));
        ctx.set_cookies(cookies);
        Box::pin(std::future::ready(Flow::Continue(ctx)))
    }

    fn name(&self) -> &'static str { "cookie_parser" }
}

pub(crate) fn parse_cookies<'a>(headers: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut jar = HashMap::new();
    for header in headers {
        for pair in header.split(';') {
            let Some((name, value)) = pair.split_once('=') else { continue };
            let name = name.trim();
            if name.is_empty() || jar.contains_key(name) {
                continue;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            let decoded = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_owned());
            jar.insert(name.to_owned(), decoded);
        }
    }
    jar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_decodes_and_keeps_first() {
        let jar = parse_cookies(["jwt=abc.def; theme=%22dark%22", "jwt=other; quoted=\"x y\""].into_iter());
        assert_eq!(jar.get("jwt").map(String::as_str), Some("abc.def"));
        assert_eq!(jar.get("theme").map(String::as_str), Some("\"dark\""));
        assert_eq!(jar.get("quoted").map(String::as_str), Some("x y"));
    }

    #[test]
    fn ignores_fragments_without_equals() {
        let jar = parse_cookies(["garbage; a=1"].into_iter());
        assert_eq!(jar.len(), 1);
    }
}
