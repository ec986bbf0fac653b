//! Session stages.
//!
//! [`IsLoggedIn`] never blocks a request: it only decorates the context when
//! the `jwt` cookie resolves. [`Protect`] requires a resolvable token and
//! fails otherwise.

use std::sync::Arc;

use http::header::AUTHORIZATION;
use tracing::debug;

use crate::context::Context;
use crate::failure::Failure;
use crate::stage::{BoxFuture, Flow, Stage};

use super::model::{CurrentUser, User};
use super::services::Accounts;

const SESSION_COOKIE: &str = "jwt";

/// Cookie value set on logout; never a real token.
const LOGGED_OUT: &str = "loggedout";

/// The user attached by [`IsLoggedIn`] or [`Protect`], if any.
pub fn current_user(ctx: &Context) -> Option<&User> {
    ctx.extensions().get::<CurrentUser>().map(|u| &u.0)
}

/// Like [`current_user`], for stages that only run behind [`Protect`].
pub fn require_user(ctx: &Context) -> Result<&User, Failure> {
    current_user(ctx).ok_or_else(|| Failure::fault("protected stage ran without a current user"))
}

fn cookie_token(ctx: &Context) -> Option<String> {
    ctx.cookie(SESSION_COOKIE)
        .filter(|t| !t.is_empty() && *t != LOGGED_OUT)
        .map(str::to_owned)
}

fn bearer_token(ctx: &Context) -> Option<String> {
    let value = ctx.header(AUTHORIZATION)?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_owned())
}

/// Attaches the user behind a valid `jwt` cookie. Anonymous otherwise.
pub struct IsLoggedIn {
    accounts: Arc<dyn Accounts>,
}

impl IsLoggedIn {
    pub fn new(accounts: Arc<dyn Accounts>) -> Self {
        Self { accounts }
    }
}

impl Stage for IsLoggedIn {
    fn call(&self, mut ctx: Context) -> BoxFuture {
        let accounts = Arc::clone(&self.accounts);
        Box::pin(async move {
            let Some(token) = cookie_token(&ctx) else {
                return Flow::Continue(ctx);
            };
            match accounts.resolve(&token).await {
                Ok(user) => {
                    ctx.extensions_mut().insert(CurrentUser(user));
                }
                Err(e) => debug!("session cookie ignored: {}", e.message()),
            }
            Flow::Continue(ctx)
        })
    }

    fn name(&self) -> &'static str { "is_logged_in" }
}

/// Requires a session. The token comes from `Authorization: Bearer …`, or
/// from the `jwt` cookie when there is no such header.
pub struct Protect {
    accounts: Arc<dyn Accounts>,
}

impl Protect {
    pub fn new(accounts: Arc<dyn Accounts>) -> Self {
        Self { accounts }
    }
}

impl Stage for Protect {
    fn call(&self, mut ctx: Context) -> BoxFuture {
        let accounts = Arc::clone(&self.accounts);
        Box::pin(async move {
            let Some(token) = bearer_token(&ctx).or_else(|| cookie_token(&ctx)) else {
                return Flow::Fail(Failure::unauthorized(
                    "You are not logged in! Please log in to get access.",
                ));
            };
            match accounts.resolve(&token).await {
                Ok(user) => {
                    ctx.extensions_mut().insert(CurrentUser(user));
                    Flow::Continue(ctx)
                }
                Err(e) => Flow::Fail(e),
            }
        })
    }

    fn name(&self) -> &'static str { "protect" }
}
