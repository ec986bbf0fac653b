//! Server-rendered pages.

use serde_json::{Value, json};

use http::StatusCode;

use crate::context::Context;
use crate::failure::Failure;
use crate::response::Response;

use super::auth::{current_user, require_user};
use super::model::{Tour, TourQuery};
use super::services::Services;

/// Renders `view`, exposing the logged-in user (if any) as `user`.
fn render(services: &Services, ctx: &Context, view: &str, mut locals: Value) -> Result<Response, Failure> {
    if let Some(user) = current_user(ctx) {
        locals["user"] = serde_json::to_value(user)?;
    }
    let html = services.views.render(view, &locals)?;
    Ok(Response::html(html))
}

pub async fn overview(services: Services, ctx: Context) -> Result<Response, Failure> {
    let tours = services.catalog.list(&TourQuery::default()).await?;
    render(&services, &ctx, "overview", json!({ "title": "All Tours", "tours": tours }))
}

pub async fn tour(services: Services, ctx: Context) -> Result<Response, Failure> {
    let slug = ctx.param("slug").unwrap_or_default();
    let tour = services
        .catalog
        .by_slug(slug)
        .await?
        .ok_or_else(|| Failure::client(StatusCode::NOT_FOUND, "There is no tour with that name."))?;
    let reviews = services.catalog.reviews(Some(&tour.id)).await?;
    let title = format!("{} Tour", tour.name);
    render(&services, &ctx, "tour", json!({ "title": title, "tour": tour, "reviews": reviews }))
}

pub async fn login_form(services: Services, ctx: Context) -> Result<Response, Failure> {
    render(&services, &ctx, "login", json!({ "title": "Log into your account" }))
}

pub async fn account(services: Services, ctx: Context) -> Result<Response, Failure> {
    require_user(&ctx)?;
    render(&services, &ctx, "account", json!({ "title": "Your account" }))
}

/// Every tour the current user has booked, on the overview page.
pub async fn my_tours(services: Services, ctx: Context) -> Result<Response, Failure> {
    let user = require_user(&ctx)?;
    let bookings = services.bookings.for_user(&user.id).await?;

    let mut tours = Vec::with_capacity(bookings.len());
    for booking in &bookings {
        if let Some(tour) = services.catalog.by_id(&booking.tour).await? {
            if !tours.iter().any(|t: &Tour| t.id == tour.id) {
                tours.push(tour);
            }
        }
    }
    render(&services, &ctx, "overview", json!({ "title": "My Tours", "tours": tours }))
}

/// Form post from the account page. Only name and email are accepted.
pub async fn update_user_data(services: Services, ctx: Context) -> Result<Response, Failure> {
    let user = require_user(&ctx)?;
    let (Some(name), Some(email)) = (ctx.body_str("name"), ctx.body_str("email")) else {
        return Err(Failure::bad_request("Please provide your name and email."));
    };
    let updated = services.accounts.update_profile(&user.id, name.trim(), email.trim()).await?;

    let mut locals = json!({ "title": "Your account" });
    locals["user"] = serde_json::to_value(&updated)?;
    let html = services.views.render("account", &locals)?;
    Ok(Response::html(html))
}
