//! JSON resources under `/api/v1`.
//!
//! Successful bodies follow one envelope:
//! `{"status": "success", "results": n?, "data": {"data": …}}`.

use http::StatusCode;
use serde::Serialize;
use serde_json::json;

use crate::context::Context;
use crate::failure::Failure;
use crate::response::Response;

use super::auth::require_user;
use super::model::TourQuery;
use super::services::Services;

fn one<T: Serialize>(doc: &T) -> Result<Response, Failure> {
    Ok(Response::json(&json!({ "status": "success", "data": { "data": doc } })))
}

fn many<T: Serialize>(docs: &[T]) -> Result<Response, Failure> {
    Ok(Response::json(&json!({
        "status": "success",
        "results": docs.len(),
        "data": { "data": docs },
    })))
}

pub async fn list_tours(services: Services, ctx: Context) -> Result<Response, Failure> {
    let query = TourQuery::from_query(ctx.query());
    let tours = services.catalog.list(&query).await?;
    many(&tours)
}

pub async fn get_tour(services: Services, ctx: Context) -> Result<Response, Failure> {
    let id = ctx.param("id").unwrap_or_default();
    match services.catalog.by_id(id).await? {
        Some(tour) => one(&tour),
        None => Err(Failure::client(StatusCode::NOT_FOUND, "No tour found with that ID")),
    }
}

pub async fn me(_services: Services, ctx: Context) -> Result<Response, Failure> {
    one(require_user(&ctx)?)
}

pub async fn list_reviews(services: Services, ctx: Context) -> Result<Response, Failure> {
    let reviews = services.catalog.reviews(ctx.query_value("tour")).await?;
    many(&reviews)
}
