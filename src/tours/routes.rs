//! Route table. Registration order is match order.

use std::future::Future;

use crate::context::Context;
use crate::failure::Failure;
use crate::response::Response;
use crate::router::Router;
use crate::stage::{BoxFuture, Chain, IntoFlow, Stage};

use super::auth::{IsLoggedIn, Protect};
use super::bookings::{self, CreateBookingCheckout};
use super::services::Services;
use super::{api, views};

type Handler = Box<dyn Fn(Services, Context) -> BoxFuture + Send + Sync>;

/// A route handler bound to the shared services, logged under its own name.
struct Endpoint {
    name: &'static str,
    services: Services,
    handler: Handler,
}

impl Stage for Endpoint {
    fn call(&self, ctx: Context) -> BoxFuture {
        (self.handler)(self.services.clone(), ctx)
    }

    fn name(&self) -> &'static str { self.name }
}

fn endpoint<F, Fut>(services: &Services, name: &'static str, f: F) -> Endpoint
where
    F: Fn(Services, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Failure>> + Send + 'static,
{
    Endpoint {
        name,
        services: services.clone(),
        handler: Box::new(move |services: Services, ctx: Context| -> BoxFuture {
            let fut = f(services, ctx);
            Box::pin(async move { fut.await.into_flow() })
        }),
    }
}

pub fn router(services: &Services) -> Router {
    let logged_in = || IsLoggedIn::new(services.accounts.clone());
    let protect = || Protect::new(services.accounts.clone());

    let pages = Router::new()
        .get(
            "/",
            Chain::new()
                .then(CreateBookingCheckout::new(services.bookings.clone()))
                .then(logged_in())
                .then(endpoint(services, "overview", views::overview)),
        )
        .get("/tour/{slug}", Chain::new().then(logged_in()).then(endpoint(services, "tour", views::tour)))
        .get("/login", Chain::new().then(logged_in()).then(endpoint(services, "login_form", views::login_form)))
        .get("/me", Chain::new().then(protect()).then(endpoint(services, "account", views::account)))
        .get("/my-tours", Chain::new().then(protect()).then(endpoint(services, "my_tours", views::my_tours)))
        .post(
            "/submit-user-data",
            Chain::new().then(protect()).then(endpoint(services, "update_user_data", views::update_user_data)),
        );

    let tours = Router::new()
        .get("/", Chain::of(endpoint(services, "list_tours", api::list_tours)))
        .get("/{id}", Chain::of(endpoint(services, "get_tour", api::get_tour)));

    let users = Router::new().get("/me", Chain::new().then(protect()).then(endpoint(services, "me", api::me)));

    let reviews = Router::new().get("/", Chain::of(endpoint(services, "list_reviews", api::list_reviews)));

    let bookings = Router::new().get(
        "/checkout-session/{tourId}",
        Chain::new().then(protect()).then(endpoint(services, "checkout_session", bookings::checkout_session)),
    );

    // Anything left over falls through to the router's not-found failure.
    Router::new()
        .nest("/", pages)
        .nest("/api/v1/tours", tours)
        .nest("/api/v1/users", users)
        .nest("/api/v1/reviews", reviews)
        .nest("/api/v1/bookings", bookings)
}
