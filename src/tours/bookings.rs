//! Checkout sessions and the booking they turn into.

use std::sync::Arc;

use chrono::Utc;
use http::StatusCode;
use serde_json::json;
use tracing::info;

use crate::context::Context;
use crate::failure::Failure;
use crate::response::Response;
use crate::stage::{BoxFuture, Flow, Stage};

use super::auth::require_user;
use super::model::{Booking, CheckoutRequest};
use super::services::{BookingStore, Services};

/// Records a booking when the checkout provider sends the browser back with
/// `?tour=…&user=…&price=…`, then redirects to the same path without the
/// query so a reload cannot book twice. Any other request passes through.
///
/// The booking is stored before the redirect is sent; later stages never
/// undo it.
pub struct CreateBookingCheckout {
    bookings: Arc<dyn BookingStore>,
}

impl CreateBookingCheckout {
    pub fn new(bookings: Arc<dyn BookingStore>) -> Self {
        Self { bookings }
    }
}

impl Stage for CreateBookingCheckout {
    fn call(&self, ctx: Context) -> BoxFuture {
        let bookings = Arc::clone(&self.bookings);
        Box::pin(async move {
            let (Some(tour), Some(user), Some(price)) =
                (ctx.query_value("tour"), ctx.query_value("user"), ctx.query_value("price"))
            else {
                return Flow::Continue(ctx);
            };
            let Ok(price) = price.parse::<f64>() else {
                return Flow::Fail(Failure::bad_request(format!("Invalid price: {price}")));
            };

            let booking = Booking {
                tour: tour.to_owned(),
                user: user.to_owned(),
                price,
                created_at: Utc::now(),
            };
            info!(tour = %booking.tour, user = %booking.user, price, "booking recorded");
            if let Err(e) = bookings.create(booking).await {
                return Flow::Fail(e);
            }
            Flow::Respond(Response::redirect(ctx.path()))
        })
    }

    fn name(&self) -> &'static str { "create_booking_checkout" }
}

/// `GET /api/v1/bookings/checkout-session/{tourId}`, behind `protect`.
pub async fn checkout_session(services: Services, ctx: Context) -> Result<Response, Failure> {
    let user = require_user(&ctx)?;
    let tour_id = ctx.param("tourId").unwrap_or_default();
    let tour = services
        .catalog
        .by_id(tour_id)
        .await?
        .ok_or_else(|| Failure::client(StatusCode::NOT_FOUND, "No tour found with that ID"))?;

    let base = services.public_url.trim_end_matches('/');
    let request = CheckoutRequest {
        success_url: format!(
            "{base}/?tour={}&user={}&price={}",
            urlencoding::encode(&tour.id),
            urlencoding::encode(&user.id),
            tour.price
        ),
        cancel_url: format!("{base}/tour/{}", tour.slug),
        customer_email: user.email.clone(),
        tour,
    };
    let session = services.checkout.create_session(request).await?;

    Ok(Response::json(&json!({ "status": "success", "session": session })))
}
