//! Collaborators the tour routes depend on.
//!
//! The routes only talk to these traits. Storage, token verification and the
//! payment provider live behind them; [`super::memory`] has in-process
//! versions for tests and the demo binary.

use std::sync::Arc;

use async_trait::async_trait;

use crate::failure::Failure;
use crate::view::ViewRenderer;

use super::model::{Booking, CheckoutRequest, CheckoutSession, Review, Tour, TourQuery, User};

#[async_trait]
pub trait Accounts: Send + Sync + 'static {
    /// Resolve a session token to its user. Unknown or expired tokens fail
    /// with an auth failure.
    async fn resolve(&self, token: &str) -> Result<User, Failure>;

    async fn update_profile(&self, user_id: &str, name: &str, email: &str) -> Result<User, Failure>;
}

#[async_trait]
pub trait TourCatalog: Send + Sync + 'static {
    async fn list(&self, query: &TourQuery) -> Result<Vec<Tour>, Failure>;
    async fn by_slug(&self, slug: &str) -> Result<Option<Tour>, Failure>;
    async fn by_id(&self, id: &str) -> Result<Option<Tour>, Failure>;
    async fn reviews(&self, tour_id: Option<&str>) -> Result<Vec<Review>, Failure>;
}

#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    async fn create(&self, booking: Booking) -> Result<(), Failure>;
    async fn for_user(&self, user_id: &str) -> Result<Vec<Booking>, Failure>;
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync + 'static {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, Failure>;
}

/// Everything the tour routes need, shared by all requests.
#[derive(Clone)]
pub struct Services {
    pub accounts: Arc<dyn Accounts>,
    pub catalog: Arc<dyn TourCatalog>,
    pub bookings: Arc<dyn BookingStore>,
    pub checkout: Arc<dyn CheckoutProvider>,
    pub views: Arc<dyn ViewRenderer>,
    /// Scheme and host used in checkout redirect URLs.
    pub public_url: String,
}
