//! In-process collaborators.
//!
//! Good enough for tests and for running the binary without a database or a
//! payment account. Nothing here persists.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::failure::Failure;
use crate::interceptor::escape_html;
use crate::view::ViewRenderer;

use super::model::{
    Booking, CheckoutRequest, CheckoutSession, Location, Review, Tour, TourQuery, User,
};
use super::services::{Accounts, BookingStore, CheckoutProvider, Services, TourCatalog};

// ── Accounts ──────────────────────────────────────────────────────────────────

struct Session {
    user_id: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryAccounts {
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        self.users.write().insert(user.id.clone(), user);
    }

    /// Issue `token` for `user_id`, optionally expiring.
    pub fn add_session(&self, token: &str, user_id: &str, expires_at: Option<DateTime<Utc>>) {
        self.sessions.write().insert(
            token.to_owned(),
            Session { user_id: user_id.to_owned(), expires_at },
        );
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.users.read().get(id).cloned()
    }
}

#[async_trait]
impl Accounts for MemoryAccounts {
    async fn resolve(&self, token: &str) -> Result<User, Failure> {
        let user_id = {
            let sessions = self.sessions.read();
            let session = sessions.get(token).ok_or_else(Failure::invalid_token)?;
            if session.expires_at.is_some_and(|at| at <= Utc::now()) {
                return Err(Failure::token_expired());
            }
            session.user_id.clone()
        };
        self.user(&user_id).ok_or_else(|| {
            Failure::unauthorized("The user belonging to this token does no longer exist.")
        })
    }

    async fn update_profile(&self, user_id: &str, name: &str, email: &str) -> Result<User, Failure> {
        let mut users = self.users.write();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| Failure::fault(format!("user {user_id} vanished mid-request")))?;
        user.name = name.to_owned();
        user.email = email.to_owned();
        Ok(user.clone())
    }
}

// ── Catalog ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryCatalog {
    tours: RwLock<Vec<Tour>>,
    reviews: RwLock<Vec<Review>>,
}

impl MemoryCatalog {
    pub fn new(tours: Vec<Tour>, reviews: Vec<Review>) -> Self {
        Self { tours: RwLock::new(tours), reviews: RwLock::new(reviews) }
    }
}

#[async_trait]
impl TourCatalog for MemoryCatalog {
    async fn list(&self, query: &TourQuery) -> Result<Vec<Tour>, Failure> {
        Ok(query.apply(self.tours.read().iter().cloned()))
    }

    async fn by_slug(&self, slug: &str) -> Result<Option<Tour>, Failure> {
        Ok(self.tours.read().iter().find(|t| t.slug == slug).cloned())
    }

    async fn by_id(&self, id: &str) -> Result<Option<Tour>, Failure> {
        Ok(self.tours.read().iter().find(|t| t.id == id).cloned())
    }

    async fn reviews(&self, tour_id: Option<&str>) -> Result<Vec<Review>, Failure> {
        Ok(self
            .reviews
            .read()
            .iter()
            .filter(|r| tour_id.is_none_or(|id| r.tour == id))
            .cloned()
            .collect())
    }
}

// ── Bookings ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryBookings {
    bookings: RwLock<Vec<Booking>>,
}

impl MemoryBookings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Booking> {
        self.bookings.read().clone()
    }
}

#[async_trait]
impl BookingStore for MemoryBookings {
    async fn create(&self, booking: Booking) -> Result<(), Failure> {
        self.bookings.write().push(booking);
        Ok(())
    }

    async fn for_user(&self, user_id: &str) -> Result<Vec<Booking>, Failure> {
        Ok(self.bookings.read().iter().filter(|b| b.user == user_id).cloned().collect())
    }
}

// ── Checkout ──────────────────────────────────────────────────────────────────

/// Hands out sequential fake session ids pointing at the success URL.
#[derive(Default)]
pub struct MemoryCheckout {
    next: AtomicU64,
}

#[async_trait]
impl CheckoutProvider for MemoryCheckout {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession, Failure> {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(CheckoutSession { id: format!("cs_test_{n:08}"), url: request.success_url })
    }
}

// ── Views ─────────────────────────────────────────────────────────────────────

/// Renders bare-bones HTML straight from the locals. No templates.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainRenderer;

impl ViewRenderer for PlainRenderer {
    fn render(&self, view: &str, locals: &Value) -> Result<String, Failure> {
        let title = locals["title"].as_str().unwrap_or("Trailhead");
        let mut body = format!("<h1>{}</h1>", escape_html(title));

        if let Some(user) = locals["user"].as_object() {
            let name = user.get("name").and_then(Value::as_str).unwrap_or("");
            body.push_str(&format!("<nav class=\"user\">{}</nav>", escape_html(name)));
        }

        match view {
            "overview" => {
                body.push_str("<ul class=\"tours\">");
                for t in locals["tours"].as_array().into_iter().flatten() {
                    let name = t["name"].as_str().unwrap_or("");
                    let slug = t["slug"].as_str().unwrap_or("");
                    body.push_str(&format!(
                        "<li><a href=\"/tour/{}\">{}</a></li>",
                        escape_html(slug),
                        escape_html(name)
                    ));
                }
                body.push_str("</ul>");
            }
            "tour" => {
                let tour = &locals["tour"];
                body.push_str(&format!(
                    "<p class=\"summary\">{}</p><div id=\"map\" data-locations=\"{}\"></div>",
                    escape_html(tour["summary"].as_str().unwrap_or("")),
                    escape_html(&tour["locations"].to_string())
                ));
                if let Some(id) = tour["id"].as_str() {
                    body.push_str(&format!(
                        "<button id=\"book-tour\" data-tour-id=\"{}\">Book tour now!</button>",
                        escape_html(id)
                    ));
                }
            }
            "login" => body.push_str("<form class=\"form--login\"></form>"),
            "account" => {
                let email = locals["user"]["email"].as_str().unwrap_or("");
                body.push_str(&format!("<p class=\"email\">{}</p>", escape_html(email)));
            }
            "error" => {
                let msg = locals["msg"].as_str().unwrap_or("");
                body.push_str(&format!("<p class=\"error\">{}</p>", escape_html(msg)));
            }
            other => return Err(Failure::fault(format!("unknown view `{other}`"))),
        }

        Ok(format!(
            "<!DOCTYPE html><html><head><title>Trailhead | {}</title></head><body>{body}</body></html>",
            escape_html(title)
        ))
    }
}

// ── Seed data ─────────────────────────────────────────────────────────────────

/// Everything in memory, seeded with three tours, a user `u1` with session
/// token `demo-token`, and a review.
pub struct MemoryServices {
    pub accounts: Arc<MemoryAccounts>,
    pub catalog: Arc<MemoryCatalog>,
    pub bookings: Arc<MemoryBookings>,
    pub checkout: Arc<MemoryCheckout>,
}

impl MemoryServices {
    pub fn seeded() -> Self {
        let accounts = Arc::new(MemoryAccounts::new());
        accounts.add_user(User {
            id: "u1".into(),
            name: "Laura Wilson".into(),
            email: "laura@example.com".into(),
            role: "user".into(),
        });
        accounts.add_session("demo-token", "u1", None);

        let reviews = vec![Review {
            id: "r1".into(),
            tour: "t1".into(),
            user: "u1".into(),
            rating: 5.0,
            review: "Breathtaking.".into(),
        }];

        Self {
            accounts,
            catalog: Arc::new(MemoryCatalog::new(sample_tours(), reviews)),
            bookings: Arc::new(MemoryBookings::new()),
            checkout: Arc::new(MemoryCheckout::default()),
        }
    }

    pub fn services(&self, public_url: impl Into<String>) -> Services {
        Services {
            accounts: self.accounts.clone(),
            catalog: self.catalog.clone(),
            bookings: self.bookings.clone(),
            checkout: self.checkout.clone(),
            views: Arc::new(PlainRenderer),
            public_url: public_url.into(),
        }
    }
}

pub fn sample_tours() -> Vec<Tour> {
    let stop = |lng: f64, lat: f64, day: u32, description: &str| Location {
        coordinates: [lng, lat],
        day,
        description: description.to_owned(),
    };
    vec![
        Tour {
            id: "t1".into(),
            name: "The Forest Hiker".into(),
            slug: "the-forest-hiker".into(),
            duration: 5,
            max_group_size: 25,
            difficulty: "easy".into(),
            ratings_average: 4.7,
            ratings_quantity: 37,
            price: 397.0,
            summary: "Breathtaking hike through the Canadian Banff National Park".into(),
            locations: vec![
                stop(-116.214531, 51.417611, 1, "Banff National Park"),
                stop(-118.076152, 52.875223, 3, "Jasper National Park"),
            ],
        },
        Tour {
            id: "t2".into(),
            name: "The Sea Explorer".into(),
            slug: "the-sea-explorer".into(),
            duration: 7,
            max_group_size: 15,
            difficulty: "medium".into(),
            ratings_average: 4.8,
            ratings_quantity: 23,
            price: 497.0,
            summary: "Exploring the jaw-dropping US east coast by foot and by boat".into(),
            locations: vec![stop(-80.128473, 25.781842, 1, "Lummus Park Beach")],
        },
        Tour {
            id: "t3".into(),
            name: "The Snow Adventurer".into(),
            slug: "the-snow-adventurer".into(),
            duration: 4,
            max_group_size: 10,
            difficulty: "difficult".into(),
            ratings_average: 4.5,
            ratings_quantity: 13,
            price: 997.0,
            summary: "Exciting adventure in the snow with snowboarding and skiing".into(),
            locations: vec![stop(-106.822318, 39.190872, 1, "Aspen Highlands")],
        },
    ]
}
