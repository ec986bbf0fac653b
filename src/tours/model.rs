//! Tour-booking domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{Query, QueryValue};

/// One stop on a tour's itinerary. `coordinates` is `[lng, lat]`, which is
/// what the map widget on the tour page expects.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Location {
    pub coordinates: [f64; 2],
    pub day: u32,
    pub description: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub duration: u32,
    pub max_group_size: u32,
    pub difficulty: String,
    pub ratings_average: f64,
    pub ratings_quantity: u32,
    pub price: f64,
    pub summary: String,
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl Tour {
    /// A field's value as text, for the whitelisted filter keys only.
    fn field(&self, key: &str) -> Option<String> {
        Some(match key {
            "duration" => self.duration.to_string(),
            "maxGroupSize" => self.max_group_size.to_string(),
            "difficulty" => self.difficulty.clone(),
            "ratingsAverage" => self.ratings_average.to_string(),
            "ratingsQuantity" => self.ratings_quantity.to_string(),
            "price" => self.price.to_string(),
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_owned()
}

/// The authenticated user, attached to the context by the auth stages.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Review {
    pub id: String,
    pub tour: String,
    pub user: String,
    pub rating: f64,
    pub review: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub tour: String,
    pub user: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

/// What the payment provider hands back: an id the browser redirects with.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Input to a checkout session.
#[derive(Clone, Debug)]
pub struct CheckoutRequest {
    pub tour: Tour,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

// ── Listing queries ───────────────────────────────────────────────────────────

/// Filter keys; everything else in the query string is ignored by the filter.
pub const FILTER_KEYS: [&str; 6] = [
    "duration",
    "ratingsQuantity",
    "ratingsAverage",
    "maxGroupSize",
    "difficulty",
    "price",
];

/// A tour listing request, derived from a normalised query string.
///
/// Each filter key may carry several values, meaning "any of". `sort` takes
/// a field name, `-` for descending; `page`/`limit` paginate.
#[derive(Clone, Debug, PartialEq)]
pub struct TourQuery {
    pub filters: Vec<(String, Vec<String>)>,
    pub sort: Option<(String, bool)>,
    pub page: usize,
    pub limit: usize,
}

impl Default for TourQuery {
    fn default() -> Self {
        Self { filters: Vec::new(), sort: None, page: 1, limit: Self::DEFAULT_LIMIT }
    }
}

impl TourQuery {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn from_query(query: &Query) -> Self {
        let filters = FILTER_KEYS
            .iter()
            .filter_map(|k| {
                query.get(*k).map(|v| {
                    let values = match v {
                        QueryValue::One(s) => s.split(',').map(str::to_owned).collect(),
                        QueryValue::Many(vs) => vs.clone(),
                    };
                    ((*k).to_owned(), values)
                })
            })
            .collect();

        let sort = query.get("sort").map(|v| {
            let raw = v.last();
            match raw.strip_prefix('-') {
                Some(field) => (field.to_owned(), true),
                None => (raw.to_owned(), false),
            }
        });

        let number = |key: &str| {
            query
                .get(key)
                .and_then(|v| v.last().parse::<usize>().ok())
                .filter(|n| *n > 0)
        };

        Self {
            filters,
            sort,
            page: number("page").unwrap_or(1),
            limit: number("limit").unwrap_or(Self::DEFAULT_LIMIT),
        }
    }

    pub fn matches(&self, tour: &Tour) -> bool {
        self.filters.iter().all(|(key, wanted)| {
            let Some(actual) = tour.field(key) else { return true };
            wanted.iter().any(|w| values_equal(&actual, w))
        })
    }

    /// Filters, sorts and paginates `tours`.
    pub fn apply(&self, tours: impl IntoIterator<Item = Tour>) -> Vec<Tour> {
        let mut out: Vec<Tour> = tours.into_iter().filter(|t| self.matches(t)).collect();
        if let Some((field, descending)) = &self.sort {
            out.sort_by(|a, b| {
                let ord = compare_field(a, b, field);
                if *descending { ord.reverse() } else { ord }
            });
        }
        let Some(skip) = self.page.saturating_sub(1).checked_mul(self.limit) else {
            return Vec::new();
        };
        out.into_iter().skip(skip).take(self.limit).collect()
    }
}

fn values_equal(actual: &str, wanted: &str) -> bool {
    match (actual.parse::<f64>(), wanted.trim().parse::<f64>()) {
        (Ok(a), Ok(w)) => (a - w).abs() < f64::EPSILON,
        _ => actual.eq_ignore_ascii_case(wanted.trim()),
    }
}

fn compare_field(a: &Tour, b: &Tour, field: &str) -> std::cmp::Ordering {
    match field {
        "name" => a.name.cmp(&b.name),
        "duration" => a.duration.cmp(&b.duration),
        "maxGroupSize" => a.max_group_size.cmp(&b.max_group_size),
        "ratingsQuantity" => a.ratings_quantity.cmp(&b.ratings_quantity),
        "ratingsAverage" => a.ratings_average.total_cmp(&b.ratings_average),
        "price" => a.price.total_cmp(&b.price),
        _ => std::cmp::Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn tour(name: &str, price: f64, difficulty: &str) -> Tour {
        Tour {
            id: name.to_lowercase(),
            name: name.to_owned(),
            slug: name.to_lowercase(),
            duration: 5,
            max_group_size: 10,
            difficulty: difficulty.to_owned(),
            ratings_average: 4.5,
            ratings_quantity: 10,
            price,
            summary: String::new(),
            locations: Vec::new(),
        }
    }

    #[test]
    fn many_values_mean_any_of() {
        let ctx = Context::get("/?price=397&price=497");
        let q = TourQuery::from_query(ctx.query());
        let got = q.apply([tour("A", 397.0, "easy"), tour("B", 497.0, "easy"), tour("C", 997.0, "easy")]);
        assert_eq!(got.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), ["A", "B"]);
    }

    #[test]
    fn sort_and_paginate() {
        let ctx = Context::get("/?sort=-price&limit=1&page=2");
        let q = TourQuery::from_query(ctx.query());
        let got = q.apply([tour("A", 1.0, "easy"), tour("B", 3.0, "easy"), tour("C", 2.0, "easy")]);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "C");
    }

    #[test]
    fn default_returns_everything() {
        let got = TourQuery::default().apply([tour("A", 1.0, "easy"), tour("B", 2.0, "easy")]);
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn page_past_the_addressable_range_is_empty() {
        let ctx = Context::get(&format!("/?page={}&limit=2", usize::MAX));
        let q = TourQuery::from_query(ctx.query());
        assert_eq!(q.page, usize::MAX);
        assert!(q.apply([tour("A", 1.0, "easy"), tour("B", 2.0, "easy")]).is_empty());
    }

    #[test]
    fn comma_lists_and_text_fields() {
        let ctx = Context::get("/?difficulty=easy,medium");
        let q = TourQuery::from_query(ctx.query());
        let got = q.apply([tour("A", 1.0, "easy"), tour("B", 1.0, "difficult"), tour("C", 1.0, "Medium")]);
        assert_eq!(got.len(), 2);
    }
}
