//! End-to-end exchanges through `App::handle`: pipeline, routing, interceptor.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http::header::{
    ACCEPT_ENCODING, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, COOKIE, LOCATION,
    RETRY_AFTER, X_FRAME_OPTIONS,
};
use http::{HeaderMap, Method, StatusCode};
use serde_json::json;

use trailhead::middleware::RateLimiter;
use trailhead::tours::auth::Protect;
use trailhead::tours::build_app;
use trailhead::tours::memory::MemoryServices;
use trailhead::{
    App, AppConfig, Chain, Context, Environment, ErrorInterceptor, Pipeline, Response, Router,
    StaticFiles,
};

fn peer() -> SocketAddr {
    "203.0.113.7:40000".parse().unwrap()
}

fn get(uri: &str) -> Context {
    Context::get(uri).with_remote_addr(peer())
}

fn post_json(uri: &str, body: impl Into<bytes::Bytes>) -> Context {
    Context::new(Method::POST, uri.parse().unwrap(), HeaderMap::new())
        .with_header(CONTENT_TYPE, "application/json")
        .with_body(body)
        .with_remote_addr(peer())
}

fn tour_app(config: &AppConfig) -> (App, MemoryServices) {
    let mem = MemoryServices::seeded();
    let app = build_app(config, mem.services(config.public_url.clone()));
    (app, mem)
}

fn body_text(res: &Response) -> String {
    String::from_utf8_lossy(res.body()).into_owned()
}

// ── Pipeline behaviour ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn fifty_first_api_request_is_limited_until_the_window_passes() {
    let (app, _) = tour_app(&AppConfig::default());

    for i in 0..50 {
        let res = app.handle(get("/api/v1/tours")).await;
        assert_eq!(res.code(), StatusCode::OK, "request {}", i + 1);
    }

    let res = app.handle(get("/api/v1/tours")).await;
    assert_eq!(res.code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        res.body_json().unwrap()["message"],
        "Too many request from this IP, try again in an hour"
    );
    assert!(res.header(RETRY_AFTER).is_some());
    assert_eq!(res.header("x-ratelimit-remaining"), Some("0"));

    // View routes are outside the limited prefix.
    assert_eq!(app.handle(get("/login")).await.code(), StatusCode::OK);

    tokio::time::advance(Duration::from_secs(60 * 60)).await;
    assert_eq!(app.handle(get("/api/v1/tours")).await.code(), StatusCode::OK);
}

#[tokio::test]
async fn each_request_counts_once() {
    let (app, _) = tour_app(&AppConfig::default());
    let limiter = Arc::clone(app.pipeline().limiter().unwrap());

    app.handle(get("/api/v1/tours")).await;
    app.handle(get("/api/v1/tours")).await;
    assert_eq!(limiter.hits("203.0.113.7"), 2);
}

#[tokio::test]
async fn oversized_body_is_rejected_before_any_route_stage() {
    let reached = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reached);
    let route = move |_ctx: Context| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Response::text("created")
        }
    };

    let config = AppConfig::default();
    let pipeline = Pipeline::from_config(
        &config.pipeline,
        Environment::Production,
        Arc::new(RateLimiter::new(50, Duration::from_secs(3600))),
    );
    let app = App::new(
        pipeline,
        Router::new().post("/api/v1/things", Chain::of(route)),
        ErrorInterceptor::new(Environment::Production),
    );

    let big = format!("{{\"pad\":\"{}\"}}", "x".repeat(11 * 1024));
    let res = app.handle(post_json("/api/v1/things", big)).await;
    assert_eq!(res.code(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(res.body_json().unwrap(), json!({ "status": "fail", "message": "request entity too large" }));
    assert_eq!(reached.load(Ordering::SeqCst), 0);

    let res = app.handle(post_json("/api/v1/things", "{\"name\":\"ok\"}")).await;
    assert_eq!(res.code(), StatusCode::OK);
    assert_eq!(reached.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn whitelisted_keys_keep_every_value_others_keep_the_last() {
    async fn echo(ctx: Context) -> Response {
        Response::json(&json!({
            "price": ctx.query().get("price").map(|v| v.values()),
            "page": ctx.query_value("page"),
            "polluted": ctx.query_polluted(),
        }))
    }
    let app = App::new(
        Pipeline::from_config(
            &AppConfig::default().pipeline,
            Environment::Test,
            Arc::new(RateLimiter::new(50, Duration::from_secs(3600))),
        ),
        Router::new().get("/echo", Chain::of(echo)),
        ErrorInterceptor::new(Environment::Test),
    );

    let res = app.handle(get("/echo?price=10&price=20&page=1&page=2")).await;
    assert_eq!(
        res.body_json().unwrap(),
        json!({ "price": ["10", "20"], "page": "2", "polluted": { "page": ["1", "2"] } })
    );
}

#[tokio::test]
async fn operator_keys_are_stripped_from_bodies() {
    async fn echo(ctx: Context) -> Response {
        Response::json(ctx.body())
    }
    let app = App::new(
        Pipeline::from_config(
            &AppConfig::default().pipeline,
            Environment::Test,
            Arc::new(RateLimiter::new(50, Duration::from_secs(3600))),
        ),
        Router::new().post("/login", Chain::of(echo)),
        ErrorInterceptor::new(Environment::Test),
    );
    let res = app
        .handle(post_json("/login", r#"{"email":{"$gt":""},"name":"<b>x</b>"}"#))
        .await;
    assert_eq!(res.body_json().unwrap(), json!({ "email": {}, "name": "&lt;b>x&lt;/b>" }));
}

#[tokio::test]
async fn route_params_are_sanitised_after_matching() {
    async fn echo(ctx: Context) -> Response {
        Response::text(ctx.param("word").unwrap_or_default().to_owned())
    }
    let app = App::new(
        Pipeline::from_config(
            &AppConfig::default().pipeline,
            Environment::Test,
            Arc::new(RateLimiter::new(50, Duration::from_secs(3600))),
        ),
        Router::new().get("/echo/{word}", Chain::of(echo)),
        ErrorInterceptor::new(Environment::Test),
    );
    let res = app.handle(get("/echo/%3Cscript%3E")).await;
    assert_eq!(body_text(&res), "&lt;script>");
}

#[tokio::test]
async fn static_assets_skip_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("css")).unwrap();
    let css: Vec<u8> = b"body { color: #333; }\n".repeat(200);
    std::fs::write(dir.path().join("css/style.css"), &css).unwrap();

    let mut config = AppConfig::default();
    config.static_dir = Some(dir.path().to_path_buf());
    let (app, _) = tour_app(&config);
    let limiter = Arc::clone(app.pipeline().limiter().unwrap());

    let res = app
        .handle(get("/css/style.css").with_header(ACCEPT_ENCODING, "gzip"))
        .await;
    assert_eq!(res.code(), StatusCode::OK);
    assert_eq!(res.body(), css.as_slice());
    assert!(res.header(CONTENT_ENCODING).is_none());
    assert!(res.header(X_FRAME_OPTIONS).is_none());
    assert!(res.header("x-ratelimit-limit").is_none());
    assert_eq!(limiter.hits("203.0.113.7"), 0);

    // A path with no file behind it still goes through the pipeline.
    let res = app.handle(get("/css/missing.css")).await;
    assert_eq!(res.code(), StatusCode::NOT_FOUND);
    assert_eq!(res.header(X_FRAME_OPTIONS), Some("SAMEORIGIN"));
}

#[tokio::test]
async fn huge_page_numbers_give_an_empty_listing() {
    let (app, _) = tour_app(&AppConfig::default());
    let res = app
        .handle(get(&format!("/api/v1/tours?page={}&limit=2", usize::MAX)))
        .await;
    assert_eq!(res.code(), StatusCode::OK);
    assert_eq!(res.body_json().unwrap()["results"], 0);
}

#[tokio::test]
async fn unknown_api_path_is_a_json_404_naming_the_url() {
    let (app, _) = tour_app(&AppConfig::default());
    let res = app.handle(get("/api/v1/nonexistent")).await;
    assert_eq!(res.code(), StatusCode::NOT_FOUND);
    let body = res.body_json().unwrap();
    assert_eq!(body["status"], "fail");
    assert_eq!(body["message"], "Can't find /api/v1/nonexistent on this server!");
}

#[tokio::test]
async fn error_responses_carry_security_headers() {
    let (app, _) = tour_app(&AppConfig::default());
    let res = app.handle(get("/no/such/page")).await;
    assert_eq!(res.code(), StatusCode::NOT_FOUND);
    assert_eq!(res.header(X_FRAME_OPTIONS), Some("SAMEORIGIN"));
    assert!(res.header(CONTENT_TYPE).unwrap().starts_with("text/html"));
    assert!(body_text(&res).contains("Something went wrong!"));
}

#[tokio::test]
async fn large_responses_are_gzipped_when_accepted() {
    let mut config = AppConfig::default();
    config.pipeline.compression.threshold = 64;
    let (app, _) = tour_app(&config);

    let res = app
        .handle(get("/api/v1/tours").with_header(ACCEPT_ENCODING, "gzip, deflate"))
        .await;
    assert_eq!(res.header(CONTENT_ENCODING), Some("gzip"));

    let mut plain = String::new();
    flate2::read::GzDecoder::new(res.body()).read_to_string(&mut plain).unwrap();
    let body: serde_json::Value = serde_json::from_str(&plain).unwrap();
    assert_eq!(body["results"], 3);

    let res = app.handle(get("/api/v1/tours")).await;
    assert!(res.header(CONTENT_ENCODING).is_none());
}

#[tokio::test]
async fn production_masks_faults() {
    async fn boom(_ctx: Context) -> Response {
        panic!("database handle poisoned")
    }
    let router = Router::new().get("/api/v1/boom", Chain::of(boom)).get("/boom", Chain::of(boom));
    let app = App::new(Pipeline::empty(), router, ErrorInterceptor::new(Environment::Production));

    let res = app.handle(get("/api/v1/boom")).await;
    assert_eq!(res.code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body_json().unwrap(), json!({ "status": "error", "message": "Something went very wrong!" }));

    let res = app.handle(get("/boom")).await;
    assert!(body_text(&res).contains("Something went very wrong!"));
    assert!(!body_text(&res).contains("poisoned"));
}

// ── Tour routes ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn auth_failure_stops_the_chain_but_earlier_effects_stay() {
    let mem = MemoryServices::seeded();
    let effects = Arc::new(AtomicUsize::new(0));
    let rendered = Arc::new(AtomicUsize::new(0));

    let (e, r) = (Arc::clone(&effects), Arc::clone(&rendered));
    let record = move |ctx: Context| {
        let e = Arc::clone(&e);
        async move {
            e.fetch_add(1, Ordering::SeqCst);
            ctx
        }
    };
    let render = move |_ctx: Context| {
        let r = Arc::clone(&r);
        async move {
            r.fetch_add(1, Ordering::SeqCst);
            Response::html("<h1>secret</h1>")
        }
    };

    let chain = Chain::new().then(record).then(Protect::new(mem.accounts.clone())).then(render);
    let app = App::new(
        Pipeline::empty(),
        Router::new().get("/secret", chain),
        ErrorInterceptor::new(Environment::Development),
    );

    let res = app.handle(get("/secret")).await;
    assert_eq!(res.code(), StatusCode::UNAUTHORIZED);
    assert!(body_text(&res).contains("You are not logged in!"));
    assert_eq!(effects.load(Ordering::SeqCst), 1);
    assert_eq!(rendered.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn checkout_return_books_then_redirects() {
    let (app, mem) = tour_app(&AppConfig::default());
    let res = app.handle(get("/?tour=t1&user=u1&price=397")).await;
    assert_eq!(res.code(), StatusCode::FOUND);
    assert_eq!(res.header(LOCATION), Some("/"));
    assert_eq!(mem.bookings.all().len(), 1);

    let res = app.handle(get("/my-tours").with_header(COOKIE, "jwt=demo-token")).await;
    assert_eq!(res.code(), StatusCode::OK);
    let html = body_text(&res);
    assert!(html.contains("My Tours"));
    assert!(html.contains("The Forest Hiker"));
    assert!(!html.contains("The Sea Explorer"));
}

#[tokio::test]
async fn overview_shows_the_logged_in_user() {
    let (app, _) = tour_app(&AppConfig::default());
    let anonymous = body_text(&app.handle(get("/")).await);
    assert!(anonymous.contains("All Tours"));
    assert!(!anonymous.contains("Laura Wilson"));

    let known = body_text(&app.handle(get("/").with_header(COOKIE, "jwt=demo-token")).await);
    assert!(known.contains("Laura Wilson"));
}

#[tokio::test]
async fn unknown_tour_slug_renders_the_error_page() {
    let (app, _) = tour_app(&AppConfig::default());
    let res = app.handle(get("/tour/the-moon-walker")).await;
    assert_eq!(res.code(), StatusCode::NOT_FOUND);
    assert!(body_text(&res).contains("There is no tour with that name."));

    let res = app.handle(get("/tour/the-sea-explorer")).await;
    assert_eq!(res.code(), StatusCode::OK);
    assert!(body_text(&res).contains("data-locations"));
}

#[tokio::test]
async fn api_resources() {
    let (app, _) = tour_app(&AppConfig::default());

    let res = app.handle(get("/api/v1/tours?difficulty=easy")).await;
    let body = res.body_json().unwrap();
    assert_eq!(body["results"], 1);
    assert_eq!(body["data"]["data"][0]["slug"], "the-forest-hiker");

    let res = app.handle(get("/api/v1/tours/t404")).await;
    assert_eq!(res.code(), StatusCode::NOT_FOUND);
    assert_eq!(res.body_json().unwrap()["message"], "No tour found with that ID");

    let res = app.handle(get("/api/v1/reviews?tour=t1")).await;
    assert_eq!(res.body_json().unwrap()["results"], 1);

    let res = app.handle(get("/api/v1/users/me")).await;
    assert_eq!(res.code(), StatusCode::UNAUTHORIZED);

    let res = app
        .handle(get("/api/v1/users/me").with_header(AUTHORIZATION, "Bearer demo-token"))
        .await;
    assert_eq!(res.body_json().unwrap()["data"]["data"]["email"], "laura@example.com");
}

#[tokio::test]
async fn checkout_session_points_back_at_the_booking_hook() {
    let (app, _) = tour_app(&AppConfig::default());
    let res = app
        .handle(
            get("/api/v1/bookings/checkout-session/t2")
                .with_header(AUTHORIZATION, "Bearer demo-token"),
        )
        .await;
    assert_eq!(res.code(), StatusCode::OK);
    let body = res.body_json().unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["session"]["url"], "http://localhost:3000/?tour=t2&user=u1&price=497");
}

#[tokio::test]
async fn profile_update_from_form_post() {
    let (app, mem) = tour_app(&AppConfig::default());
    let ctx = Context::new(Method::POST, "/submit-user-data".parse().unwrap(), HeaderMap::new())
        .with_header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .with_header(COOKIE, "jwt=demo-token")
        .with_body("name=Laura+Smith&email=laura%40example.org")
        .with_remote_addr(peer());
    let res = app.handle(ctx).await;
    assert_eq!(res.code(), StatusCode::OK);
    assert!(body_text(&res).contains("laura@example.org"));
    assert_eq!(mem.accounts.user("u1").unwrap().name, "Laura Smith");
}
