mod common;

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::StatusCode;
use axum::Extension;
use docman::config::{RateLimitSettings, ServerSettings};

#[tokio::test]
async fn requests_over_the_limit_get_the_error_body() {
    let env = common::TestEnv::start().await;
    let limits = RateLimitSettings {
        enabled: true,
        per_second: 60,
        burst: 2,
    };
    let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40_000)));
    let app = docman::app::router(env.state.clone(), &ServerSettings::default(), &limits)
        .layer(Extension(peer));
    let server = axum_test::TestServer::builder()
        .build(app);

    for _ in 0..2 {
        server.get("/api/health").await.assert_status(StatusCode::OK);
    }

    let limited = server.get("/api/health").await;
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body = limited.json::<serde_json::Value>();
    assert_eq!(body["type"], "RATE_LIMIT");
    assert_eq!(body["message"], "Too many requests, please try again later");
}
