use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Echo};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

// --- echo ---

#[tokio::test]
async fn echo_get_reports_path_and_query() {
    let resp = app()
        .oneshot(empty_request("GET", "/echo?q=a+b&page=2"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "GET");
    assert_eq!(echo.path, "/echo");
    assert_eq!(echo.query.as_deref(), Some("q=a+b&page=2"));
    assert!(echo.body.is_empty());
}

#[tokio::test]
async fn echo_post_returns_body_and_headers() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/echo")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header("X-HTTP-Method-Override", "PUT")
                .body("title=Buy+milk".to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.body, "title=Buy+milk");
    assert_eq!(
        echo.headers.get("content-type").map(String::as_str),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(
        echo.headers.get("x-http-method-override").map(String::as_str),
        Some("PUT")
    );
    assert!(echo.query.is_none());
}

#[tokio::test]
async fn echo_joins_repeated_headers() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/echo")
                .header("X-Tag", "one")
                .header("X-Tag", "two")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.headers.get("x-tag").map(String::as_str), Some("one, two"));
}

#[tokio::test]
async fn echo_accepts_every_method() {
    for method in ["PUT", "PATCH", "DELETE"] {
        let resp = app().oneshot(empty_request(method, "/echo")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{method}");
        let echo: Echo = body_json(resp).await;
        assert_eq!(echo.method, method);
    }
}

// --- status ---

#[tokio::test]
async fn status_returns_requested_code() {
    let resp = app()
        .oneshot(empty_request("GET", "/status/404"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(resp).await, "status 404");
}

#[tokio::test]
async fn status_out_of_range_returns_400() {
    let resp = app()
        .oneshot(empty_request("GET", "/status/1000"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_non_numeric_returns_400() {
    let resp = app()
        .oneshot(empty_request("GET", "/status/teapot"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- redirect ---

#[tokio::test]
async fn redirect_defaults_to_echo() {
    let resp = app()
        .oneshot(empty_request("GET", "/redirect"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[http::header::LOCATION], "/echo");
}

#[tokio::test]
async fn redirect_honours_target() {
    let resp = app()
        .oneshot(empty_request("GET", "/redirect?to=/status/201"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[http::header::LOCATION], "/status/201");
}

// --- delay ---

#[tokio::test]
async fn delay_responds_after_sleeping() {
    let started = std::time::Instant::now();
    let resp = app()
        .oneshot(empty_request("GET", "/delay/50"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(started.elapsed() >= std::time::Duration::from_millis(50));
    assert_eq!(body_bytes(resp).await, "done");
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let resp = app()
        .oneshot(empty_request("GET", "/nope"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
