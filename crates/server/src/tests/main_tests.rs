use super::*;
use axum::{
    body,
    body::Body,
    http::{header, HeaderValue, Request},
};
use serde_json::Value;
use tower::ServiceExt;

async fn test_app() -> Router {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let store = session_store(&storage).await.expect("session store");
    let api = ApiContext::new(storage, AuditTable::default(), 10).expect("context");
    build_router(
        Arc::new(AppState { api }),
        session_layer(store, "grid_session", 30),
    )
}

fn set_cookie(response: &axum::response::Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn post_ticket(title: &str, status: i64) -> Request<Body> {
    Request::post("/tickets")
        .header("content-type", "application/json")
        .header(ACTOR_HEADER, "maria")
        .body(Body::from(
            serde_json::json!({ "title": title, "status": status }).to_string(),
        ))
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let app = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn grid_state_follows_session_cookie() {
    let app = test_app().await;
    for (title, status) in [("a", 0), ("b", 2), ("c", 2)] {
        let response = app.clone().oneshot(post_ticket(title, status)).await.expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let request = Request::get("/tickets?Ticket%5Bstatus%5D=2&sort=title")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let issued = set_cookie(&response).expect("session cookie");
    assert!(issued.starts_with("grid_session="));
    assert!(issued.contains("Max-Age="), "session cookie carries an expiry");
    let cookie = issued.split(';').next().expect("pair").to_string();
    let page = json_body(response).await;
    assert_eq!(page["filters_changed"], Value::Bool(true));
    assert_eq!(page["total"], 2);

    // Same session, bare URL: the remembered filter and sort still apply.
    let request = Request::get("/tickets")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let page = json_body(response).await;
    assert_eq!(page["filters_changed"], Value::Bool(false));
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"][0]["title"], "b");

    // A new visitor starts from the defaults.
    let request = Request::get("/tickets").body(Body::empty()).expect("request");
    let page = json_body(app.oneshot(request).await.expect("response")).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"][0]["title"], "c");
}

#[tokio::test]
async fn ticket_routes_write_and_read_audit_trail() {
    let app = test_app().await;
    let response = app.clone().oneshot(post_ticket("Printer jam", 0)).await.expect("response");
    let ticket_id = json_body(response).await["ticket_id"]
        .as_i64()
        .expect("id");

    let request = Request::put(format!("/tickets/{ticket_id}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "status": 1 }).to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::delete(format!("/tickets/{ticket_id}"))
        .header(ACTOR_HEADER, "ops")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let request = Request::get(format!("/tickets/{ticket_id}/logs"))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let logs = json_body(response).await;
    let logs = logs.as_array().expect("array");
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["created_by"], "maria");
    assert!(logs[1]["log"].as_str().expect("log").contains("In progress"));
    assert_eq!(logs[1]["created_by"], "Console");
    assert_eq!(logs[2]["log"], "Record deleted.");
    assert_eq!(logs[2]["created_by"], "ops");

    let request = Request::put(format!("/tickets/{ticket_id}"))
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "not_found");
}

#[tokio::test]
async fn blank_title_is_a_bad_request() {
    let app = test_app().await;
    let response = app.oneshot(post_ticket(" ", 0)).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation");
}

#[test]
fn actor_defaults_to_system_without_username_header() {
    let mut headers = HeaderMap::new();
    assert_eq!(actor_from_headers(&headers), Actor::System);
    headers.insert(ACTOR_HEADER, HeaderValue::from_static(" alice "));
    assert_eq!(actor_from_headers(&headers), Actor::User("alice".into()));
}

#[tokio::test]
async fn unknown_session_cookie_starts_fresh_session() {
    let app = test_app().await;
    for (title, status) in [("a", 0), ("b", 2)] {
        app.clone().oneshot(post_ticket(title, status)).await.expect("response");
    }

    let request = Request::get("/tickets?Ticket%5Bstatus%5D=2")
        .header(header::COOKIE, "grid_session=forged-session-id")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let issued = set_cookie(&response).expect("session cookie");
    assert!(!issued.starts_with("grid_session=forged-session-id;"));
    let page = json_body(response).await;
    assert_eq!(page["filters_changed"], Value::Bool(true));
    assert_eq!(page["total"], 1);
}
