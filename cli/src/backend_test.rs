use std::collections::BTreeMap;

use axum::Router;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, response::IntoResponse};
use serde_json::{Value, json};

use super::*;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn ticket_json(id: &str, status: &str, in_call: bool) -> Value {
    json!({
        "id": id,
        "number": 12,
        "queue_id": "q1",
        "location_id": "l1",
        "status": status,
        "in_call": in_call,
        "created_at": "2024-05-01T09:30:00Z",
    })
}

async fn list_tickets(headers: HeaderMap, Query(query): Query<BTreeMap<String, String>>) -> impl IntoResponse {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or_default();
    if auth != "Bearer tok" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})));
    }
    let expected = [("location_id", "l1"), ("per_page", "200"), ("status", "pending,called")];
    let ok = expected
        .iter()
        .all(|(k, v)| query.get(*k).map(String::as_str) == Some(*v));
    if !ok {
        return (StatusCode::BAD_REQUEST, Json(json!({"query": query})));
    }
    (
        StatusCode::OK,
        Json(json!({ "data": [ticket_json("t1", "pending", false)], "total": 1, "page": 1, "per_page": 200 })),
    )
}

async fn update_ticket(Path(id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    let status = body["status"].as_str().unwrap_or("pending").to_owned();
    let in_call = body["in_call"].as_bool().unwrap_or(false);
    let mut ticket = ticket_json(&id, &status, in_call);
    ticket["desk_id"] = body["desk_id"].clone();
    Json(ticket)
}

fn stub() -> Router {
    Router::new()
        .route("/tickets", get(list_tickets))
        .route("/tickets/{id}", patch(update_ticket))
        .route("/locations", get(|| async { Json(json!([{"id": "l1", "name": "Centro"}])) }))
        .route("/desks/{id}", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/auth/login",
            post(|Json(body): Json<Value>| async move {
                if body["password"] == "secret" {
                    (
                        StatusCode::OK,
                        Json(json!({"token": "tok", "user": {"id": "u1", "name": "Ana", "email": body["email"]}})),
                    )
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({})))
                }
            }),
        )
}

#[test]
fn join_url_avoids_double_slash() {
    assert_eq!(join_url("http://b/", "/tickets"), "http://b/tickets");
    assert_eq!(join_url("http://b/api", "/desks/d1"), "http://b/api/desks/d1");
}

#[tokio::test]
async fn list_tickets_sends_bearer_and_active_filter() {
    let base = serve(stub()).await;
    let backend = RestBackend::new(&base, Some("tok"), Duration::from_secs(5)).unwrap();

    let page = backend.list_tickets(&TicketQuery::active("l1")).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].id, "t1");
}

#[tokio::test]
async fn missing_token_maps_to_unauthorized() {
    let base = serve(stub()).await;
    let backend = RestBackend::new(&base, None, Duration::from_secs(5)).unwrap();

    let err = backend.list_tickets(&TicketQuery::active("l1")).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
}

#[tokio::test]
async fn update_ticket_returns_backend_copy() {
    let base = serve(stub()).await;
    let backend = RestBackend::new(&base, Some("tok"), Duration::from_secs(5)).unwrap();

    let patch = TicketPatch {
        status: ticketing::TicketStatus::Called,
        desk_id: Some("d1".to_owned()),
        in_call: true,
    };
    let ticket = backend.update_ticket("t1", &patch).await.unwrap();
    assert_eq!(ticket.status, ticketing::TicketStatus::Called);
    assert_eq!(ticket.desk_id.as_deref(), Some("d1"));
    assert!(ticket.in_call);
}

#[tokio::test]
async fn bare_array_lists_decode_and_404_maps_to_not_found() {
    let base = serve(stub()).await;
    let backend = RestBackend::new(&base, Some("tok"), Duration::from_secs(5)).unwrap();

    let locations = backend.list_locations().await.unwrap();
    assert_eq!(locations.data.len(), 1);
    assert_eq!(locations.data[0].name, "Centro");

    assert_eq!(backend.get_desk("gone").await.unwrap_err(), ApiError::NotFound);
}

#[tokio::test]
async fn login_distinguishes_bad_credentials() {
    let base = serve(stub()).await;
    let backend = RestBackend::new(&base, None, Duration::from_secs(5)).unwrap();

    let session = backend.login("ana@example.com", "secret").await.unwrap();
    assert_eq!(session.token, "tok");
    assert_eq!(session.user.name, "Ana");

    assert_eq!(
        backend.login("ana@example.com", "wrong").await.unwrap_err(),
        ApiError::Unauthorized
    );
}
