//! HTTP surface tests using `oneshot`, plus the remote product lookup.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{tent_json, TestApp};
use trailmart_api::services::HttpProductLookup;
use trailmart_core::{Decimal, Error, ProductLookup};

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, JsonValue) {
    let response = app.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &JsonValue) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_product_crud_over_http() {
    let app = TestApp::new().await;

    let (status, created) = send(
        &app,
        json_request("POST", "/products", &tent_json(app.category_id, 100)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Tent");
    assert_eq!(created["primaryImageUrl"], "https://img.example.com/tent.jpg");
    assert_eq!(
        created["aiStatus"],
        json!(["GeneratingTags"])
    );
    let id = created["id"].as_i64().unwrap();

    let (status, fetched) = send(&app, get(&format!("/products/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id);

    let (status, _) = send(
        &app,
        json_request("PUT", &format!("/products/{id}"), &tent_json(app.category_id, 120)),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, lookup) = send(&app, get(&format!("/products/{id}/lookup"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lookup["name"], "Tent");

    let (status, listed) = send(&app, get("/products/search?q=Ten")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/products/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get(&format!("/products/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_missing_product_routes_return_404() {
    let app = TestApp::new().await;
    let (status, _) = send(&app, get("/products/77")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        json_request("PUT", "/products/77", &tent_json(app.category_id, 10)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/products/77/lookup")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_product_is_bad_request() {
    let app = TestApp::new().await;
    let mut body = tent_json(app.category_id, 100);
    body["variants"] = json!([]);
    let (status, error) = send(&app, json_request("POST", "/products", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("variant"));
}

#[tokio::test]
async fn test_basket_routes() {
    let app = TestApp::new().await;
    let (_, created) = send(
        &app,
        json_request("POST", "/products", &tent_json(app.category_id, 100)),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let cart = json!({"userId": "alice", "items": [{"productId": id, "quantity": 3}]});
    let (status, saved) = send(&app, json_request("POST", "/basket", &cart)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(saved["items"][0]["productName"], "Tent");
    assert_eq!(saved["totalPrice"].as_f64(), Some(300.0));

    let (status, fetched) = send(&app, get("/basket/alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["userId"], "alice");

    let ghost = json!({"userId": "alice", "items": [{"productId": 9999, "quantity": 1}]});
    let (status, _) = send(&app, json_request("POST", "/basket", &ghost)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/basket/alice")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get("/basket/alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_semantic_search_and_support() {
    let mut app = TestApp::new().await;
    app.state.catalog.create(app.tent_request(100)).await.unwrap();
    app.deliver_pending().await;

    let (status, results) = send(&app, get("/products/semantic-search?q=tent&threshold=0.99")).await;
    assert_eq!(status, StatusCode::OK);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["name"], "Tent");
    assert!(results[0]["score"].is_number());

    let (status, answer) = send(
        &app,
        json_request("POST", "/products/support", &json!({"question": "Which tent?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer["answer"], "A roomy three-season tent for two.");

    let (status, _) = send(&app, get("/products/semantic-search?q=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_http_lookup_maps_404_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products/5/lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5,
            "name": "Stove",
            "description": "Canister stove",
            "brand": "Flare",
            "displayPrice": 39.5,
            "primaryImageUrl": null,
            "variants": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products/6/lookup"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products/7/lookup"))
        .respond_with(ResponseTemplate::new(503).set_body_string("catalog down"))
        .mount(&server)
        .await;

    let lookup = HttpProductLookup::new(format!("{}/", server.uri())).unwrap();

    let found = lookup.get_product(5).await.unwrap().unwrap();
    assert_eq!(found.name, "Stove");
    assert_eq!(found.display_price, Decimal::new(395, 1));

    assert!(lookup.get_product(6).await.unwrap().is_none());

    let err = lookup.get_product(7).await.unwrap_err();
    assert!(matches!(err, Error::Upstream(_)));
    assert!(err.to_string().contains("catalog down"));
}
