mod common;

use common::*;
use reqwest::{Method, Response};
use serde_json::{Value, json};

const PROFILE_AGENT: &str = r#"{"mbox":"mailto:learner@b.com"}"#;

async fn put_profile(app: &TestApp, body: &Value, headers: &[(&str, &str)]) -> Response {
    let mut request = app
        .request(Method::PUT, "/agents/profile", &app.admin_token)
        .query(&[("agent", PROFILE_AGENT), ("profileId", "settings")])
        .json(body);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    request.send().await.unwrap()
}

async fn get_profile(app: &TestApp) -> Response {
    app.request(Method::GET, "/agents/profile", &app.admin_token)
        .query(&[("agent", PROFILE_AGENT), ("profileId", "settings")])
        .send()
        .await
        .unwrap()
}

fn etag(response: &Response) -> String {
    response
        .headers()
        .get("ETag")
        .and_then(|v| v.to_str().ok())
        .expect("document responses carry an ETag")
        .to_string()
}

#[tokio::test]
async fn agent_profile_conditional_writes() {
    let app = spawn_app().await;
    let response = put_profile(&app, &json!({"theme": "dark"}), &[]).await;
    assert_status(response, 204).await;

    let response = get_profile(&app).await;
    let first_etag = etag(&response);
    assert_eq!(
        json_body(assert_status(response, 200).await).await,
        json!({"theme": "dark"})
    );

    let response = put_profile(&app, &json!({"font": "serif"}), &[]).await;
    assert_error(response, 409).await;

    let response = put_profile(&app, &json!({"font": "serif"}), &[("If-Match", "\"stale\"")]).await;
    assert_error(response, 412).await;

    let response = put_profile(&app, &json!({"font": "serif"}), &[("If-None-Match", "*")]).await;
    assert_error(response, 412).await;

    let response = put_profile(&app, &json!({"font": "serif"}), &[("If-Match", first_etag.as_str())]).await;
    assert_status(response, 204).await;

    let response = get_profile(&app).await;
    assert_ne!(etag(&response), first_etag);
    assert_eq!(
        json_body(assert_status(response, 200).await).await,
        json!({"theme": "dark", "font": "serif"})
    );
}

#[tokio::test]
async fn agent_profile_listing_and_delete() {
    let app = spawn_app().await;
    assert_status(put_profile(&app, &json!({"a": 1}), &[]).await, 204).await;

    let response = app
        .request(Method::GET, "/agents/profile", &app.admin_token)
        .query(&[("agent", PROFILE_AGENT)])
        .send()
        .await
        .unwrap();
    assert_eq!(json_body(assert_status(response, 200).await).await, json!(["settings"]));

    let current = etag(&get_profile(&app).await);
    let response = app
        .request(Method::DELETE, "/agents/profile", &app.admin_token)
        .query(&[("agent", PROFILE_AGENT), ("profileId", "settings")])
        .header("If-Match", current)
        .send()
        .await
        .unwrap();
    assert_status(response, 204).await;

    assert_error(get_profile(&app).await, 404).await;
}

#[tokio::test]
async fn activity_state_merges_json_and_replaces_text() {
    let app = spawn_app().await;
    let query = [
        ("activityId", ACTIVITY),
        ("agent", PROFILE_AGENT),
        ("stateId", "bookmark"),
    ];

    let response = app
        .request(Method::PUT, "/activities/state", &app.admin_token)
        .query(&query)
        .json(&json!({"page": 1, "chapter": 2}))
        .send()
        .await
        .unwrap();
    assert_status(response, 204).await;

    let response = app
        .request(Method::POST, "/activities/state", &app.admin_token)
        .query(&query)
        .json(&json!({"page": 7}))
        .send()
        .await
        .unwrap();
    assert_status(response, 204).await;

    let response = app
        .request(Method::GET, "/activities/state", &app.admin_token)
        .query(&query)
        .send()
        .await
        .unwrap();
    assert!(
        response.headers()["Content-Type"]
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );
    assert_eq!(
        json_body(assert_status(response, 200).await).await,
        json!({"page": 7, "chapter": 2})
    );

    let response = app
        .request(Method::PUT, "/activities/state", &app.admin_token)
        .query(&query)
        .body("plain text")
        .send()
        .await
        .unwrap();
    assert_status(response, 204).await;

    let response = app
        .request(Method::GET, "/activities/state", &app.admin_token)
        .query(&query)
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["Content-Type"], "text/plain");
    assert_eq!(assert_status(response, 200).await.text().await.unwrap(), "plain text");
}

#[tokio::test]
async fn activity_state_write_without_registration_keeps_it() {
    let app = spawn_app().await;
    let registration = "6A4B2B0E-7C1D-4E7B-9F5A-2D3C4B5A6978";
    let registered = [
        ("activityId", ACTIVITY),
        ("agent", PROFILE_AGENT),
        ("stateId", "s1"),
        ("registration", registration),
    ];

    let response = app
        .request(Method::PUT, "/activities/state", &app.admin_token)
        .query(&registered)
        .json(&json!({"a": 1}))
        .send()
        .await
        .unwrap();
    assert_status(response, 204).await;

    let response = app
        .request(Method::PUT, "/activities/state", &app.admin_token)
        .query(&registered[..3])
        .json(&json!({"b": 2}))
        .send()
        .await
        .unwrap();
    assert_status(response, 204).await;

    let response = app
        .request(Method::GET, "/activities/state", &app.admin_token)
        .query(&registered)
        .send()
        .await
        .unwrap();
    assert_eq!(
        json_body(assert_status(response, 200).await).await,
        json!({"a": 1, "b": 2})
    );
}

#[tokio::test]
async fn activity_state_listing_and_bulk_delete() {
    let app = spawn_app().await;
    for state_id in ["one", "two"] {
        let response = app
            .request(Method::PUT, "/activities/state", &app.admin_token)
            .query(&[
                ("activityId", ACTIVITY),
                ("agent", PROFILE_AGENT),
                ("stateId", state_id),
            ])
            .body("x")
            .send()
            .await
            .unwrap();
        assert_status(response, 204).await;
    }

    let key = [("activityId", ACTIVITY), ("agent", PROFILE_AGENT)];
    let response = app
        .request(Method::GET, "/activities/state", &app.admin_token)
        .query(&key)
        .send()
        .await
        .unwrap();
    let mut ids: Vec<String> =
        serde_json::from_value(json_body(assert_status(response, 200).await).await).unwrap();
    ids.sort();
    assert_eq!(ids, vec!["one", "two"]);

    let response = app
        .request(Method::DELETE, "/activities/state", &app.admin_token)
        .query(&key)
        .send()
        .await
        .unwrap();
    assert_status(response, 204).await;

    let response = app
        .request(Method::GET, "/activities/state", &app.admin_token)
        .query(&key)
        .send()
        .await
        .unwrap();
    assert_eq!(json_body(assert_status(response, 200).await).await, json!([]));
}

#[tokio::test]
async fn document_resources_need_an_identified_agent() {
    let app = spawn_app().await;
    let response = app
        .request(Method::GET, "/agents/profile", &app.admin_token)
        .query(&[("agent", r#"{"name":"nobody"}"#), ("profileId", "settings")])
        .send()
        .await
        .unwrap();
    assert_error(response, 400).await;

    let response = app
        .request(Method::GET, "/agents", &app.admin_token)
        .query(&[("agent", PROFILE_AGENT)])
        .send()
        .await
        .unwrap();
    let person = json_body(assert_status(response, 200).await).await;
    assert_eq!(person["objectType"], "Person");
    assert_eq!(person["mbox"], json!(["mailto:learner@b.com"]));
}

#[tokio::test]
async fn document_resources_check_permissions() {
    let app = spawn_app().await;
    let reader = app.create_token("reader", &["statements/read"]).await;
    let response = app
        .request(Method::GET, "/agents/profile", &reader)
        .query(&[("agent", PROFILE_AGENT)])
        .send()
        .await
        .unwrap();
    assert_error(response, 403).await;

    let response = app
        .request(Method::GET, "/activities/state", &reader)
        .query(&[("activityId", ACTIVITY), ("agent", PROFILE_AGENT)])
        .send()
        .await
        .unwrap();
    assert_error(response, 403).await;
}
