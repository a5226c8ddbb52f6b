use reqwest::Response;
use serde_json::Value;

/// Asserts the status, printing the body on mismatch.
pub async fn assert_status(response: Response, expected: u16) -> Response {
    let status = response.status().as_u16();
    if status == expected {
        return response;
    }
    let body = response.text().await.unwrap_or_default();
    panic!("Expected status {expected}, got {status}: {body}");
}

pub async fn json_body(response: Response) -> Value {
    response
        .json()
        .await
        .expect("Response body should be JSON")
}

/// Every response carries the xAPI version and consistency headers.
pub fn assert_xapi_headers(response: &Response) {
    let headers = response.headers();
    assert_eq!(
        headers
            .get("X-Experience-API-Version")
            .and_then(|v| v.to_str().ok()),
        Some("1.0.3")
    );
    assert!(
        headers.contains_key("X-Experience-API-Consistent-Through"),
        "missing X-Experience-API-Consistent-Through"
    );
}

/// Ids of a `{statements, more}` result, in response order.
pub fn statement_ids(result: &Value) -> Vec<String> {
    result["statements"]
        .as_array()
        .expect("result should carry a statements array")
        .iter()
        .map(|statement| {
            statement["id"]
                .as_str()
                .expect("statement should have an id")
                .to_string()
        })
        .collect()
}

pub fn more_link(result: &Value) -> &str {
    result["more"].as_str().expect("result should carry more")
}

/// Error bodies are `{code, message, data}`.
pub async fn assert_error(response: Response, expected: u16) -> Value {
    let body = json_body(assert_status(response, expected).await).await;
    assert_eq!(body["code"], expected);
    assert!(body["message"].is_string());
    assert!(body["data"].is_object());
    body
}
