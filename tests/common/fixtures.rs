use serde_json::{Value, json};

pub const VERB_TESTED: &str = "http://x/verbs/tested";
pub const VERB_VOIDED: &str = "http://adlnet.gov/expapi/verbs/voided";
pub const ACTIVITY: &str = "http://x/act/1";

pub fn agent(email: &str) -> Value {
    json!({ "objectType": "Agent", "mbox": format!("mailto:{email}") })
}

pub fn statement(email: &str, verb: &str, activity: &str) -> Value {
    json!({
        "actor": agent(email),
        "verb": { "id": verb, "display": { "en-US": "tested" } },
        "object": { "objectType": "Activity", "id": activity }
    })
}

pub fn statement_with_id(id: &str, email: &str) -> Value {
    let mut statement = statement(email, VERB_TESTED, ACTIVITY);
    statement["id"] = Value::from(id);
    statement
}

pub fn statement_ref(email: &str, verb: &str, target: &str) -> Value {
    json!({
        "actor": agent(email),
        "verb": { "id": verb },
        "object": { "objectType": "StatementRef", "id": target }
    })
}

pub fn voiding(email: &str, target: &str) -> Value {
    statement_ref(email, VERB_VOIDED, target)
}

/// `multipart/mixed` body: the statement part followed by one attachment.
pub fn multipart_body(boundary: &str, statement: &Value, content_type: &str, hash: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: application/json\r\n\r\n").as_bytes());
    body.extend_from_slice(statement.to_string().as_bytes());
    body.extend_from_slice(
        format!(
            "\r\n--{boundary}\r\nContent-Type: {content_type}\r\nContent-Transfer-Encoding: binary\r\nX-Experience-API-Hash: {hash}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
