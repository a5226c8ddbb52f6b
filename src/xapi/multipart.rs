//! `multipart/mixed` bodies carrying statements plus attachment payloads.

use axum::body::Bytes;
use std::collections::HashMap;

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct Part {
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Part {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Media type without parameters, lowercased.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| offset + from)
}

fn skip_line_break(body: &[u8], at: usize) -> usize {
    if body[at..].starts_with(b"\r\n") {
        at + 2
    } else if body[at..].starts_with(b"\n") {
        at + 1
    } else {
        at
    }
}

fn parse_headers(raw: &[u8]) -> Result<HashMap<String, String>, AppError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| AppError::BadRequest("Multipart headers must be UTF-8".to_string()))?;
    let mut headers = HashMap::new();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| AppError::BadRequest(format!("Malformed multipart header: {line}")))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(headers)
}

fn parse_part(raw: &[u8]) -> Result<Part, AppError> {
    let (head, body) = if raw.starts_with(b"\r\n") {
        (&raw[..0], &raw[2..])
    } else if let Some(split) = find(raw, b"\r\n\r\n", 0) {
        (&raw[..split], &raw[split + 4..])
    } else if let Some(split) = find(raw, b"\n\n", 0) {
        (&raw[..split], &raw[split + 2..])
    } else {
        return Err(AppError::BadRequest(
            "Multipart part is missing its header block".to_string(),
        ));
    };
    Ok(Part {
        headers: parse_headers(head)?,
        body: Bytes::copy_from_slice(body),
    })
}

pub fn parse(body: &[u8], boundary: &str) -> Result<Vec<Part>, AppError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let malformed = || AppError::BadRequest("Malformed multipart body".to_string());

    let mut cursor = find(body, delimiter, 0).ok_or_else(malformed)? + delimiter.len();
    let mut parts = Vec::new();
    loop {
        if body[cursor..].starts_with(b"--") {
            break;
        }
        let start = skip_line_break(body, cursor);
        let next = find(body, delimiter, start).ok_or_else(malformed)?;

        let mut end = next;
        if body[..end].ends_with(b"\r\n") {
            end -= 2;
        } else if body[..end].ends_with(b"\n") {
            end -= 1;
        }
        parts.push(parse_part(&body[start..end.max(start)])?);
        cursor = next + delimiter.len();
    }
    Ok(parts)
}
