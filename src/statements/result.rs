use serde_json::{Value, json};

use crate::{
    storage::{models::StoredStatement, traits::SortOrder},
    xapi::statement::{Format, render},
};

/// Statements selected by a query or written by an ingest call.
#[derive(Debug, Clone)]
pub struct StatementResult {
    pub statements: Vec<StoredStatement>,
    pub total_count: u64,
    /// Matches from the current page onwards, before `limit`.
    pub remaining_count: u64,
    pub has_more: bool,
    pub single: bool,
    pub format: Format,
    pub sort: SortOrder,
}

impl StatementResult {
    pub fn written(statements: Vec<StoredStatement>) -> Self {
        let count = statements.len() as u64;
        Self {
            statements,
            total_count: count,
            remaining_count: count,
            has_more: false,
            single: false,
            format: Format::Exact,
            sort: SortOrder::Descending,
        }
    }

    pub fn single(statement: StoredStatement, format: Format) -> Self {
        Self {
            statements: vec![statement],
            total_count: 1,
            remaining_count: 1,
            has_more: false,
            single: true,
            format,
            sort: SortOrder::Descending,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.statements
            .iter()
            .filter_map(|stored| stored.statement.get("id")?.as_str())
            .map(str::to_string)
            .collect()
    }

    pub fn rendered(&self) -> Vec<Value> {
        self.statements
            .iter()
            .map(|stored| render(&stored.statement, self.format))
            .collect()
    }

    /// Relative URL of the next page, empty when there is none. The request's
    /// own parameters are repeated with the id bound moved past this page.
    pub fn more_url(&self, path: &str, params: &[(String, String)]) -> String {
        let last_id = match (self.has_more, self.statements.last().and_then(|s| s.id)) {
            (true, Some(id)) => id,
            _ => return String::new(),
        };
        let bound = match self.sort {
            SortOrder::Descending => "until_id",
            SortOrder::Ascending => "since_id",
        };

        let mut query: Vec<String> = params
            .iter()
            .filter(|(key, _)| key != "since_id" && key != "until_id")
            .map(|(key, value)| {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            })
            .collect();
        query.push(format!("{bound}={last_id}"));
        format!("{}?{}", path, query.join("&"))
    }

    /// Body of a statement GET: the bare statement for id lookups, otherwise
    /// `{statements, more}`.
    pub fn body(&self, path: &str, params: &[(String, String)]) -> Value {
        if self.single {
            return self.rendered().into_iter().next().unwrap_or(Value::Null);
        }
        json!({
            "statements": self.rendered(),
            "more": self.more_url(path, params),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: i64) -> StoredStatement {
        StoredStatement {
            id: Some(id),
            statement: json!({"id": format!("s{id}"), "context": {"extensions": {"a[dot]b": 1}}}),
            references: Vec::new(),
            voided: false,
            stored_at: 0,
            user_id: None,
        }
    }

    fn page(sort: SortOrder, has_more: bool) -> StatementResult {
        StatementResult {
            statements: vec![stored(9), stored(8)],
            total_count: 5,
            remaining_count: 5,
            has_more,
            single: false,
            format: Format::Exact,
            sort,
        }
    }

    #[test]
    fn more_moves_the_id_bound() {
        let params = vec![
            ("limit".to_string(), "2".to_string()),
            ("until_id".to_string(), "10".to_string()),
            ("agent".to_string(), "{\"mbox\":\"mailto:a@b.com\"}".to_string()),
        ];
        let more = page(SortOrder::Descending, true).more_url("/statements", &params);
        assert_eq!(
            more,
            "/statements?limit=2&agent=%7B%22mbox%22%3A%22mailto%3Aa%40b.com%22%7D&until_id=8"
        );
        let ascending = page(SortOrder::Ascending, true).more_url("/statements", &params[..1]);
        assert_eq!(ascending, "/statements?limit=2&since_id=8");
    }

    #[test]
    fn last_page_has_empty_more() {
        assert_eq!(page(SortOrder::Descending, false).more_url("/statements", &[]), "");
    }

    #[test]
    fn body_unescapes_extensions() {
        let body = page(SortOrder::Descending, false).body("/statements", &[]);
        assert_eq!(body["statements"][0]["context"]["extensions"]["a.b"], 1);
        assert_eq!(body["more"], "");

        let single = StatementResult::single(stored(3), Format::Exact).body("/statements", &[]);
        assert_eq!(single["id"], "s3");
    }
}
