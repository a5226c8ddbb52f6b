use uuid::Uuid;

use crate::errors::AppError;

/// Lowercase hyphenated form of any accepted UUID spelling.
pub fn normalize_uuid(raw: &str) -> Result<String, AppError> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| AppError::BadRequest(format!("Invalid UUID: {raw}")))
}

pub fn generate() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_braces() {
        assert_eq!(
            normalize_uuid("{A1B2C3D4-E5F6-4711-8899-AABBCCDDEEFF}").unwrap(),
            "a1b2c3d4-e5f6-4711-8899-aabbccddeeff"
        );
        assert!(matches!(normalize_uuid("not-a-uuid"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn generated_ids_are_version_four() {
        let id = Uuid::parse_str(&generate()).unwrap();
        assert_eq!(id.get_version_num(), 4);
    }
}
