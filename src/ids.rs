use uuid::Uuid;

use crate::errors::AppError;

/// Normalize an identifier that may arrive as a hyphenated UUID, a simple
/// 32-hex form, or an already-parsed `Uuid` rendered to string. All engine
/// entry points pass identifiers through here once; internal comparisons use
/// the returned `Uuid`.
pub fn ensure_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("invalid identifier: '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hyphenated_form() {
        let id = ensure_id("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(id.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn accepts_simple_form() {
        let id = ensure_id("67e5504410b1426f9247bb680e5fe0c8").unwrap();
        assert_eq!(id.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn trims_whitespace() {
        assert!(ensure_id("  67e55044-10b1-426f-9247-bb680e5fe0c8 ").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(ensure_id("not-an-id").is_err());
        assert!(ensure_id("").is_err());
    }
}
