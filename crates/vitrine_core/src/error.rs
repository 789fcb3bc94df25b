use thiserror::Error;

#[derive(Debug, Error)]
pub enum VitrineError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("unique value violation: attribute `{attribute}` value `{value}` already used by entity {primary_key}")]
    UniqueValueViolation {
        attribute: String,
        value: String,
        primary_key: i64,
    },
    #[error("could not obtain exclusive access to collection `{entity_type}`")]
    ConcurrentWrite { entity_type: String },
    #[error("invalid state: {message}")]
    InvalidState { message: String },
    #[error("no such hierarchy item: {code}")]
    NoSuchHierarchyItem { code: String },
}

impl VitrineError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn unique_violation(
        attribute: impl Into<String>,
        value: impl Into<String>,
        primary_key: i64,
    ) -> Self {
        Self::UniqueValueViolation {
            attribute: attribute.into(),
            value: value.into(),
            primary_key,
        }
    }

    pub fn concurrent_write(entity_type: impl Into<String>) -> Self {
        Self::ConcurrentWrite {
            entity_type: entity_type.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn no_such_item(code: impl Into<String>) -> Self {
        Self::NoSuchHierarchyItem { code: code.into() }
    }
}

pub type VitrineResult<T> = Result<T, VitrineError>;

impl From<sea_orm::DbErr> for VitrineError {
    fn from(value: sea_orm::DbErr) -> Self {
        VitrineError::storage(value.to_string())
    }
}

impl From<serde_json::Error> for VitrineError {
    fn from(value: serde_json::Error) -> Self {
        VitrineError::storage(format!("codec: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::VitrineError;

    #[test]
    fn helper_constructors_set_variants() {
        let err = VitrineError::storage("disk");
        assert!(matches!(err, VitrineError::Storage { .. }));
        let err = VitrineError::not_found("missing");
        assert!(matches!(err, VitrineError::NotFound { .. }));
        let err = VitrineError::invalid("bad");
        assert!(matches!(err, VitrineError::Validation { .. }));
        let err = VitrineError::conflict("dup");
        assert!(matches!(err, VitrineError::Conflict { .. }));
        let err = VitrineError::concurrent_write("PRODUCT");
        assert!(matches!(err, VitrineError::ConcurrentWrite { .. }));
        let err = VitrineError::invalid_state("bulk");
        assert!(matches!(err, VitrineError::InvalidState { .. }));
        let err = VitrineError::no_such_item("7");
        assert!(matches!(err, VitrineError::NoSuchHierarchyItem { .. }));
    }

    #[test]
    fn unique_violation_names_attribute_value_and_owner() {
        let err = VitrineError::unique_violation("code", "A", 1);
        let message = err.to_string();
        assert!(message.contains("`code`"));
        assert!(message.contains("`A`"));
        assert!(message.contains("entity 1"));
    }
}
