use std::collections::BTreeSet;

use crate::error::ValidationError;

use super::{FilterField, FilterValue};

/// Value type of a real column on the individuals table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Date,
}

/// Registry of filterable fields.
///
/// Column fields are fixed by the schema; json-extension fields must be
/// registered explicitly so that a typo in a filter expression fails
/// validation instead of matching nothing.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    json_fields: BTreeSet<String>,
}

const COLUMNS: &[(&str, ColumnType)] = &[
    ("first_name", ColumnType::Text),
    ("last_name", ColumnType::Text),
    ("dob", ColumnType::Date),
];

impl FieldRegistry {
    /// Registry exposing only the schema columns.
    pub fn new() -> Self {
        Self {
            json_fields: BTreeSet::new(),
        }
    }

    /// Registry with additional json-extension fields allowed in filters.
    pub fn with_json_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            json_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn register_json_field(&mut self, field: impl Into<String>) {
        self.json_fields.insert(field.into());
    }

    /// Resolve a field path to its target, rejecting unknown paths.
    pub fn resolve(&self, field: &str) -> Result<FilterField, ValidationError> {
        if let Some((name, _)) = COLUMNS.iter().find(|(name, _)| *name == field) {
            return Ok(FilterField::Column(name));
        }
        if self.json_fields.contains(field) {
            return Ok(FilterField::JsonExt(field.to_string()));
        }
        Err(ValidationError::UnknownField {
            field: field.to_string(),
        })
    }

    /// Check that a coerced value is usable against a resolved field.
    /// Json-extension fields accept any declared type; columns must match.
    pub fn check_value(
        &self,
        field: &FilterField,
        value: &FilterValue,
        expression: &str,
    ) -> Result<(), ValidationError> {
        let FilterField::Column(name) = field else {
            return Ok(());
        };
        let Some(column_type) = COLUMNS
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, t)| *t)
        else {
            return Ok(());
        };

        let compatible = matches!(
            (column_type, value),
            (ColumnType::Text, FilterValue::Str(_)) | (ColumnType::Date, FilterValue::Date(_))
        );
        if compatible {
            Ok(())
        } else {
            Err(ValidationError::MalformedFilter {
                expression: expression.to_string(),
                reason: format!("value type does not match column '{name}'"),
            })
        }
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_columns_and_registered_json() {
        let registry = FieldRegistry::with_json_fields(["number_of_children"]);
        assert_eq!(
            registry.resolve("first_name").unwrap(),
            FilterField::Column("first_name")
        );
        assert_eq!(
            registry.resolve("number_of_children").unwrap(),
            FilterField::JsonExt("number_of_children".to_string())
        );
        assert!(matches!(
            registry.resolve("able_bodied"),
            Err(ValidationError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_column_type_mismatch_rejected() {
        let registry = FieldRegistry::new();
        let field = registry.resolve("dob").unwrap();
        assert!(registry
            .check_value(&field, &FilterValue::Integer(3), "dob__gte__integer=3")
            .is_err());
        assert!(registry
            .check_value(
                &field,
                &FilterValue::Date(chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()),
                "dob__gte__date=2000-01-01"
            )
            .is_ok());
    }
}
