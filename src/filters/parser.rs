//! nom-based parser for `field__lookup__type=value` filter expressions

use chrono::NaiveDate;
use nom::{
    bytes::complete::take_while1,
    character::complete::char,
    combinator::rest,
    sequence::separated_pair,
    Finish, IResult,
};

use crate::error::ValidationError;

use super::{CustomFilter, FieldRegistry, FilterSet, FilterValue, Lookup};

/// Parse an ordered list of filter expressions against the registry.
/// The first invalid expression aborts the whole parse.
pub fn parse_custom_filters(
    expressions: &[String],
    registry: &FieldRegistry,
) -> Result<FilterSet, ValidationError> {
    let mut filters = Vec::with_capacity(expressions.len());
    for expression in expressions {
        filters.push(parse_expression(expression, registry)?);
    }
    Ok(FilterSet { filters })
}

fn parse_expression(
    expression: &str,
    registry: &FieldRegistry,
) -> Result<CustomFilter, ValidationError> {
    let (_, (lhs, raw_value)) = expression_parts(expression.trim())
        .finish()
        .map_err(|e: nom::error::Error<&str>| ValidationError::MalformedFilter {
            expression: expression.to_string(),
            reason: format!("expected field__lookup__type=value, got parse failure at '{}'", e.input),
        })?;

    let segments: Vec<&str> = lhs.split("__").collect();
    if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(ValidationError::MalformedFilter {
            expression: expression.to_string(),
            reason: "left-hand side must be field__lookup__type".to_string(),
        });
    }

    let type_tag = segments[segments.len() - 1];
    let lookup_tag = segments[segments.len() - 2];
    let field_path = segments[..segments.len() - 2].join("__");

    let lookup = parse_lookup(lookup_tag, expression)?;
    let value = coerce_value(raw_value, type_tag, expression)?;
    let field = registry.resolve(&field_path)?;
    registry.check_value(&field, &value, expression)?;

    Ok(CustomFilter {
        field,
        lookup,
        value,
    })
}

/// `lhs=value` where lhs is a run of identifier characters and value is the
/// remainder (values may contain '=' themselves, e.g. base64 payloads).
fn expression_parts(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        char('='),
        rest,
    )(input)
}

fn parse_lookup(tag: &str, expression: &str) -> Result<Lookup, ValidationError> {
    match tag {
        "exact" => Ok(Lookup::Exact),
        "lt" => Ok(Lookup::Lt),
        "lte" => Ok(Lookup::Lte),
        "gt" => Ok(Lookup::Gt),
        "gte" => Ok(Lookup::Gte),
        "contains" => Ok(Lookup::Contains),
        "icontains" => Ok(Lookup::Icontains),
        other => Err(ValidationError::UnknownLookup {
            lookup: other.to_string(),
            expression: expression.to_string(),
        }),
    }
}

fn coerce_value(
    raw: &str,
    type_tag: &str,
    expression: &str,
) -> Result<FilterValue, ValidationError> {
    match type_tag {
        "integer" => raw
            .parse::<i64>()
            .map(FilterValue::Integer)
            .map_err(|_| ValidationError::Coercion {
                value: raw.to_string(),
                type_tag: "integer".to_string(),
            }),
        "boolean" => match raw {
            "True" | "true" => Ok(FilterValue::Boolean(true)),
            "False" | "false" => Ok(FilterValue::Boolean(false)),
            _ => Err(ValidationError::Coercion {
                value: raw.to_string(),
                type_tag: "boolean".to_string(),
            }),
        },
        "string" => Ok(FilterValue::Str(raw.to_string())),
        "date" => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(FilterValue::Date)
            .map_err(|_| ValidationError::Coercion {
                value: raw.to_string(),
                type_tag: "date".to_string(),
            }),
        other => Err(ValidationError::UnknownType {
            type_tag: other.to_string(),
            expression: expression.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterField;
    use proptest::prelude::*;

    fn registry() -> FieldRegistry {
        FieldRegistry::with_json_fields(["number_of_children", "able_bodied"])
    }

    #[test]
    fn test_parses_integer_gte() {
        let set = parse_custom_filters(
            &["number_of_children__gte__integer=1".to_string()],
            &registry(),
        )
        .unwrap();
        assert_eq!(
            set.filters,
            vec![CustomFilter {
                field: FilterField::JsonExt("number_of_children".to_string()),
                lookup: Lookup::Gte,
                value: FilterValue::Integer(1),
            }]
        );
    }

    #[test]
    fn test_parses_python_style_boolean() {
        let set = parse_custom_filters(
            &["able_bodied__exact__boolean=True".to_string()],
            &registry(),
        )
        .unwrap();
        assert_eq!(set.filters[0].value, FilterValue::Boolean(true));
    }

    #[test]
    fn test_field_path_with_internal_underscores() {
        // Only the trailing two segments are lookup and type.
        let set = parse_custom_filters(
            &["number_of_children__lt__integer=10".to_string()],
            &registry(),
        )
        .unwrap();
        assert_eq!(
            set.filters[0].field,
            FilterField::JsonExt("number_of_children".to_string())
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_custom_filters(
            &["no_such_field__exact__string=x".to_string()],
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownField { .. }));
    }

    #[test]
    fn test_unknown_lookup_and_type_rejected() {
        assert!(matches!(
            parse_custom_filters(
                &["able_bodied__within__boolean=True".to_string()],
                &registry()
            ),
            Err(ValidationError::UnknownLookup { .. })
        ));
        assert!(matches!(
            parse_custom_filters(
                &["able_bodied__exact__decimal=1.5".to_string()],
                &registry()
            ),
            Err(ValidationError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_malformed_expressions_rejected() {
        for bad in [
            "",
            "number_of_children",
            "number_of_children__gte__integer",
            "=5",
            "__gte__integer=5",
        ] {
            assert!(
                parse_custom_filters(&[bad.to_string()], &registry()).is_err(),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn test_date_column_filter() {
        let set =
            parse_custom_filters(&["dob__lte__date=2010-06-30".to_string()], &registry()).unwrap();
        assert_eq!(set.filters[0].field, FilterField::Column("dob"));
        assert_eq!(
            set.filters[0].value,
            FilterValue::Date(NaiveDate::from_ymd_opt(2010, 6, 30).unwrap())
        );
    }

    proptest! {
        // The parser must never panic, whatever the caller sends.
        #[test]
        fn test_parser_total_on_arbitrary_input(expr in ".{0,64}") {
            let _ = parse_custom_filters(&[expr], &registry());
        }

        #[test]
        fn test_valid_integer_filters_always_parse(n in -1_000_000i64..1_000_000) {
            let expr = format!("number_of_children__gte__integer={n}");
            let set = parse_custom_filters(&[expr], &registry()).unwrap();
            prop_assert_eq!(set.filters[0].value.clone(), FilterValue::Integer(n));
        }
    }
}
