//! Typed custom-filter expressions
//!
//! Filter strings of the form `field__lookup__type=value` are parsed into a
//! validated AST against a field registry, then rendered as SQL fragments
//! with positional binds. Unknown fields, lookups, or type tags are rejected
//! at parse time rather than silently matching nothing.

mod parser;
mod registry;

pub use parser::parse_custom_filters;
pub use registry::{ColumnType, FieldRegistry};

use chrono::NaiveDate;

/// Comparison operator of a filter expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    Icontains,
}

impl Lookup {
    fn sql_operator(&self) -> &'static str {
        match self {
            Lookup::Exact => "=",
            Lookup::Lt => "<",
            Lookup::Lte => "<=",
            Lookup::Gt => ">",
            Lookup::Gte => ">=",
            Lookup::Contains => "LIKE",
            Lookup::Icontains => "ILIKE",
        }
    }

    fn is_pattern(&self) -> bool {
        matches!(self, Lookup::Contains | Lookup::Icontains)
    }
}

/// A coerced filter value, ready to bind
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Integer(i64),
    Boolean(bool),
    Str(String),
    Date(NaiveDate),
}

/// Resolved target of a filter field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterField {
    /// A real column on the individuals table
    Column(&'static str),
    /// A key inside the free-form `json_ext` extension payload
    JsonExt(String),
}

/// One validated filter expression
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFilter {
    pub field: FilterField,
    pub lookup: Lookup,
    pub value: FilterValue,
}

impl CustomFilter {
    /// Render this filter as a SQL predicate on `alias`, binding at
    /// `param_index`.
    fn to_sql(&self, alias: &str, param_index: usize) -> (String, FilterValue) {
        let op = self.lookup.sql_operator();
        let bind = if self.lookup.is_pattern() {
            match &self.value {
                FilterValue::Str(s) => FilterValue::Str(format!("%{s}%")),
                other => other.clone(),
            }
        } else {
            self.value.clone()
        };

        let lhs = match (&self.field, &self.value) {
            (FilterField::Column(col), _) => format!("{alias}.{col}"),
            (FilterField::JsonExt(key), FilterValue::Integer(_)) => {
                format!("({alias}.json_ext->>'{key}')::bigint")
            }
            (FilterField::JsonExt(key), FilterValue::Boolean(_)) => {
                format!("({alias}.json_ext->>'{key}')::boolean")
            }
            (FilterField::JsonExt(key), FilterValue::Date(_)) => {
                format!("({alias}.json_ext->>'{key}')::date")
            }
            (FilterField::JsonExt(key), FilterValue::Str(_)) => {
                format!("{alias}.json_ext->>'{key}'")
            }
        };

        (format!("{lhs} {op} ${param_index}"), bind)
    }
}

/// An ordered set of parsed filters, ANDed together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    pub filters: Vec<CustomFilter>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Render the whole set as an ANDed predicate on `alias`. Bind
    /// placeholders start at `first_param`; returns the fragment and the
    /// values to bind, in order. An empty set renders as `TRUE`.
    pub fn to_sql(&self, alias: &str, first_param: usize) -> (String, Vec<FilterValue>) {
        if self.filters.is_empty() {
            return ("TRUE".to_string(), Vec::new());
        }

        let mut fragments = Vec::with_capacity(self.filters.len());
        let mut binds = Vec::with_capacity(self.filters.len());
        for (offset, filter) in self.filters.iter().enumerate() {
            let (fragment, bind) = filter.to_sql(alias, first_param + offset);
            fragments.push(fragment);
            binds.push(bind);
        }

        (fragments.join(" AND "), binds)
    }
}
