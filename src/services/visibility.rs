//! Location-based visibility filter
//!
//! Pure read-path predicate generation: given the requesting user, produce
//! a SQL fragment restricting Individual (or Group) rows to the user's
//! jurisdiction. Anonymous users see nothing; administrative users see
//! everything; district officers see rows whose village chains up to a
//! district they administer, either directly or transitively through group
//! membership.

use uuid::Uuid;

use crate::database::SqlBind;

/// What the requesting user is allowed to see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserScope {
    Anonymous,
    Admin,
    /// Districts the user administers
    Districts(Vec<Uuid>),
}

/// The requesting user, as resolved by the (external) auth layer
#[derive(Debug, Clone)]
pub struct UserContext {
    pub username: String,
    pub scope: UserScope,
}

impl UserContext {
    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            scope: UserScope::Admin,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            username: String::new(),
            scope: UserScope::Anonymous,
        }
    }

    pub fn district_officer(username: impl Into<String>, districts: Vec<Uuid>) -> Self {
        Self {
            username: username.into(),
            scope: UserScope::Districts(districts),
        }
    }
}

/// A generated predicate plus the binds it consumes, in order
#[derive(Debug, Clone)]
pub struct SqlPredicate {
    pub sql: String,
    pub binds: Vec<SqlBind>,
}

impl SqlPredicate {
    fn unrestricted() -> Self {
        Self {
            sql: "TRUE".to_string(),
            binds: Vec::new(),
        }
    }

    fn none() -> Self {
        Self {
            sql: "FALSE".to_string(),
            binds: Vec::new(),
        }
    }
}

/// Predicate combinator for jurisdiction scoping
#[derive(Debug, Clone)]
pub struct VisibilityFilter {
    row_security: bool,
}

impl VisibilityFilter {
    pub fn new(row_security: bool) -> Self {
        Self { row_security }
    }

    /// Predicate over Individual rows aliased as `alias`. Bind placeholders
    /// start at `first_param`; the district list is bound once and
    /// referenced from both arms of the combinator.
    pub fn individual_predicate(
        &self,
        user: &UserContext,
        alias: &str,
        first_param: usize,
    ) -> SqlPredicate {
        if !self.row_security {
            return SqlPredicate::unrestricted();
        }

        match &user.scope {
            UserScope::Anonymous => SqlPredicate::none(),
            UserScope::Admin => SqlPredicate::unrestricted(),
            UserScope::Districts(districts) => {
                let direct_match = village_in_districts(alias, "village_id", first_param);
                let group_match = format!(
                    "EXISTS (SELECT 1 FROM registry.group_individuals gi \
                     JOIN registry.groups g ON g.id = gi.group_id AND NOT g.is_deleted \
                     WHERE gi.individual_id = {alias}.id AND NOT gi.is_deleted \
                       AND {})",
                    village_in_districts("g", "village_id", first_param)
                );
                SqlPredicate {
                    sql: format!("({direct_match} OR {group_match})"),
                    binds: vec![SqlBind::UuidList(districts.clone())],
                }
            }
        }
    }

    /// Predicate over Group rows aliased as `alias`; groups are scoped by
    /// their own village chain only.
    pub fn group_predicate(
        &self,
        user: &UserContext,
        alias: &str,
        first_param: usize,
    ) -> SqlPredicate {
        if !self.row_security {
            return SqlPredicate::unrestricted();
        }

        match &user.scope {
            UserScope::Anonymous => SqlPredicate::none(),
            UserScope::Admin => SqlPredicate::unrestricted(),
            UserScope::Districts(districts) => SqlPredicate {
                sql: village_in_districts(alias, "village_id", first_param),
                binds: vec![SqlBind::UuidList(districts.clone())],
            },
        }
    }
}

/// `village -> ward -> district` chain membership test for one row's
/// village column.
fn village_in_districts(alias: &str, column: &str, param: usize) -> String {
    format!(
        "EXISTS (SELECT 1 FROM registry.locations v \
         JOIN registry.locations w ON w.location_id = v.parent_id \
         JOIN registry.locations d ON d.location_id = w.parent_id \
         WHERE v.location_id = {alias}.{column} AND d.location_id = ANY(${param}))"
    )
}
