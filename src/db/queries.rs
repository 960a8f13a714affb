//! Named lookups against the `User` table.
//!
//! Each variant maps to a fixed column; the value is always bound as a
//! query parameter.

use crate::db::models::User;

/// Column list shared by every `SELECT` and `RETURNING` clause.
pub const USER_COLUMNS: &str =
    r#""userId", city, password, country, email, phone, "firstName", "lastName""#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserQuery {
    All,
    ByUserId(String),
    ByPassword(String),
    ByCity(String),
    ByCountry(String),
    ByEmail(String),
    ByPhone(String),
    ByFirstName(String),
    ByLastName(String),
}

impl UserQuery {
    pub fn name(&self) -> &'static str {
        match self {
            UserQuery::All => "User.findAll",
            UserQuery::ByUserId(_) => "User.findByUserId",
            UserQuery::ByPassword(_) => "User.findByPassword",
            UserQuery::ByCity(_) => "User.findByCity",
            UserQuery::ByCountry(_) => "User.findByCountry",
            UserQuery::ByEmail(_) => "User.findByEmail",
            UserQuery::ByPhone(_) => "User.findByPhone",
            UserQuery::ByFirstName(_) => "User.findByFirstName",
            UserQuery::ByLastName(_) => "User.findByLastName",
        }
    }

    /// Quoted column the lookup filters on, `None` for [`UserQuery::All`].
    pub fn column(&self) -> Option<&'static str> {
        match self {
            UserQuery::All => None,
            UserQuery::ByUserId(_) => Some(r#""userId""#),
            UserQuery::ByPassword(_) => Some("password"),
            UserQuery::ByCity(_) => Some("city"),
            UserQuery::ByCountry(_) => Some("country"),
            UserQuery::ByEmail(_) => Some("email"),
            UserQuery::ByPhone(_) => Some("phone"),
            UserQuery::ByFirstName(_) => Some(r#""firstName""#),
            UserQuery::ByLastName(_) => Some(r#""lastName""#),
        }
    }

    pub fn param(&self) -> Option<&str> {
        match self {
            UserQuery::All => None,
            UserQuery::ByUserId(v)
            | UserQuery::ByPassword(v)
            | UserQuery::ByCity(v)
            | UserQuery::ByCountry(v)
            | UserQuery::ByEmail(v)
            | UserQuery::ByPhone(v)
            | UserQuery::ByFirstName(v)
            | UserQuery::ByLastName(v) => Some(v),
        }
    }

    /// Parameterized SQL for this lookup, ordered by `userId`.
    pub fn sql(&self) -> String {
        match self.column() {
            Some(column) => format!(
                r#"SELECT {} FROM "User" WHERE {} = $1 ORDER BY "userId""#,
                USER_COLUMNS, column
            ),
            None => format!(r#"SELECT {} FROM "User" ORDER BY "userId""#, USER_COLUMNS),
        }
    }

    /// Evaluates the lookup against an in-memory record.
    pub fn matches(&self, user: &User) -> bool {
        let field = match self {
            UserQuery::All => return true,
            UserQuery::ByUserId(v) => return user.user_id == *v,
            UserQuery::ByPassword(_) => &user.password,
            UserQuery::ByCity(_) => &user.city,
            UserQuery::ByCountry(_) => &user.country,
            UserQuery::ByEmail(_) => &user.email,
            UserQuery::ByPhone(_) => &user.phone,
            UserQuery::ByFirstName(_) => &user.first_name,
            UserQuery::ByLastName(_) => &user.last_name,
        };
        // SQL `=` never matches NULL
        field.as_deref() == self.param()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_all_has_no_filter() {
        let query = UserQuery::All;
        assert_eq!(query.name(), "User.findAll");
        assert_eq!(query.param(), None);
        assert!(!query.sql().contains("WHERE"));
        assert!(query.matches(&User::new("anyone")));
    }

    #[test]
    fn test_value_is_bound_not_interpolated() {
        let query = UserQuery::ByCity("Lyon' OR '1'='1".into());
        let sql = query.sql();
        assert!(sql.contains("WHERE city = $1"));
        assert!(!sql.contains("Lyon"));
        assert_eq!(query.param(), Some("Lyon' OR '1'='1"));
    }

    #[test]
    fn test_camel_case_columns_are_quoted() {
        assert!(UserQuery::ByFirstName("Ada".into())
            .sql()
            .contains(r#"WHERE "firstName" = $1"#));
        assert_eq!(UserQuery::ByUserId("u1".into()).column(), Some(r#""userId""#));
        assert_eq!(UserQuery::ByLastName("L".into()).name(), "User.findByLastName");
    }

    #[test]
    fn test_matches_compares_the_named_field() {
        let user = User::new("u1").with_city("Lyon").with_email("u1@example.com");

        assert!(UserQuery::ByUserId("u1".into()).matches(&user));
        assert!(UserQuery::ByCity("Lyon".into()).matches(&user));
        assert!(!UserQuery::ByCity("Nice".into()).matches(&user));
        assert!(UserQuery::ByEmail("u1@example.com".into()).matches(&user));
        // unset columns never match
        assert!(!UserQuery::ByCountry("".into()).matches(&user));
    }
}
