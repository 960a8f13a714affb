use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;
use crate::Result;

/// Longest `userId` and `city` value the `User` table accepts, in characters.
pub const MAX_FIELD_CHARS: usize = 255;

/// One row of the `"User"` table.
///
/// Column names are camelCase (`userId`, `firstName`, ...). Only `user_id`
/// and `city` carry size constraints; they are checked by [`User::validate`]
/// when a session writes the record, not when a setter is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub city: Option<String>,
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            city: None,
            password: None,
            country: None,
            email: None,
            phone: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Only meant for instances that have not been persisted yet; stored
    /// rows are never re-keyed.
    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = user_id.into();
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    pub fn set_city(&mut self, city: Option<String>) {
        self.city = city;
    }

    /// Checks the column constraints of the `User` table.
    pub fn validate(&self) -> Result<()> {
        let id_len = self.user_id.chars().count();
        if id_len == 0 {
            return Err(AppError::ValidationError("userId must not be empty".into()));
        }
        if id_len > MAX_FIELD_CHARS {
            return Err(AppError::ValidationError(format!(
                "userId is {} characters, the limit is {}",
                id_len, MAX_FIELD_CHARS
            )));
        }
        if let Some(city) = &self.city {
            let city_len = city.chars().count();
            if city_len > MAX_FIELD_CHARS {
                return Err(AppError::ValidationError(format!(
                    "city is {} characters, the limit is {}",
                    city_len, MAX_FIELD_CHARS
                )));
            }
        }
        Ok(())
    }
}
