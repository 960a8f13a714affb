//! HTTP routes over the user store.

pub mod handlers;

use actix_web::web;

pub use handlers::{get_user, list_users, update_city, UpdateCityRequest, UserFilter};

/// Registers `/health` and the `/users` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(crate::health_check))
        .route("/users", web::get().to(list_users))
        .route("/users/{user_id}", web::get().to(get_user))
        .route("/users/{user_id}/city", web::put().to(update_city));
}
