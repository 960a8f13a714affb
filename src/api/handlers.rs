use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, error};

use crate::db::{User, UserQuery};
use crate::error::{AppError, DatabaseError};
use crate::AppState;

/// Optional single-column filter for `GET /users`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub city: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserFilter {
    pub fn into_query(self) -> Result<UserQuery, AppError> {
        let candidates = [
            self.city.map(UserQuery::ByCity),
            self.country.map(UserQuery::ByCountry),
            self.email.map(UserQuery::ByEmail),
            self.phone.map(UserQuery::ByPhone),
            self.first_name.map(UserQuery::ByFirstName),
            self.last_name.map(UserQuery::ByLastName),
        ];
        let mut set = candidates.into_iter().flatten();
        match (set.next(), set.next()) {
            (None, _) => Ok(UserQuery::All),
            (Some(query), None) => Ok(query),
            (Some(_), Some(_)) => Err(AppError::ValidationError(
                "filter on at most one column".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCityRequest {
    pub city: Option<String>,
}

pub async fn list_users(
    filter: web::Query<UserFilter>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let query = filter.into_inner().into_query()?;
    let users = state.users.find_by(&query).await?;
    info!(query = query.name(), rows = users.len(), "listed users");
    Ok(HttpResponse::Ok().json(users))
}

pub async fn get_user(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    match state.users.get_user_by_id(&user_id).await? {
        Some(user) => Ok(HttpResponse::Ok().json(user)),
        None => Err(DatabaseError::NotFound.into()),
    }
}

pub async fn update_city(
    path: web::Path<String>,
    req: web::Json<UpdateCityRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    info!("Received city update for user: {}", user_id);

    // the store re-reads the row in its own transaction
    let user = User::new(user_id.clone());

    match state.users.update_user_city(&user, req.city.as_deref()).await {
        Ok(updated) => Ok(HttpResponse::Ok().json(updated)),
        Err(e) => {
            error!("City update failed for user: {}: {}", user_id, e);
            Err(e)
        }
    }
}
