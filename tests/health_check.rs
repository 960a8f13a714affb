use actix_web::{test, App, web};
use chrono::DateTime;
use std::sync::Arc;
use user_store::{AppState, MemorySessionFactory, Settings, User};

#[actix_web::test]
async fn test_health_check() {
    let config = Settings::new_for_test().expect("Failed to load test config");
    let memory = MemorySessionFactory::with_users([User::new("u1")]);
    let state = web::Data::new(AppState::from_parts(config, Arc::new(memory)));

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(user_store::health_check))
            .route("/users/{user_id}", web::get().to(user_store::api::get_user))
    ).await;

    // one lookup so the counters move
    let req = test::TestRequest::get().uri("/users/u1").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "healthy");
    assert!(DateTime::parse_from_rfc3339(
        json["timestamp"].as_str().unwrap()
    ).is_ok());
    assert_eq!(json["sessions"]["opened"], 1);
    assert_eq!(json["sessions"]["released"], 1);
    assert_eq!(json["sessions"]["active"], 0);
}
