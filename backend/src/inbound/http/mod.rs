//! HTTP inbound adapter exposing REST endpoints.

pub mod admin_nearby;
pub mod entities;
pub mod error;
pub mod health;
pub mod nearby;
pub mod schemas;
pub mod state;
pub mod validation;

use actix_web::web;

pub use error::ApiResult;

/// Register every `/api/v1` endpoint on `cfg`.
///
/// # Examples
/// ```
/// use actix_web::{App, web};
/// use nearby_backend::inbound::http::configure_api;
///
/// let _app = App::new().service(web::scope("/api/v1").configure(configure_api));
/// ```
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(nearby::get_nearby)
        .service(nearby::recompute_nearby)
        .service(entities::get_entity)
        .service(entities::put_entity)
        .service(entities::delete_entity)
        .service(admin_nearby::clear_cache)
        .service(admin_nearby::get_config)
        .service(admin_nearby::update_config)
        .service(admin_nearby::provider_check);
}
