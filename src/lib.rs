pub mod config;

pub mod core {
    pub mod errors;
    pub mod helpers;
    pub mod query_params;
    pub mod store;
}

pub mod models {
    pub mod models;
}

pub mod avatars;
pub mod comments;
pub mod concerts;
pub mod friends;
pub mod handlers;
pub mod mapper;
pub mod pages;
pub mod profiles;
pub mod session;
pub mod stats;
pub mod templates;

use actix_web::web;

use crate::avatars::ObjectUrls;
use crate::core::store::StoreClient;

/// Register shared state and every route on an actix app.
pub fn app_config(store: StoreClient, urls: ObjectUrls) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(store)).app_data(web::Data::new(urls));
        handlers::configure(cfg);
    }
}
