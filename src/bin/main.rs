use actix_web::{middleware::Logger, App, HttpServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use concert_diary::avatars::ObjectUrls;
use concert_diary::config;
use concert_diary::core::store::StoreClient;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config::log_filter()))
        .init();

    let store = StoreClient::from_env()?;
    let urls = ObjectUrls::new();
    let (host, port) = (config::host(), config::port());

    info!("Server listening on http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(concert_diary::app_config(store.clone(), urls.clone()))
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}
