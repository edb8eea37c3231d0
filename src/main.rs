mod api;
mod browser;
mod error;
mod scrape;
mod sections;

use axum::routing::{get, post};
use axum::Router;
use dotenv::dotenv;
use std::env;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::browser::ChromeLoader;

fn app(state: Arc<api::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/scrape", post(api::scrape_page))
        .route("/", get(api::health))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let state = Arc::new(api::AppState {
        loader: Arc::new(ChromeLoader),
        browser_gate: Mutex::new(()),
    });

    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    println!("🚀 Scraper running on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;

    Ok(())
}
