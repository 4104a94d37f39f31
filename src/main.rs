mod config;
mod error;
mod model;
mod rate_limit;
mod web;

use actix_web::{middleware::Logger, web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

use config::Config;
use model::OpenAiClient;
use rate_limit::RateLimiter;
use web::routes;

// App state structure
pub struct AppState {
    pub config: Config,
    pub limiter: RateLimiter,
    pub openai: OpenAiClient,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let limiter = RateLimiter::new(config.rate_limit, config.rate_window, config.rate_sweep_threshold);
        let openai = OpenAiClient::new(&config)?;
        Ok(Self {
            config,
            limiter,
            openai,
        })
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting therapist proxy");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let bind = (config.host.clone(), config.port);

    info!(
        "Rate limit: {} requests per {}s per client, model {}",
        config.rate_limit,
        config.rate_window.as_secs(),
        config.model
    );

    let app_state = match AppState::new(config) {
        Ok(state) => Data::new(state),
        Err(e) => {
            error!("Failed to initialize upstream client: {}", e);
            std::process::exit(1);
        }
    };

    info!("Listening on {}:{}", bind.0, bind.1);

    // Start web server
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(routes::cors_headers())
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await
}
