use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use semcache::cache::SemanticCache;
use semcache::cli;
use semcache::config::Config;
use semcache::openai::OpenAiClient;
use semcache::provider::{Answerer, Embedder};
use semcache::server::{self, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let cache = match SemanticCache::open(&config.data_dir, config.embedding_dim, config.threshold) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            eprintln!("Error opening cache at '{}': {}", config.data_dir.display(), e);
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "serve" {
        let client = match OpenAiClient::new(&config) {
            Ok(client) => client,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        };

        let state = AppState {
            cache,
            embedder: Arc::new(client.clone()) as Arc<dyn Embedder>,
            answerer: Arc::new(client) as Arc<dyn Answerer>,
        };

        tracing::info!("listening on {}", config.bind_addr);
        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(server::routes)
        })
        .bind(&config.bind_addr)?
        .run()
        .await?;
    } else {
        let command = match cli::parse_command_from_args(&args) {
            Ok(command) => command,
            Err(error) => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
        };

        std::process::exit(cli::execute_command(&cache, command));
    }

    Ok(())
}
