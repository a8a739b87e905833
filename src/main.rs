use actix_web::web;
use dotenvy::dotenv;
use order_lifecycle::config::Settings;
use order_lifecycle::state::spawn_pruner;
use order_lifecycle::{build_server, init_state};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = Settings::from_env().map_err(std::io::Error::other)?;
    let state = web::Data::new(init_state(&settings).map_err(std::io::Error::other)?);

    spawn_pruner(state.clone(), settings.prune_interval);

    log::info!(
        "Starting server at http://{}:{} ({:?} storage)",
        settings.host,
        settings.port,
        settings.storage
    );

    build_server(state, &settings.host, settings.port)?.await
}
