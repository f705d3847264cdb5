use munidesk::{app, db, docs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let port = listen_port();
    let openapi = docs::build_openapi(port)?;

    let pool = db::init().await?;
    let router = app::create_app(pool)
        .await?
        .merge(docs::swagger_routes(openapi));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router.into_make_service()).await?;

    Ok(())
}

fn listen_port() -> u16 {
    std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000)
}

// `.env` in the working directory wins; fall back to the crate root so the
// server starts the same way from anywhere.
fn load_env() {
    if dotenvy::dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
