use std::net::SocketAddr;

use todo_backend::{
    config::{get_config, init_config, Storage},
    database::pool::{create_pool, migrate},
    routes,
    services::auth_service::AuthSettings,
    AppState,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,todo_backend=debug,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config();
    init_tracing(&config.log_format);

    let app_state = match config.storage() {
        Storage::Postgres(url) => {
            let pool = create_pool(&url).await?;
            migrate(&pool).await?;
            info!("Connected to Postgres, migrations applied");
            AppState::new(pool)
        }
        Storage::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            AppState::in_memory(AuthSettings::new(
                config.jwt_secret.clone(),
                config.session_ttl_hours,
            ))
        }
    };

    if let (Some(email), Some(password)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) {
        let admin = app_state.auth_service.ensure_admin(email, password).await?;
        info!(user_id = %admin.id, "Bootstrap admin ready");
    }

    info!("Serving static UI from: {}", config.static_dir);
    let app = routes::router(app_state, &config.static_dir);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
