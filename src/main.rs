use std::net::SocketAddr;
use std::sync::Arc;

use miniapp_auth_backend::{
    config::{get_config, init_config, AllowListSource},
    database::pool::create_pool,
    routes,
    services::allow_list_service::{PgAllowList, StaticAllowList, TelegramAuthorizer},
    AppState,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    init_config()?;
    let config = get_config();

    let authorizer: Arc<dyn TelegramAuthorizer> = match &config.allow_list {
        AllowListSource::Static(ids) => {
            info!(count = ids.len(), "Using static Telegram allow-list");
            Arc::new(StaticAllowList::new(ids.iter().copied()))
        }
        AllowListSource::Postgres { database_url } => {
            let pool = create_pool(database_url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!(app = %config.allow_list_app_name, "Using database Telegram allow-list");
            Arc::new(PgAllowList::new(pool, config.allow_list_app_name.clone()))
        }
    };

    if config.telegram_auth_max_age.is_none() {
        info!("Telegram auth_date freshness check is disabled");
    }

    let app_state = AppState::new(config, authorizer)?;

    if config.trust_forwarded_for {
        info!("Rate limiter keys on X-Forwarded-For");
    }

    let app = routes::router(app_state, config.auth_rps, config.trust_forwarded_for)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
