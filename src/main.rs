use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use tracing::info;
#[cfg(feature = "postgres-store")]
use tracing::warn;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use medicoz::episodes;
use medicoz::mailer::build_mailer;
use medicoz::moderation::ContentModerator;
use medicoz::openapi::ApiDoc;
use medicoz::rate_limit::{RateLimitConfig, RateLimiterFacade};
use medicoz::repo::{ContactRepo, Repo};
use medicoz::session::SessionStore;
use medicoz::{config, AppState, Config, SecurityHeaders};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(15 * 60);

struct Stores {
    main: Arc<dyn Repo>,
    admin: Arc<dyn ContactRepo>,
}

#[cfg(feature = "postgres-store")]
async fn pg_repo(url: &str) -> anyhow::Result<medicoz::repo::pg::PgRepo> {
    use sqlx::postgres::PgPoolOptions;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("connecting to Postgres")?;
    let repo = medicoz::repo::pg::PgRepo::new(pool);
    repo.migrate().await.context("running migrations")?;
    Ok(repo)
}

async fn open_stores(cfg: &Config) -> anyhow::Result<Stores> {
    #[cfg(feature = "postgres-store")]
    if let Some(url) = cfg.database_url.as_deref() {
        let main = pg_repo(url).await?;
        let admin: Arc<dyn ContactRepo> = match cfg.admin_database_url.as_deref() {
            Some(admin_url) => Arc::new(pg_repo(admin_url).await?),
            None => {
                warn!("ADMIN_DATABASE_URL unset; contact mirror shares the main database");
                Arc::new(main.clone())
            }
        };
        info!("Using Postgres repository backend");
        return Ok(Stores { main: Arc::new(main), admin });
    }

    #[cfg(feature = "inmem-store")]
    {
        use medicoz::repo::inmem::InMemRepo;
        info!(
            data_dir = %cfg.data_dir,
            admin_dir = %cfg.admin_data_dir,
            "Using in-memory repository backend"
        );
        return Ok(Stores {
            main: Arc::new(InMemRepo::open(&cfg.data_dir)),
            admin: Arc::new(InMemRepo::open(&cfg.admin_data_dir)),
        });
    }

    #[allow(unreachable_code)]
    Err(anyhow::anyhow!(
        "no storage backend: set DATABASE_URL or build with the inmem-store feature"
    ))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment itself.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Bootstrapping Medicoz API");
    let cfg = Arc::new(Config::from_env());
    cfg.log_summary();

    let stores = open_stores(&cfg).await?;
    let catalog = episodes::load_catalog(cfg.episodes_file.as_deref())?;
    episodes::seed_episodes(stores.main.as_ref(), catalog).await?;

    let sessions = SessionStore::new(cfg.session_ttl_days);
    let rate_limiter = RateLimiterFacade::from_config(RateLimitConfig::from_env());
    let data = web::Data::new(AppState {
        repo: stores.main,
        admin_contacts: stores.admin,
        sessions: sessions.clone(),
        mailer: build_mailer(&cfg.email),
        moderator: ContentModerator::new(),
        config: cfg.clone(),
        rate_limiter: Some(rate_limiter.clone()),
    });

    actix_web::rt::spawn(async move {
        let mut tick = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            tick.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                info!(purged, "expired sessions purged");
            }
            rate_limiter.sweep();
        }
    });

    let openapi = ApiDoc::openapi();
    info!("OpenAPI document generated");

    let app_cfg = cfg.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(app_cfg.frontend_url.trim_end_matches('/'))
            .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(data.clone())
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_config(&app_cfg))
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))
    .with_context(|| format!("binding {}:{}", cfg.bind_addr, cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);
    server.run().await?;
    Ok(())
}
