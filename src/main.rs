#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use rimfit::{
    bot,
    config::{self, Settings},
    context::AppContext,
    core::session::SessionStore,
    errors::{Error, Result},
    media::FsMediaStore,
    processor::{PaymentProcessor, YooKassaClient},
    providers::FalVideoGenerator,
    server,
};
use std::{env, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often idle generation sessions are swept.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Settings and packages
    let settings = Settings::from_env()
        .inspect_err(|e| error!("Critical error loading settings: {}", e))?;
    let packages = config::packages::load_default_config()
        .inspect_err(|e| error!("Critical error loading config.toml: {}", e))?;
    info!(
        "Loaded {} packages, image provider {}",
        packages.iter().count(),
        settings.image_provider
    );

    // 4. Database
    let db = config::database::create_connection(&settings.database_url)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Collaborators
    let http = reqwest::Client::builder()
        .timeout(settings.video_timeout.max(settings.generation_timeout))
        .build()
        .map_err(|e| Error::Config {
            message: format!("Failed to build HTTP client: {e}"),
        })?;
    let image = settings
        .image_provider
        .build(settings.ai_api_key.clone(), http.clone());
    let video = Arc::new(FalVideoGenerator::new(settings.ai_api_key.clone(), http));
    tokio::fs::create_dir_all(&settings.media_dir).await?;
    let media = Arc::new(FsMediaStore::new(settings.media_dir.clone()));

    let processor: Option<Arc<dyn PaymentProcessor>> = match settings.yookassa.clone() {
        Some(yookassa) => Some(Arc::new(YooKassaClient::new(
            yookassa,
            settings.currency.clone(),
            settings.processor_timeout,
        )?)),
        None => {
            warn!("YooKassa is not configured; purchases are disabled");
            None
        }
    };

    let app = Arc::new(AppContext {
        db,
        settings: Arc::new(settings),
        packages: Arc::new(packages),
        processor,
        image,
        video,
        media,
        sessions: Arc::new(SessionStore::new()),
    });

    // 6. Background tasks: session eviction and the webhook server
    let sweeper = Arc::clone(&app);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = sweeper.sessions.evict_idle(sweeper.settings.session_ttl);
            if evicted > 0 {
                info!("Evicted {} idle sessions", evicted);
            }
        }
    });

    if app.processor.is_some() {
        let web = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = server::serve(web).await {
                error!("Webhook server stopped: {}", e);
            }
        });
    }

    // 7. Run the bot
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    bot::run_bot(token, app).await.map_err(Error::from)?;

    Ok(())
}
