use blog_common::{
    model::BlogSnowflakeGenerator,
    snowflake::{PartOutOfRangeError, ProcessId, WorkerId},
    util::PositiveDuration,
};
use blog_db::{DbClient, DbError, MemoryStore, Store};
use config::Env;
use server::ServerState;
use service::{
    CommentService, HeartService, MemberService, PostService, SubCommentService,
    token::TokenProvider,
};
use std::{net::SocketAddr, sync::Arc};
use storage::{MemoryStorage, ObjectStorage, S3Settings, S3Storage};
use thiserror::Error;
use time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod server;
mod service;
mod storage;

const MEMORY_BUCKET: &str = "memory";

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid snowflake configuration: {0}")]
    Snowflake(#[from] PartOutOfRangeError),
    #[error("{0} must be positive")]
    NonPositiveLifetime(&'static str),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "blog_api=debug,blog_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn open_store(
    env: &Env,
    snowflake_generator: BlogSnowflakeGenerator,
) -> Result<Arc<dyn Store>, InitError> {
    let Some(database_url) = &env.database_url else {
        warn!("DATABASE_URL is not set, data is kept in memory only");
        return Ok(Arc::new(MemoryStore::new(snowflake_generator)));
    };

    let client = DbClient::connect(
        database_url,
        env.database_max_connections,
        snowflake_generator,
    )
    .await?;
    client.migrate().await?;

    Ok(Arc::new(client))
}

async fn open_storage(env: &Env) -> Arc<dyn ObjectStorage> {
    let Some(bucket) = &env.s3_bucket else {
        warn!("S3_BUCKET is not set, uploads are kept in memory only");
        return Arc::new(MemoryStorage::new(MEMORY_BUCKET.to_owned()));
    };

    Arc::new(
        S3Storage::connect(S3Settings {
            bucket: bucket.clone(),
            region: env.s3_region.clone(),
            endpoint: env.s3_endpoint.clone(),
            public_url: env.s3_public_url.clone(),
        })
        .await,
    )
}

fn token_provider(env: &Env) -> Result<TokenProvider, InitError> {
    let access = PositiveDuration::new(Duration::minutes(env.access_token_minutes.into()))
        .ok_or(InitError::NonPositiveLifetime("ACCESS_TOKEN_MINUTES"))?;
    let refresh = PositiveDuration::new(Duration::days(env.refresh_token_days.into()))
        .ok_or(InitError::NonPositiveLifetime("REFRESH_TOKEN_DAYS"))?;

    Ok(TokenProvider::new(env.jwt_secret.as_bytes(), access, refresh))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "Could not listen for ctrl-c");
        return;
    }

    info!("Shutting down");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;
    debug!(?env, "Loaded environment");

    let snowflake_generator = BlogSnowflakeGenerator::new(
        WorkerId::try_from(env.snowflake_worker_id)?,
        ProcessId::try_from(env.snowflake_process_id)?,
    );
    let store = open_store(&env, snowflake_generator).await?;
    let storage = open_storage(&env).await;
    let tokens = Arc::new(token_provider(&env)?);

    let state = ServerState {
        members: MemberService::new(Arc::clone(&store), Arc::clone(&tokens)),
        posts: PostService::new(Arc::clone(&store), storage, Arc::clone(&tokens)),
        comments: CommentService::new(Arc::clone(&store), Arc::clone(&tokens)),
        sub_comments: SubCommentService::new(Arc::clone(&store), Arc::clone(&tokens)),
        hearts: HeartService::new(store, tokens),
    };

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::app(state, env.max_upload_bytes).layer(tracing_layer);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
