//! Application state - shared across all handlers.

use std::sync::Arc;

use quill_core::domain::{AllowList, Comment, Page, Post, User};
use quill_core::ports::{
    CounterStore, DocumentStore, IdentityProvider, RateLimiter, TokenService,
};
use quill_core::rate_limit::{
    FixedWindowRateLimiter, ForwardedIpKey, KeyExtractor, RateLimitPolicy,
};
use quill_core::services::{AccountService, CommentService, PageService, PostService};
use quill_infra::{
    InMemoryCounterStore, InMemoryDocumentStore, JwtTokenService, OidcIdentityProvider,
    containers,
};

use crate::config::{AppConfig, CounterBackend, StoreBackend};

/// One store per container.
pub struct Stores {
    pub posts: Arc<dyn DocumentStore<Post>>,
    pub pages: Arc<dyn DocumentStore<Page>>,
    pub comments: Arc<dyn DocumentStore<Comment>>,
    pub users: Arc<dyn DocumentStore<User>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            posts: Arc::new(InMemoryDocumentStore::<Post>::new(containers::POSTS)),
            pages: Arc::new(InMemoryDocumentStore::<Page>::new(containers::PAGES)),
            comments: Arc::new(InMemoryDocumentStore::<Comment>::new(containers::COMMENTS)),
            users: Arc::new(InMemoryDocumentStore::<User>::new(containers::USERS)),
        }
    }

    #[cfg(feature = "postgres")]
    async fn postgres(config: &quill_infra::DatabaseConfig) -> Option<Self> {
        use quill_infra::PostgresDocumentStore;

        match quill_infra::connect(config).await {
            Ok(db) => Some(Self {
                posts: Arc::new(PostgresDocumentStore::<Post>::new(db.clone(), containers::POSTS)),
                pages: Arc::new(PostgresDocumentStore::<Page>::new(db.clone(), containers::PAGES)),
                comments: Arc::new(PostgresDocumentStore::<Comment>::new(db.clone(), containers::COMMENTS)),
                users: Arc::new(PostgresDocumentStore::<User>::new(db, containers::USERS)),
            }),
            Err(e) => {
                tracing::error!(
                    "Failed to connect to database: {}. Using in-memory fallback.",
                    e
                );
                None
            }
        }
    }

    async fn from_config(config: &AppConfig) -> Self {
        match config.store_backend {
            StoreBackend::Memory => {
                tracing::warn!("Running with in-memory document store. Data is lost on restart.");
                Self::in_memory()
            }
            #[cfg(feature = "postgres")]
            StoreBackend::Postgres => match Self::postgres(&config.database).await {
                Some(stores) => stores,
                None => Self::in_memory(),
            },
            #[cfg(not(feature = "postgres"))]
            StoreBackend::Postgres => {
                tracing::warn!("Built without postgres feature - using in-memory document store");
                Self::in_memory()
            }
        }
    }
}

async fn counter_store_from_config(config: &AppConfig) -> Arc<dyn CounterStore> {
    match config.counter_backend {
        CounterBackend::Memory => Arc::new(InMemoryCounterStore::new()),
        #[cfg(feature = "redis")]
        CounterBackend::Redis => {
            match quill_infra::RedisCounterStore::new(config.redis.clone()).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::error!(
                        "Failed to connect to Redis: {}. Rate limits are per-process.",
                        e
                    );
                    Arc::new(InMemoryCounterStore::new())
                }
            }
        }
        #[cfg(not(feature = "redis"))]
        CounterBackend::Redis => {
            tracing::warn!("Built without redis feature - using in-memory counter store");
            Arc::new(InMemoryCounterStore::new())
        }
    }
}

/// The three rate-limit tiers.
#[derive(Clone)]
pub struct RateLimiters {
    pub api: Arc<dyn RateLimiter>,
    pub auth: Arc<dyn RateLimiter>,
    pub write: Arc<dyn RateLimiter>,
}

impl RateLimiters {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        let limiter = |policy: RateLimitPolicy| -> Arc<dyn RateLimiter> {
            Arc::new(FixedWindowRateLimiter::new(policy, store.clone()))
        };
        Self {
            api: limiter(RateLimitPolicy::api()),
            auth: limiter(RateLimitPolicy::auth()),
            write: limiter(RateLimitPolicy::write()),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub posts: PostService,
    pub pages: PageService,
    pub comments: CommentService,
    pub accounts: AccountService,
    pub tokens: Arc<dyn TokenService>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub counter_store: Arc<dyn CounterStore>,
    pub limiters: RateLimiters,
    pub key_extractor: Arc<dyn KeyExtractor>,
    /// Reported by `/api/version`.
    pub environment: String,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig) -> Self {
        let stores = Stores::from_config(config).await;
        let counter_store = counter_store_from_config(config).await;

        if config.authorized_users.is_empty() {
            tracing::warn!("AUTHORIZED_USERS is empty. Nobody can sign in.");
        }

        let state = Self::from_parts(
            stores,
            counter_store,
            Arc::new(JwtTokenService::new(config.jwt.clone())),
            Arc::new(OidcIdentityProvider::new(config.oidc.clone())),
            config.authorized_users.clone(),
            ForwardedIpKey {
                trust_proxy_headers: config.trust_proxy_headers,
            },
            config.environment.clone(),
        );

        tracing::info!(
            authorized_users = config.authorized_users.len(),
            trust_proxy_headers = config.trust_proxy_headers,
            "Application state initialized"
        );
        state
    }

    pub fn from_parts(
        stores: Stores,
        counter_store: Arc<dyn CounterStore>,
        tokens: Arc<dyn TokenService>,
        identity_provider: Arc<dyn IdentityProvider>,
        allow_list: AllowList,
        key_extractor: ForwardedIpKey,
        environment: String,
    ) -> Self {
        let posts = PostService::new(stores.posts);
        Self {
            comments: CommentService::new(stores.comments, posts.clone()),
            pages: PageService::new(stores.pages),
            accounts: AccountService::new(stores.users, allow_list),
            posts,
            tokens,
            identity_provider,
            limiters: RateLimiters::new(counter_store.clone()),
            counter_store,
            key_extractor: Arc::new(key_extractor),
            environment,
        }
    }
}
