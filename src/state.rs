//! Shared application state for all routes.

use crate::auth::AuthService;
use crate::chat::{ChatProvider, ChatService, GeminiClient, PracticeInfo};
use crate::config::Settings;
use crate::db::Database;
use crate::error::AppError;
use crate::rate_limit::{CounterStore, FixedWindowLimiter, InMemoryCounterStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth: AuthService,
    pub chat: ChatService,
    pub api_limiter: FixedWindowLimiter,
    pub chat_limiter: FixedWindowLimiter,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// State with an explicit chat provider and counter store.
    pub fn new(
        db: Database,
        settings: Settings,
        chat_provider: Arc<dyn ChatProvider>,
        counters: Arc<dyn CounterStore>,
    ) -> Self {
        AppState {
            auth: AuthService::new(db.clone(), settings.session_ttl),
            chat: ChatService::new(chat_provider, PracticeInfo::from_settings(&settings.chat)),
            api_limiter: FixedWindowLimiter::new(counters.clone(), "api", settings.api_rate_limit),
            chat_limiter: FixedWindowLimiter::new(counters, "chat", settings.chat_rate_limit),
            db,
            settings: Arc::new(settings),
        }
    }

    /// Production wiring: Gemini provider and in-process counters.
    pub fn from_settings(db: Database, settings: Settings) -> Result<Self, AppError> {
        let gemini = GeminiClient::new(&settings.chat)?;
        if settings.chat.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; chatbot requests will fail");
        }
        Ok(AppState::new(
            db,
            settings,
            Arc::new(gemini),
            Arc::new(InMemoryCounterStore::new()),
        ))
    }
}
