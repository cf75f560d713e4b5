use std::sync::Arc;

use crate::{
    config::Config,
    db::Database,
    errors::AppResult,
    repositories::{AttemptStore, MongoAttemptStore},
    services::{
        attempt_lifecycle_service::AttemptLifecycleService,
        class_directory::{ClassDirectory, HttpClassDirectory},
        disengagement_service::DisengagementMonitor,
        leaderboard_service::LeaderboardService,
        notifier::{CompletionNotifier, HttpCompletionNotifier},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub attempt_lifecycle: Arc<AttemptLifecycleService>,
    pub disengagement: Arc<DisengagementMonitor>,
    pub leaderboard: Arc<LeaderboardService>,
    pub config: Arc<Config>,
    pub db: Database,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let db = Database::connect(&config).await?;

        let mongo_store = MongoAttemptStore::new(&db, &config);
        mongo_store.ensure_indexes().await?;
        let store: Arc<dyn AttemptStore> = Arc::new(mongo_store);

        let directory: Arc<dyn ClassDirectory> = Arc::new(HttpClassDirectory::new(&config));
        let notifier: Arc<dyn CompletionNotifier> = Arc::new(HttpCompletionNotifier::new(&config));

        let attempt_lifecycle = Arc::new(AttemptLifecycleService::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&notifier),
        ));
        let disengagement = Arc::new(DisengagementMonitor::new(
            Arc::clone(&attempt_lifecycle),
            Arc::clone(&store),
            config.stale_after_secs,
        ));
        let leaderboard = Arc::new(LeaderboardService::new(store, directory));

        Ok(Self {
            attempt_lifecycle,
            disengagement,
            leaderboard,
            config: Arc::new(config),
            db,
        })
    }
}
