pub mod answer_key;
pub mod attempt_lifecycle_service;
pub mod class_directory;
pub mod disengagement_service;
pub mod leaderboard_service;
pub mod notifier;
pub mod scoring_service;
