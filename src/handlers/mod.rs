pub mod attempt_handler;
pub mod identity;
pub mod leaderboard_handler;

pub use attempt_handler::{
    check_existing_attempt, heartbeat, report_disengagement, reset_student_quiz,
    save_quiz_progress, start_quiz, submit_quiz,
};
pub use leaderboard_handler::{
    get_leaderboard, health_check, health_check_live, health_check_ready,
};
