pub mod backup;
pub mod core;
pub mod diagnosis;
pub mod import;
pub mod leaderboard;
pub mod scores;
pub mod students;
