pub mod history;
pub mod hold;
pub mod metrics;
pub mod session_stats;
