pub mod jobs;
pub mod progress;
pub mod upload;
pub mod users;
