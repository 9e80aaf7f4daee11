pub mod about;
pub mod jobs;
pub mod results;
