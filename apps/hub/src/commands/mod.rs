pub mod games;
pub mod jobs;
pub mod login;
