pub mod config;
pub mod error;
pub mod schedule_repository;
pub mod storage;
pub mod student_directory;
