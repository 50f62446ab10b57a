pub mod bootstrap;
pub mod commands;
pub mod lesson_scheduling;
pub mod performance;
