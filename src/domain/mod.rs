pub mod calendar;
pub mod conflict;
pub mod error;
pub mod hours;
pub mod ids;
pub mod lessons;
pub mod models;
pub mod teacher_schedule;
pub mod time;
pub mod time_block;
