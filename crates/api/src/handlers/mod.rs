pub mod collectors;
pub mod health;
pub mod rules;
pub mod schedules;
pub mod tasks;
