pub mod health;
pub mod index;
pub mod tasks;
pub mod uploads;
