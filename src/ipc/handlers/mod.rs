pub mod auth;
pub mod backup;
pub mod core;
pub mod expenses;
pub mod marks;
pub mod reports;
pub mod setup;
pub mod students;
pub mod subjects;
pub mod users;
