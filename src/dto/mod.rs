pub mod auth;
pub mod recipes;
pub mod tags;
pub mod users;
