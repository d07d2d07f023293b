pub mod candidates;
pub mod documents;
pub mod events;
pub mod health;
pub mod positions;
pub mod projects;
pub mod ratings;
pub mod requirements;
