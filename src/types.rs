pub mod schedule;
pub mod subscriber;
