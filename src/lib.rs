pub mod config;
pub mod coordination;
pub mod db;
pub mod engine;
pub mod matches;
pub mod notify;
pub mod realtime;
pub mod server;
pub mod timers;
pub mod tokio_tools;
pub mod wallet;

#[cfg(test)]
pub mod test_utils;
