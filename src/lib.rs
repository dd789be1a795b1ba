pub mod clock;
pub mod config;
pub mod feeds;
pub mod filter;
pub mod pipeline;
pub mod twitter_message;
pub mod twitter_parser;
pub mod ui;
