pub mod alerts;
pub mod analytics;
pub mod config;
pub mod feed;
pub mod fetch;
pub mod legacy;
pub mod monitor;
pub mod notify;
pub mod observation;
pub mod output;
pub mod store;
