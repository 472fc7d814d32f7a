pub mod config;
pub mod dag;
pub mod fetch;
pub mod gcp;
pub mod ingest;
pub mod load;
pub mod logging;
pub mod setup;
pub mod table;
