pub mod config;
pub mod get;
pub mod resources;
pub mod run;
