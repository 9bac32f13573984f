pub mod auth_cmd;
pub mod bookmark;
pub mod common;
pub mod completions;
pub mod config;
pub mod device;
pub mod note;
pub mod position;
pub mod setting;
pub mod status;
pub mod sync;
