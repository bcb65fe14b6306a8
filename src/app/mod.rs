pub mod adb;
pub mod catalog;
pub mod config;
pub mod console;
pub mod devices;
pub mod error;
pub mod logging;
pub mod models;
pub mod notify;
pub mod state;
pub mod uninstall;
