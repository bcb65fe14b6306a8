pub mod apps;
pub mod bridge;
pub mod locator;
pub mod parse;
pub mod runner;
