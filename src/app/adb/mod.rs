pub mod apk;
pub mod apps;
pub mod client;
pub mod install;
pub mod locator;
pub mod parse;
pub mod paths;
pub mod runner;
pub mod screenshot;
pub mod serial_lock;
pub mod wireless;
