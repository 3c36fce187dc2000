pub mod action;
pub mod builder;
pub mod config;
pub mod document;
pub mod dry_run;
pub mod error;
pub mod flows;
pub mod io;
pub mod outline;
pub mod paths;
pub mod validate;
pub mod value;

pub use error::{Result, ShortcutError};
