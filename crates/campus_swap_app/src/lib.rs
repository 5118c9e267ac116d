//! Campus Swap front end: screen models, navigation guard, application
//! wiring and the `campus-swap` command line.

pub mod app;
pub mod cli;
pub mod router;
pub mod views;

pub use app::App;
pub use router::{Navigation, Route, Router};
