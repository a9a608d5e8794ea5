pub mod backend;
pub mod cache;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod event;
pub mod machine;
pub mod normalizer;
pub mod policy;
pub mod presentation;
pub mod simulator;

pub use controller::{Controller, InCallUi};
pub use event::{CallEvent, CallerInfo, ServiceState};
