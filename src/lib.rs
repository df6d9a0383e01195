// Library for tests to access modules

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod prober;
pub mod queue;
pub mod renderer;
pub mod scheduler;
pub mod terminal;
pub mod version;
