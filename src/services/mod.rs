pub mod dispatcher;
pub mod processor;
pub mod sweeper;
pub mod templates;
pub mod tracker;
