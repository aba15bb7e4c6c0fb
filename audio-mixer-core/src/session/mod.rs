pub mod controller;
pub mod mixer_session;
pub mod output_sink;
pub mod processing;
