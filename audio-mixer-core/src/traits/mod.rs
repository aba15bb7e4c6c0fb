pub mod capture_provider;
pub mod device_backend;
pub mod echo_strategy;
pub mod output_device;
pub mod sample_source;
pub mod session_delegate;
