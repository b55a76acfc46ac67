pub mod env;
mod failure_config;
mod harness;
mod infrastructure;
mod logging;

#[rustfmt::skip]
pub use {
  failure_config::FailureConfig,
  failure_config::FailureConfigMap,
  failure_config::FailureMode,
  harness::Harness,
  harness::HarnessError,
  harness::BROKER_HOST,
  infrastructure::SimulatedInfrastructure,
  logging::Logger,
  logging::LoggerMsg,
  logging::LogLevel,
};
