use crate::core::{Actor, ActorContext, Envelope};
use async_trait::async_trait;
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use std::fmt::Display;
use std::str::FromStr;
use LoggerMsg::*;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, TryFromPrimitive)]
#[repr(u8)]
pub enum LogLevel {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
  Fatal,
  Off,
}
impl LogLevel {
  pub const MIN: LogLevel = LogLevel::Trace;
}
impl Display for LogLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      LogLevel::Trace => "TRACE",
      LogLevel::Debug => "DEBUG",
      LogLevel::Info => "INFO",
      LogLevel::Warn => "WARN",
      LogLevel::Error => "ERROR",
      LogLevel::Fatal => "FATAL",
      LogLevel::Off => "OFF",
    };
    f.pad(s)
  }
}
impl FromStr for LogLevel {
  type Err = String;

  /// Accepts a level name in any case, or its numeric value.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "trace" => Ok(LogLevel::Trace),
      "debug" => Ok(LogLevel::Debug),
      "info" => Ok(LogLevel::Info),
      "warn" => Ok(LogLevel::Warn),
      "error" => Ok(LogLevel::Error),
      "fatal" => Ok(LogLevel::Fatal),
      "off" => Ok(LogLevel::Off),
      other => other
        .parse::<u8>()
        .ok()
        .and_then(|x| LogLevel::try_from(x).ok())
        .ok_or_else(|| format!("Unknown log level: {}", s)),
    }
  }
}

pub enum LoggerMsg {
  Log(LogLevel, Box<dyn ToString + Send + 'static>),
  SetLevel(LogLevel),
}

/// Prints log lines stamped with the node's clock. Each [`Node`](crate::core::Node) runs one.
pub struct Logger {
  level: LogLevel,
}
impl Logger {
  pub fn new(level: LogLevel) -> Self {
    Logger { level: level }
  }
}
#[async_trait]
impl<U: Envelope> Actor<U, LoggerMsg> for Logger {
  async fn recv(&mut self, ctx: &ActorContext<U, LoggerMsg>, msg: LoggerMsg) {
    match msg {
      Log(level, s) => {
        if level >= self.level {
          let now = ctx.node.now();
          let secs = now.as_secs();
          println!("{:>6}.{:03} {:<5} {}", secs, now.subsec_millis(), level, s.to_string());
        }
      }
      SetLevel(level) => self.level = level,
    }
  }
}

#[macro_export]
macro_rules! log {
  ($env_level:expr, $node:expr, $level:expr, $msg:expr) => {
    if $level >= $env_level {
      $node.log($crate::testkit::LoggerMsg::Log($level, ::std::boxed::Box::new($msg)));
    }
  };
}

#[macro_export]
macro_rules! trace {
  ($env_level:expr, $node:expr, $msg:expr) => {
    $crate::log!($env_level, $node, $crate::testkit::LogLevel::Trace, $msg)
  };
}

#[macro_export]
macro_rules! debug {
  ($env_level:expr, $node:expr, $msg:expr) => {
    $crate::log!($env_level, $node, $crate::testkit::LogLevel::Debug, $msg)
  };
}

#[macro_export]
macro_rules! info {
  ($env_level:expr, $node:expr, $msg:expr) => {
    $crate::log!($env_level, $node, $crate::testkit::LogLevel::Info, $msg)
  };
}

#[macro_export]
macro_rules! warn {
  ($env_level:expr, $node:expr, $msg:expr) => {
    $crate::log!($env_level, $node, $crate::testkit::LogLevel::Warn, $msg)
  };
}

#[macro_export]
macro_rules! error {
  ($env_level:expr, $node:expr, $msg:expr) => {
    $crate::log!($env_level, $node, $crate::testkit::LogLevel::Error, $msg)
  };
}

#[macro_export]
macro_rules! fatal {
  ($env_level:expr, $node:expr, $msg:expr) => {
    $crate::log!($env_level, $node, $crate::testkit::LogLevel::Fatal, $msg)
  };
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn levels_parse_by_name_and_number() {
    assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
    assert_eq!("1".parse::<LogLevel>(), Ok(LogLevel::Debug));
    assert!("7".parse::<LogLevel>().is_err());
    assert!(LogLevel::Error > LogLevel::Info);
  }
}
