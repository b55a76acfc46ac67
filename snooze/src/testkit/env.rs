use crate::testkit::LogLevel;
use once_cell::sync::Lazy;
use std::env::var;
use std::time::Duration;

pub static PACKET_DROP: Lazy<f64> = Lazy::new(|| {
  var("SNOOZE_PACKET_DROP")
    .map(|x| x.parse().ok())
    .ok()
    .flatten()
    .filter(|p: &f64| (0.0..=1.0).contains(p))
    .unwrap_or(0.0)
});

pub static DELAY: Lazy<Option<(Duration, Duration)>> = Lazy::new(|| {
  var("SNOOZE_MIN_DELAY")
    .map(|x| x.parse().ok().map(Duration::from_millis))
    .ok()
    .flatten()
    .zip(
      var("SNOOZE_MAX_DELAY")
        .map(|x| x.parse().ok().map(Duration::from_millis))
        .ok()
        .flatten(),
    )
    .filter(|(x, y)| x <= y)
});

pub static LOG_LEVEL: Lazy<LogLevel> = Lazy::new(|| {
  var("SNOOZE_LOG_LEVEL")
    .ok()
    .and_then(|x| x.parse().ok())
    .unwrap_or(LogLevel::Warn)
});
