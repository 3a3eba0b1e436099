//! Text sinks for run progress and warnings.

use std::fs::File;
use std::io::Write;
use std::sync::Mutex;

use crate::error::Result;
use crate::paths::Path;
use crate::settings::{LoggerEnum, RunSettings, RunSettingsId};
use crate::stats::{StatisticsId, Statistics};

/// Sink of log lines. Writes are serialized; implementations must be
/// callable from any thread.
pub trait Logger: Send + Sync {
    fn write_line(&self, message: &str);

    fn warning(&self, message: &str) {
        self.write_line(&format!("WARNING: {}", message));
    }
}

/// Logger printing to standard output.
pub struct StdOutLogger;

impl Logger for StdOutLogger {
    fn write_line(&self, message: &str) {
        println!("{}", message);
    }
}

/// Logger discarding everything.
pub struct NullLogger;

impl Logger for NullLogger {
    fn write_line(&self, _message: &str) {}
}

/// Logger appending lines to a file.
pub struct FileLogger {
    file: Mutex<File>,
}

impl FileLogger {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.to_std().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path.to_std())?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Logger for FileLogger {
    fn write_line(&self, message: &str) {
        let mut file = self.file.lock().unwrap();
        // failed log writes are not fatal, the run continues
        let _ = writeln!(file, "{}", message);
    }
}

pub fn create_logger(settings: &RunSettings) -> Result<Box<dyn Logger>> {
    match settings.get::<LoggerEnum>(RunSettingsId::RunLogger)? {
        LoggerEnum::None => Ok(Box::new(NullLogger)),
        LoggerEnum::Stdout => Ok(Box::new(StdOutLogger)),
        LoggerEnum::File => {
            let dir = Path::new(&settings.get::<String>(RunSettingsId::RunOutputPath)?);
            let name = Path::new(&settings.get::<String>(RunSettingsId::RunLoggerFile)?);
            Ok(Box::new(FileLogger::create(&(dir / name))?))
        }
    }
}

/// Writes the one-line per-step summary: time, timestep, the limiting
/// criterion and particle counts.
pub fn log_step(logger: &dyn Logger, stats: &Statistics) {
    let time = stats.get_float(StatisticsId::RunTime).unwrap_or(0.);
    let dt = stats.get_float(StatisticsId::Timestep).unwrap_or(0.);
    let mut line = format!("t = {:.6e}  dt = {:.6e}", time, dt);
    if let Some(criterion) = stats.get_criterion(StatisticsId::TimestepCriterion) {
        line.push_str(&format!("  ({})", criterion));
    }
    if let Some(particles) = stats.get_int(StatisticsId::ParticleCount) {
        line.push_str(&format!("  N = {}", particles));
    }
    if let Some(collisions) = stats.get_int(StatisticsId::CollisionCount) {
        if collisions > 0 {
            line.push_str(&format!("  collisions = {}", collisions));
        }
    }
    logger.write_line(&line);
}
