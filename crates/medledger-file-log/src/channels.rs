use chrono::{NaiveDate, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use medledger_core::{observe, ChannelLogConfig, LogChannel, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Outcome of a retention pass over one or more channels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub archived: Vec<PathBuf>,
}

impl CleanupReport {
    fn merge(&mut self, other: CleanupReport) {
        self.deleted.extend(other.deleted);
        self.archived.extend(other.archived);
    }
}

struct ActiveFile {
    date: NaiveDate,
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Per-channel log files under one base directory.
///
/// Layout: `{base_dir}/{channel}/{channel}-YYYY-MM-DD.log` for the live file,
/// `.log.gz` for rotated ones, and `{archive_dir}/{channel}/` for expired
/// access-channel files.
pub struct ChannelLogs {
    config: ChannelLogConfig,
    active: Mutex<HashMap<LogChannel, ActiveFile>>,
}

impl ChannelLogs {
    /// Open the log directories, creating them if needed
    pub fn open(config: ChannelLogConfig) -> Result<Self> {
        for channel in LogChannel::ALL {
            std::fs::create_dir_all(config.channel_dir(channel))?;
        }
        Ok(Self {
            config,
            active: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ChannelLogConfig {
        &self.config
    }

    /// Path of a channel's live file for `date`
    pub fn log_path(&self, channel: LogChannel, date: NaiveDate) -> PathBuf {
        self.config.channel_dir(channel).join(format!(
            "{}-{}.log",
            channel.name(),
            date.format(DATE_FORMAT)
        ))
    }

    /// Append one line to the channel's file for today.
    ///
    /// Switches to a new file when the day changes, and rotates inline once
    /// the file reaches `max_file_size`.
    pub fn write_line(&self, channel: LogChannel, line: &str) -> Result<()> {
        let today = Utc::now().date_naive();
        let mut active = self.active.lock();

        let stale = active.get(&channel).map_or(false, |file| file.date != today);
        if stale {
            if let Some(mut file) = active.remove(&channel) {
                file.writer.flush()?;
            }
        }

        if !active.contains_key(&channel) {
            let path = self.log_path(channel, today);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            active.insert(
                channel,
                ActiveFile {
                    date: today,
                    path,
                    writer: BufWriter::new(file),
                },
            );
        }

        let oversized = match active.get_mut(&channel) {
            Some(file) => {
                file.writer.write_all(line.as_bytes())?;
                file.writer.write_all(b"\n")?;
                file.writer.flush()?;
                std::fs::metadata(&file.path)?.len() >= self.config.max_file_size
            }
            None => false,
        };

        if oversized {
            self.rotate_locked(channel, &mut active)?;
        }
        Ok(())
    }

    /// Flush every open channel file to disk
    pub fn flush(&self) -> Result<()> {
        let mut active = self.active.lock();
        for file in active.values_mut() {
            file.writer.flush()?;
            file.writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Live (uncompressed) files of a channel, oldest first
    fn live_files(&self, channel: LogChannel) -> Vec<(PathBuf, Option<NaiveDate>)> {
        let mut files: Vec<_> = WalkDir::new(self.config.channel_dir(channel))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "log"))
            .map(|entry| {
                let path = entry.into_path();
                let date = file_date(channel, &path);
                (path, date)
            })
            .collect();
        files.sort();
        files
    }

    /// Whether a channel has a live file from a prior day or one over the size limit
    pub fn should_rotate(&self, channel: LogChannel) -> Result<bool> {
        self.should_rotate_as_of(channel, Utc::now().date_naive())
    }

    pub fn should_rotate_as_of(&self, channel: LogChannel, today: NaiveDate) -> Result<bool> {
        for (path, date) in self.live_files(channel) {
            if date.map_or(true, |d| d < today) {
                return Ok(true);
            }
            if std::fs::metadata(&path)?.len() >= self.config.max_file_size {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Compress every live file of the channel and start fresh.
    ///
    /// Returns the compressed files. The next write opens a new live file.
    pub fn rotate_log(&self, channel: LogChannel) -> Result<Vec<PathBuf>> {
        let mut active = self.active.lock();
        self.rotate_locked(channel, &mut active)
    }

    /// Rotation body. Writers stay blocked on `active` until every live file
    /// has been compressed and removed.
    fn rotate_locked(
        &self,
        channel: LogChannel,
        active: &mut HashMap<LogChannel, ActiveFile>,
    ) -> Result<Vec<PathBuf>> {
        if let Some(mut file) = active.remove(&channel) {
            file.writer.flush()?;
        }

        let level = Compression::new(self.config.compression_level.min(9));
        let mut rotated = Vec::new();
        for (path, _) in self.live_files(channel) {
            let target = rotated_path(&path)?;
            compress_file(&path, &target, level)?;
            std::fs::remove_file(&path)?;
            tracing::info!(
                "Rotated {} log: {} -> {}",
                channel,
                path.display(),
                target.display()
            );
            observe::record_rotation(channel.name());
            rotated.push(target);
        }
        Ok(rotated)
    }

    /// Apply the channel's retention window to its rotated files.
    pub fn cleanup_old_logs(&self, channel: LogChannel) -> Result<CleanupReport> {
        self.cleanup_old_logs_as_of(channel, Utc::now().date_naive())
    }

    /// Retention pass relative to `today`.
    ///
    /// Files dated more than the channel's retention days before `today` are
    /// deleted; for the access channel they are moved to the archive instead.
    pub fn cleanup_old_logs_as_of(
        &self,
        channel: LogChannel,
        today: NaiveDate,
    ) -> Result<CleanupReport> {
        let cutoff = today - chrono::Duration::days(i64::from(self.config.retention_days(channel)));
        let mut report = CleanupReport::default();

        let expired: Vec<PathBuf> = WalkDir::new(self.config.channel_dir(channel))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".log.gz"))
            .map(|entry| entry.into_path())
            .filter(|path| file_date(channel, path).map_or(false, |d| d < cutoff))
            .collect();

        for path in expired {
            if channel.is_write_once() {
                let archive = self.config.archive_dir().join(channel.name());
                std::fs::create_dir_all(&archive)?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let target = unique_path(&archive, &name);
                std::fs::rename(&path, &target)?;
                tracing::info!("Archived {} log {}", channel, target.display());
                report.archived.push(target);
            } else {
                std::fs::remove_file(&path)?;
                tracing::info!("Deleted expired {} log {}", channel, path.display());
                report.deleted.push(path);
            }
        }
        Ok(report)
    }

    /// Rotate every channel that needs it
    pub fn rotate_all(&self) -> Result<Vec<PathBuf>> {
        let mut rotated = Vec::new();
        for channel in LogChannel::ALL {
            if self.should_rotate(channel)? {
                rotated.extend(self.rotate_log(channel)?);
            }
        }
        Ok(rotated)
    }

    pub fn cleanup_all(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        for channel in LogChannel::ALL {
            report.merge(self.cleanup_old_logs(channel)?);
        }
        Ok(report)
    }
}

impl Drop for ChannelLogs {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            eprintln!("Warning: Failed to flush channel logs on drop: {}", e);
        }
    }
}

/// Date encoded in `{channel}-YYYY-MM-DD...`
fn file_date(channel: LogChannel, path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(channel.name())?.strip_prefix('-')?;
    NaiveDate::parse_from_str(rest.get(..10)?, DATE_FORMAT).ok()
}

/// `x.log` -> `x.log.gz`, or `x-HHMMSS.log.gz` if that exists already
fn rotated_path(path: &Path) -> Result<PathBuf> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let plain = dir.join(format!("{}.log.gz", stem));
    if !plain.exists() {
        return Ok(plain);
    }
    let suffix = Utc::now().format("%H%M%S");
    Ok(unique_path(dir, &format!("{}-{}.log.gz", stem, suffix)))
}

/// `dir/name`, or `dir/name.N` for the first free N
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    (1u32..)
        .map(|n| dir.join(format!("{}.{}", name, n)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

fn compress_file(source: &Path, target: &Path, level: Compression) -> Result<()> {
    let mut input = File::open(source)?;
    let output = File::create(target)?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), level);
    std::io::copy(&mut input, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn setup() -> (ChannelLogs, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let logs = ChannelLogs::open(ChannelLogConfig::new(temp_dir.path().to_path_buf())).unwrap();
        (logs, temp_dir)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_write_goes_to_dated_file() {
        let (logs, _temp) = setup();
        logs.write_line(LogChannel::Request, "{\"a\":1}").unwrap();
        logs.write_line(LogChannel::Request, "{\"a\":2}").unwrap();

        let path = logs.log_path(LogChannel::Request, Utc::now().date_naive());
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn test_should_rotate_on_prior_date() {
        let (logs, _temp) = setup();
        assert!(!logs.should_rotate(LogChannel::Model).unwrap());

        std::fs::write(logs.log_path(LogChannel::Model, day(2026, 1, 1)), "old\n").unwrap();
        assert!(logs.should_rotate_as_of(LogChannel::Model, day(2026, 1, 2)).unwrap());
        assert!(!logs.should_rotate_as_of(LogChannel::Model, day(2026, 1, 1)).unwrap());
    }

    #[test]
    fn test_rotate_compresses_and_disambiguates() {
        let (logs, _temp) = setup();
        logs.write_line(LogChannel::Storage, "first").unwrap();
        let first = logs.rotate_log(LogChannel::Storage).unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].to_string_lossy().ends_with(".log.gz"));

        let mut text = String::new();
        GzDecoder::new(File::open(&first[0]).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "first\n");

        logs.write_line(LogChannel::Storage, "second").unwrap();
        let second = logs.rotate_log(LogChannel::Storage).unwrap();
        assert_eq!(second.len(), 1);
        assert_ne!(first[0], second[0]);
        assert!(first[0].exists());
    }

    #[test]
    fn test_size_triggers_inline_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let config = ChannelLogConfig::new(temp_dir.path().to_path_buf()).with_max_file_size(16);
        let logs = ChannelLogs::open(config).unwrap();

        logs.write_line(LogChannel::Request, "0123456789abcdef").unwrap();
        let gz = std::fs::read_dir(logs.config().channel_dir(LogChannel::Request))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".gz"))
            .count();
        assert_eq!(gz, 1);
    }

    #[test]
    fn test_file_date_parsing() {
        let path = PathBuf::from("/x/access-2026-02-03-101010.log.gz");
        assert_eq!(file_date(LogChannel::Access, &path), Some(day(2026, 2, 3)));
        assert_eq!(file_date(LogChannel::Request, &path), None);
    }

    fn count_lines(dir: &Path) -> usize {
        let mut total = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            let mut text = String::new();
            if name.contains(".log.gz") {
                GzDecoder::new(File::open(&path).unwrap())
                    .read_to_string(&mut text)
                    .unwrap();
            } else if name.ends_with(".log") {
                File::open(&path).unwrap().read_to_string(&mut text).unwrap();
            }
            total += text.lines().count();
        }
        total
    }

    #[test]
    fn test_rotation_during_writes_keeps_every_line() {
        let (logs, _temp) = setup();
        let logs = std::sync::Arc::new(logs);

        let writer = {
            let logs = logs.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    logs.write_line(LogChannel::Access, &format!("line {}", i)).unwrap();
                }
            })
        };
        for _ in 0..20 {
            logs.rotate_log(LogChannel::Access).unwrap();
        }
        writer.join().unwrap();
        logs.flush().unwrap();

        assert_eq!(count_lines(&logs.config().channel_dir(LogChannel::Access)), 2000);
    }
}
