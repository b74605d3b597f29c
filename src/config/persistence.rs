//! Results persistence module
//!
//! Handles saving, loading, and rotation of suite results.

use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::{XopsError, Result, APP_NAME, RESULTS_FILE, MAX_RESULTS_HISTORY};
use crate::models::result::BenchmarkResult;

/// Results storage manager
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

/// Results file structure for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    results: Vec<BenchmarkResult>,
}

impl ResultsStorage {
    /// Storage at the standard data location
    pub fn new() -> Result<Self> {
        Ok(Self::at(Self::results_file_path()?))
    }

    /// Storage at an explicit path
    pub fn at(results_path: impl Into<PathBuf>) -> Self {
        Self { results_path: results_path.into() }
    }

    /// Uses $DATA_HOME/xops/results.json
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| XopsError::PersistenceError(
                "Unable to determine data directory".to_string()
            ))?;

        Ok(data_dir.join(APP_NAME).join(RESULTS_FILE))
    }

    /// Load all results, oldest first
    pub fn load_results(&self) -> Result<Vec<BenchmarkResult>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path)
            .map_err(|e| XopsError::PersistenceError(
                format!("Failed to read results file {}: {}", self.results_path.display(), e)
            ))?;

        let results_file: ResultsFile = serde_json::from_str(&content)
            .map_err(|e| XopsError::PersistenceError(
                format!("Failed to parse results file {}: {}", self.results_path.display(), e)
            ))?;

        Ok(results_file.results)
    }

    /// Append one result, keeping at most MAX_RESULTS_HISTORY entries
    pub fn append_result(&self, result: BenchmarkResult) -> Result<()> {
        self.append_results(vec![result])
    }

    /// Append a batch of results, keeping at most MAX_RESULTS_HISTORY entries
    pub fn append_results(&self, new_results: Vec<BenchmarkResult>) -> Result<()> {
        let mut results = self.load_results()?;
        results.extend(new_results);

        if results.len() > MAX_RESULTS_HISTORY {
            let excess = results.len() - MAX_RESULTS_HISTORY;
            results.drain(..excess);
            debug!(dropped = excess, "rotated results history");
        }

        self.save_results(results)
    }

    fn save_results(&self, results: Vec<BenchmarkResult>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| XopsError::PersistenceError(
                    format!("Failed to create results directory {}: {}", parent.display(), e)
                ))?;
        }

        let results_file = ResultsFile {
            version: 1,
            results,
        };

        let content = serde_json::to_string_pretty(&results_file)?;

        fs::write(&self.results_path, content)
            .map_err(|e| XopsError::PersistenceError(
                format!("Failed to write results file {}: {}", self.results_path.display(), e)
            ))?;

        Ok(())
    }

    pub fn count_results(&self) -> Result<usize> {
        Ok(self.load_results()?.len())
    }

    pub fn clear_results(&self) -> Result<()> {
        if self.results_path.exists() {
            fs::remove_file(&self.results_path)
                .map_err(|e| XopsError::PersistenceError(
                    format!("Failed to remove results file {}: {}", self.results_path.display(), e)
                ))?;
        }
        Ok(())
    }

    /// The most recent `count` results, oldest first
    pub fn get_recent_results(&self, count: usize) -> Result<Vec<BenchmarkResult>> {
        let mut results = self.load_results()?;
        let excess = results.len().saturating_sub(count);
        results.drain(..excess);
        Ok(results)
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::bench::kernel::Kernel;
    use crate::models::result::{RunMode, SystemInfo, ThroughputMetrics};
    use tempfile::TempDir;

    fn create_test_result(iterations: u64) -> BenchmarkResult {
        BenchmarkResult::with_system_info(
            Kernel::Int64,
            RunMode::MultiThread,
            4,
            iterations,
            vec![ThroughputMetrics::new(Duration::from_millis(250), 12.0, 11.5)],
            SystemInfo::default(),
        )
    }

    fn temp_storage(temp_dir: &TempDir) -> ResultsStorage {
        ResultsStorage::at(temp_dir.path().join("results.json"))
    }

    #[test]
    fn test_results_storage_new() {
        let storage = ResultsStorage::new();
        assert!(storage.is_ok());
        assert!(storage.unwrap().results_path().ends_with("xops/results.json"));
    }

    #[test]
    fn test_load_empty_results() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_storage(&temp_dir);
        assert!(storage.load_results().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_load_result() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_storage(&temp_dir);

        storage.append_result(create_test_result(42)).unwrap();

        let results = storage.load_results().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].iterations, 42);
        assert_eq!(results[0].average.gops, 12.0);
    }

    #[test]
    fn test_results_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_storage(&temp_dir);

        let batch: Vec<_> = (0..MAX_RESULTS_HISTORY + 10)
            .map(|i| create_test_result(i as u64))
            .collect();
        storage.append_results(batch).unwrap();

        let results = storage.load_results().unwrap();
        assert_eq!(results.len(), MAX_RESULTS_HISTORY);
        assert_eq!(results[0].iterations, 10);
        assert_eq!(results[results.len() - 1].iterations, (MAX_RESULTS_HISTORY + 10 - 1) as u64);
    }

    #[test]
    fn test_count_and_clear_results() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_storage(&temp_dir);
        assert_eq!(storage.count_results().unwrap(), 0);

        for i in 0..3 {
            storage.append_result(create_test_result(i)).unwrap();
        }
        assert_eq!(storage.count_results().unwrap(), 3);

        storage.clear_results().unwrap();
        assert_eq!(storage.count_results().unwrap(), 0);
        // Clearing twice is fine
        storage.clear_results().unwrap();
    }

    #[test]
    fn test_get_recent_results() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_storage(&temp_dir);

        for i in 0..10 {
            storage.append_result(create_test_result(i)).unwrap();
        }

        let recent = storage.get_recent_results(5).unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].iterations, 5);
        assert_eq!(recent[4].iterations, 9);

        assert_eq!(storage.get_recent_results(20).unwrap().len(), 10);
    }

    #[test]
    fn test_results_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_storage(&temp_dir);
        storage.append_result(create_test_result(1)).unwrap();

        let content = fs::read_to_string(storage.results_path()).unwrap();
        let results_file: ResultsFile = serde_json::from_str(&content).unwrap();
        assert_eq!(results_file.version, 1);
        assert_eq!(results_file.results.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_storage(&temp_dir);
        fs::write(storage.results_path(), "{ not json").unwrap();
        assert!(matches!(storage.load_results(), Err(XopsError::PersistenceError(_))));
    }
}
