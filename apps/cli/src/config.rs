// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Job file to run.
    pub job: Option<PathBuf>,
    /// Report destination, stdout when unset.
    pub output: Option<PathBuf>,
    /// Override the job's self-intersection check.
    pub check_intersections: Option<bool>,
    /// Include triangle buffers in the report.
    pub include_mesh: bool,
    /// Number of worker threads for parallel processing.
    pub worker_threads: usize,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            job: var("CADHY_JOB").filter(|s| !s.is_empty()).map(PathBuf::from),
            output: var("CADHY_OUTPUT").filter(|s| !s.is_empty()).map(PathBuf::from),
            check_intersections: var("CADHY_CHECK_INTERSECTIONS").and_then(|v| parse_flag(&v)),
            include_mesh: var("CADHY_INCLUDE_MESH")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            worker_threads: var("CADHY_WORKER_THREADS")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or_else(num_cpus::get),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert!(config.job.is_none());
        assert!(config.output.is_none());
        assert!(config.check_intersections.is_none());
        assert!(!config.include_mesh);
        assert!(config.worker_threads > 0);
    }

    #[test]
    fn test_values() {
        let config = Config::from_lookup(lookup(&[
            ("CADHY_JOB", "job.json"),
            ("CADHY_OUTPUT", "out.json"),
            ("CADHY_CHECK_INTERSECTIONS", "off"),
            ("CADHY_INCLUDE_MESH", "1"),
            ("CADHY_WORKER_THREADS", "3"),
        ]));
        assert_eq!(config.job, Some(PathBuf::from("job.json")));
        assert_eq!(config.output, Some(PathBuf::from("out.json")));
        assert_eq!(config.check_intersections, Some(false));
        assert!(config.include_mesh);
        assert_eq!(config.worker_threads, 3);
    }

    #[test]
    fn test_bad_thread_count_falls_back() {
        let config = Config::from_lookup(lookup(&[("CADHY_WORKER_THREADS", "0")]));
        assert_eq!(config.worker_threads, num_cpus::get());
    }
}
