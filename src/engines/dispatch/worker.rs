//! Execute-node side of a job: run the evaluated program, read the
//! objective it produced and report it to the coordinator.

use crate::engines::dispatch::listener::ResultSender;
use crate::error::{GridGaError, Result};
use crate::types::{JobDescription, JobEnvelope, ResultEnvelope, ResultRecord};
use std::path::Path;
use std::process::Command;

/// Captures the evaluated program's output
pub const STDOUT_FILE: &str = "std.out";
/// First line holds the objective value
pub const OBJECTIVE_FILE: &str = "obj.out";

pub fn load_job(path: &Path) -> Result<JobDescription> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        GridGaError::Configuration(format!("Cannot read job file {}: {}", path.display(), e))
    })?;
    let envelope: JobEnvelope = serde_json::from_str(&contents)?;
    Ok(envelope.config)
}

/// Name of this machine as reported with results.
pub fn compute_host() -> String {
    if let Ok(host) = std::env::var("HOSTNAME") {
        if !host.trim().is_empty() {
            return host.trim().to_string();
        }
    }
    Command::new("hostname")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn run_shell(command: &str, work_dir: &Path) -> Result<()> {
    log::info!("Executing {}", command);
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(work_dir)
        .status()?;
    if !status.success() {
        log::warn!("{} exited with {}", command, status);
    }
    Ok(())
}

/// Run the job in `work_dir` and build the result to send back.
///
/// Failures never abort: they are turned into a result with objective -1
/// and an `error` message so the coordinator hears about them.
pub fn run_job(job: &JobDescription, work_dir: &Path, host: &str) -> ResultRecord {
    let failure = |reason: String| {
        log::error!("Genome {}: {}", job.genome_id, reason);
        ResultRecord::failure(job.genome_id, reason, Some(host.to_string()))
    };

    if job.execute.trim().is_empty() {
        return failure("execute command has not been supplied".to_string());
    }

    if let Err(e) = run_shell(&format!("{} > {} 2>&1", job.execute, STDOUT_FILE), work_dir) {
        return failure(format!("Cannot run execute command: {}", e));
    }

    if let Some(extract) = job.extract_obj_value.as_deref().filter(|s| !s.trim().is_empty()) {
        if let Err(e) = run_shell(&format!("{} > {} 2>&1", extract, OBJECTIVE_FILE), work_dir) {
            return failure(format!("Cannot run objective extraction: {}", e));
        }
    }

    let objective_path = work_dir.join(OBJECTIVE_FILE);
    let contents = match std::fs::read_to_string(&objective_path) {
        Ok(contents) => contents,
        Err(_) => {
            return failure(format!(
                "Could not find the value of the objective function ({})",
                OBJECTIVE_FILE
            ))
        }
    };

    let first_line = contents.lines().next().unwrap_or("").trim();
    match first_line.parse::<f64>() {
        Ok(objective) if objective.is_finite() => {
            ResultRecord::success(job.genome_id, objective, host)
        }
        _ => failure(format!("Objective value {:?} is not a number", first_line)),
    }
}

/// Deliver a result to the server named in the job description.
pub fn report(job: &JobDescription, record: ResultRecord) -> Result<()> {
    let sender = ResultSender::new(&job.server);
    log::info!("Reporting genome {} to {}", job.genome_id, sender.address());
    sender.send(&ResultEnvelope { results: record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenomeId;

    fn job(execute: &str, extract: Option<&str>) -> JobDescription {
        JobDescription {
            execute: execute.to_string(),
            extract_obj_value: extract.map(str::to_string),
            server: "localhost:55566".to_string(),
            genome_id: GenomeId(3001),
        }
    }

    #[test]
    fn test_objective_from_extract_command() {
        let dir = tempfile::tempdir().unwrap();
        let record = run_job(
            &job("echo 'accuracy 0.87'", Some("cut -d' ' -f2 std.out")),
            dir.path(),
            "node7",
        );
        assert_eq!(record, ResultRecord::success(GenomeId(3001), 0.87, "node7"));
        assert!(dir.path().join(STDOUT_FILE).exists());
    }

    #[test]
    fn test_program_may_write_objective_itself() {
        let dir = tempfile::tempdir().unwrap();
        let record = run_job(&job("printf '1.5\\nignored\\n' > obj.out", None), dir.path(), "node7");
        assert_eq!(record.objective, 1.5);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_missing_objective_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let record = run_job(&job("true", None), dir.path(), "node7");
        assert_eq!(record.objective, -1.0);
        assert!(record.error.unwrap().contains("obj.out"));
    }

    #[test]
    fn test_unparseable_objective_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let record = run_job(&job("echo nan-ish > obj.out", None), dir.path(), "node7");
        assert_eq!(record.objective, -1.0);
        assert!(record.error.is_some());
        assert_eq!(record.compute_host.as_deref(), Some("node7"));
    }

    #[test]
    fn test_empty_execute_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let record = run_job(&job("  ", None), dir.path(), "node7");
        assert!(record.error.unwrap().contains("execute"));
    }

    #[test]
    fn test_load_job_reads_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("3001_job.json");
        std::fs::write(
            &path,
            r#"{"config": {"execute": "svm-train --c 4", "server": "head:55566", "genome-id": 3001}}"#,
        )
        .unwrap();

        let job = load_job(&path).unwrap();
        assert_eq!(job.genome_id, GenomeId(3001));
        assert_eq!(job.extract_obj_value, None);
        assert!(load_job(&dir.path().join("missing.json")).is_err());
    }
}
