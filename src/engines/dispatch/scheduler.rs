use crate::engines::dispatch::job::JobFiles;
use crate::error::{GridGaError, Result};
use crate::types::ClusterId;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Batch submission to a cluster.
pub trait Scheduler {
    /// Submit one job per entry of `jobs`. Returns the cluster id when the
    /// scheduler reported one.
    fn submit(&mut self, generation: u64, jobs: &[JobFiles], dir: &Path) -> Result<Option<ClusterId>>;

    /// Ask the cluster to drop whatever is left of a batch. Does not wait.
    fn remove(&mut self, cluster: ClusterId);
}

/// HTCondor through `condor_submit` and `condor_rm`.
#[derive(Debug, Clone)]
pub struct HtCondor {
    files_dir: PathBuf,
    wrapper: String,
    submit_command: Vec<String>,
    remove_command: Vec<String>,
}

impl HtCondor {
    pub fn new(files_dir: impl Into<PathBuf>, wrapper: impl Into<String>) -> Self {
        Self {
            files_dir: files_dir.into(),
            wrapper: wrapper.into(),
            submit_command: vec!["condor_submit".to_string()],
            remove_command: vec!["condor_rm".to_string()],
        }
    }

    /// Replace `condor_submit` and `condor_rm`. Each command is a program
    /// followed by leading arguments; the submit file or cluster id is
    /// appended.
    pub fn with_commands(mut self, submit: Vec<String>, remove: Vec<String>) -> Self {
        if !submit.is_empty() {
            self.submit_command = submit;
        }
        if !remove.is_empty() {
            self.remove_command = remove;
        }
        self
    }

    fn command(parts: &[String]) -> Command {
        let mut command = Command::new(&parts[0]);
        command.args(&parts[1..]);
        command
    }

    pub fn submit_file_path(&self, generation: u64) -> PathBuf {
        self.files_dir.join(format!("generation-{}.submit", generation))
    }

    pub fn log_file_path(&self, generation: u64) -> PathBuf {
        self.files_dir
            .join(format!("genetic-algo.condor.{}.log", generation))
    }

    pub fn write_submit_file(&self, generation: u64, jobs: &[JobFiles], dir: &Path) -> Result<PathBuf> {
        let mut lines = vec![
            "Universe = vanilla".to_string(),
            format!("Executable = {}", self.wrapper),
            format!("Log = {}", self.log_file_path(generation).display()),
            "should_transfer_files = YES".to_string(),
            "when_to_transfer_output = ON_EXIT".to_string(),
        ];

        for job in jobs {
            let description = job
                .description
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let inputs = job
                .input_files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(",");

            lines.push(String::new());
            lines.push(format!("Arguments = {}", description));
            lines.push(format!("Output = {}", dir.join(format!("{}.out", job.genome_id)).display()));
            lines.push(format!("Error = {}", dir.join(format!("{}.err", job.genome_id)).display()));
            lines.push(format!("transfer_input_files = {}", inputs));
            lines.push("Queue".to_string());
        }

        let mut submit = lines.join("\n");
        submit.push('\n');

        let path = self.submit_file_path(generation);
        std::fs::write(&path, submit)?;
        Ok(path)
    }
}

/// Cluster id from `condor_submit` output such as
/// `5 job(s) submitted to cluster 1234.`
pub fn parse_submit_output(stdout: &str) -> Option<ClusterId> {
    const MARKER: &str = "submitted to cluster";
    let start = stdout.find(MARKER)? + MARKER.len();
    let digits: String = stdout[start..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().map(ClusterId)
}

/// Cluster id from the first `(1234.000.000)` token of a user log.
pub fn parse_user_log(log: &str) -> Option<ClusterId> {
    log.split_whitespace()
        .filter_map(|token| token.strip_prefix('('))
        .find_map(|token| token.split('.').next()?.parse().ok())
        .map(ClusterId)
}

impl Scheduler for HtCondor {
    fn submit(&mut self, generation: u64, jobs: &[JobFiles], dir: &Path) -> Result<Option<ClusterId>> {
        let submit_file = self.write_submit_file(generation, jobs, dir)?;
        let program = self.submit_command.join(" ");
        log::info!("Executing {} {}", program, submit_file.display());

        let output = Self::command(&self.submit_command)
            .arg(&submit_file)
            .current_dir(&self.files_dir)
            .output()
            .map_err(|e| {
                GridGaError::Submission(format!("Cannot run {}: {}", program, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(GridGaError::Submission(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let cluster = parse_submit_output(&stdout).or_else(|| {
            std::fs::read_to_string(self.log_file_path(generation))
                .ok()
                .and_then(|log| parse_user_log(&log))
        });
        match cluster {
            Some(cluster) => log::info!("Submitted {} jobs to cluster {}", jobs.len(), cluster),
            None => log::warn!("Submitted {} jobs but no cluster id was reported", jobs.len()),
        }
        Ok(cluster)
    }

    fn remove(&mut self, cluster: ClusterId) {
        log::info!("Removing remaining jobs of cluster {}", cluster);
        let program = self.remove_command.join(" ");
        let spawned = Self::command(&self.remove_command)
            .arg(cluster.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                std::thread::spawn(move || match child.wait() {
                    Ok(status) if !status.success() => {
                        log::warn!("{} {} exited with {}", program, cluster, status)
                    }
                    Err(e) => log::warn!("{} {} failed: {}", program, cluster, e),
                    Ok(_) => {}
                });
            }
            Err(e) => log::warn!("Cannot run {}: {}", program, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenomeId;

    #[test]
    fn test_parse_submit_output() {
        let stdout = "Submitting job(s).....\n5 job(s) submitted to cluster 1234.\n";
        assert_eq!(parse_submit_output(stdout), Some(ClusterId(1234)));
        assert_eq!(parse_submit_output("nothing here"), None);
    }

    #[test]
    fn test_parse_user_log() {
        let log = "000 (087.000.000) 05/12 10:00:00 Job submitted from host: <10.0.0.1:9618>\n";
        assert_eq!(parse_user_log(log), Some(ClusterId(87)));
        assert_eq!(parse_user_log("no ids"), None);
    }

    #[test]
    fn test_submit_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let generation_dir = dir.path().join("generation-2");
        std::fs::create_dir_all(&generation_dir).unwrap();
        let condor = HtCondor::new(dir.path(), "gridga-job-wrapper");

        let jobs = vec![JobFiles {
            genome_id: GenomeId(2001),
            description: generation_dir.join("2001_job.json"),
            input_files: vec![generation_dir.join("2001_job.json"), dir.path().join("data.txt")],
        }];
        let path = condor.write_submit_file(2, &jobs, &generation_dir).unwrap();
        assert_eq!(path, dir.path().join("generation-2.submit"));

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("Universe = vanilla\nExecutable = gridga-job-wrapper\n"));
        assert!(text.contains("Arguments = 2001_job.json\n"));
        assert!(text.contains(&format!(
            "transfer_input_files = {},{}\n",
            generation_dir.join("2001_job.json").display(),
            dir.path().join("data.txt").display()
        )));
        assert_eq!(text.matches("Queue").count(), 1);
        assert!(text.contains("when_to_transfer_output = ON_EXIT\n\nArguments = "));
        assert!(text.ends_with("\nQueue\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_submit_runs_program_and_reads_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake_submit.sh");
        std::fs::write(&script, "echo \"1 job(s) submitted to cluster 42.\"\n").unwrap();

        let mut condor = HtCondor::new(dir.path(), "gridga-job-wrapper").with_commands(
            vec!["sh".to_string(), script.display().to_string()],
            vec!["true".to_string()],
        );
        let cluster = condor.submit(1, &[], dir.path()).unwrap();
        assert_eq!(cluster, Some(ClusterId(42)));
    }

    #[test]
    fn test_missing_submit_program_is_submission_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut condor = HtCondor::new(dir.path(), "gridga-job-wrapper")
            .with_commands(
                vec!["gridga-no-such-program".to_string()],
                vec!["gridga-no-such-program".to_string()],
            );
        assert!(matches!(
            condor.submit(1, &[], dir.path()),
            Err(GridGaError::Submission(_))
        ));
        // Must not panic or block
        condor.remove(ClusterId(1));
    }
}
