//! Distribution layer
//!
//! Pushes run artifacts (rankfile, hostfile) to every host and launches the
//! parallel workload from a master host.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::remote::{shell_quote, CommandOutput, RemoteExec};
use crate::Result;

/// A named text file to place on every host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// File name inside the scratch directory
    pub file_name: String,
    /// Full file contents
    pub contents: String,
}

impl Artifact {
    /// Artifact with the given file name and contents.
    #[must_use]
    pub fn new(file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }
}

/// Where artifacts go and what gets launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSettings {
    /// Scratch directory on every host
    pub scratch_dir: String,
    /// Parallel launcher binary
    pub launcher: String,
    /// Workload binary run by every rank
    pub workload: String,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            scratch_dir: "/tmp/mpi_experiment".to_string(),
            launcher: "mpirun".to_string(),
            workload: "/usr/bin/mpi_hello".to_string(),
        }
    }
}

impl DistributionSettings {
    /// Remote path of an artifact.
    #[must_use]
    pub fn remote_path(&self, file_name: &str) -> String {
        format!("{}/{file_name}", self.scratch_dir.trim_end_matches('/'))
    }

    /// Launch command for `process_count` ranks placed by `rankfile_path`.
    ///
    /// The launcher itself ssh-es from the master to the other hosts, so
    /// host-key checking is disabled for those nested connections too.
    #[must_use]
    pub fn launch_command(&self, process_count: usize, rankfile_path: &str) -> String {
        let rsh_agent = "ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null";
        format!(
            "OMPI_MCA_plm_rsh_agent='{rsh_agent}' {} -np {process_count} --rankfile {} {}",
            self.launcher,
            shell_quote(rankfile_path),
            self.workload
        )
    }
}

/// Pushes artifacts and runs the workload over [`RemoteExec`] sessions.
pub struct Distributor {
    remote: Arc<dyn RemoteExec>,
    settings: DistributionSettings,
}

impl Distributor {
    /// Distributor over the given remote client.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteExec>, settings: DistributionSettings) -> Self {
        Self { remote, settings }
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &DistributionSettings {
        &self.settings
    }

    /// Write every artifact to every host, one host at a time.
    ///
    /// Returns the remote paths, in artifact order.
    ///
    /// # Errors
    ///
    /// The first failing host aborts the whole call; hosts already written
    /// are left as they are.
    pub async fn distribute(&self, hosts: &[String], artifacts: &[Artifact]) -> Result<Vec<String>> {
        let paths: Vec<String> = artifacts
            .iter()
            .map(|a| self.settings.remote_path(&a.file_name))
            .collect();

        for host in hosts {
            let session = self.remote.open(host).await?;
            session.ensure_dir(&self.settings.scratch_dir).await?;
            for (artifact, path) in artifacts.iter().zip(&paths) {
                session.write_file(path, &artifact.contents).await?;
            }
            tracing::info!(host = %host, files = artifacts.len(), "artifacts distributed");
        }

        Ok(paths)
    }

    /// Launch the workload from `master` and capture its output.
    ///
    /// Non-zero exit of the workload is not an error; the output is
    /// returned as captured.
    ///
    /// # Errors
    ///
    /// Fails only if the session to `master` cannot be opened or the
    /// command cannot be run at all.
    pub async fn execute(&self, master: &str, process_count: usize, rankfile_path: &str) -> Result<CommandOutput> {
        let session = self.remote.open(master).await?;
        let command = self.settings.launch_command(process_count, rankfile_path);
        tracing::info!(master, process_count, "launching workload");
        let output = session.exec(&command).await?;
        tracing::info!(master, exit_code = ?output.exit_code, "workload finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path() {
        let settings = DistributionSettings::default();
        assert_eq!(settings.remote_path("rankfile"), "/tmp/mpi_experiment/rankfile");

        let trailing = DistributionSettings {
            scratch_dir: "/scratch/".to_string(),
            ..DistributionSettings::default()
        };
        assert_eq!(trailing.remote_path("hostfile"), "/scratch/hostfile");
    }

    #[test]
    fn test_launch_command() {
        let cmd = DistributionSettings::default().launch_command(3, "/tmp/mpi_experiment/rankfile");
        assert_eq!(
            cmd,
            "OMPI_MCA_plm_rsh_agent='ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null' \
             mpirun -np 3 --rankfile '/tmp/mpi_experiment/rankfile' /usr/bin/mpi_hello"
        );
    }
}
