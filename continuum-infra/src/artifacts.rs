//! Writing generated artifacts to the output directory.
//!
//! Files from a previous run are removed first, so the directory always
//! reflects exactly one generation.

use crate::ProvisionError;
use continuum_core::NodeArtifacts;
use continuum_types::MachineAssignment;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Summary of the placed testbed, written next to the per-VM artifacts.
pub const MACHINES_FILE: &str = "machines.json";

fn is_artifact(name: &str) -> bool {
    name == MACHINES_FILE
        || (name.starts_with("domain_") && name.ends_with(".xml"))
        || (name.starts_with("user_data_") && name.ends_with(".yml"))
}

/// Writes artifacts into one directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    /// Writer for `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn clear_stale(&self) -> Result<(), ProvisionError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(ProvisionError::io(&self.dir))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(ProvisionError::io(&self.dir))?
        {
            let path = entry.path();
            let stale = entry.file_name().to_str().is_some_and(is_artifact);
            if stale {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(ProvisionError::io(&path))?;
            }
        }
        Ok(())
    }

    async fn write_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf, ProvisionError> {
        let path = self.dir.join(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(ProvisionError::io(&path))?;
        debug!(path = %path.display(), "Wrote artifact");
        Ok(path)
    }

    /// Write every node's domain and user data, plus the machine summary.
    ///
    /// Returns the written paths in order.
    pub async fn write(
        &self,
        artifacts: &[NodeArtifacts],
        machines: &[MachineAssignment],
    ) -> Result<Vec<PathBuf>, ProvisionError> {
        let summary = serde_json::to_string_pretty(machines)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(ProvisionError::io(&self.dir))?;
        self.clear_stale().await?;

        let mut written = Vec::with_capacity(artifacts.len() * 2 + 1);
        for node in artifacts {
            written.push(
                self.write_file(&node.domain_file_name(), node.domain_xml.as_bytes())
                    .await?,
            );
            written.push(
                self.write_file(&node.user_data_file_name(), node.user_data.as_bytes())
                    .await?,
            );
        }
        written.push(self.write_file(MACHINES_FILE, summary.as_bytes()).await?);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use continuum_types::{Architecture, NodeRole};

    fn node(name: &str) -> NodeArtifacts {
        NodeArtifacts {
            role: NodeRole::Endpoint,
            name: name.to_string(),
            domain_xml: format!("<domain><name>{name}</name></domain>\n"),
            user_data: "#cloud-config\n".to_string(),
        }
    }

    #[tokio::test]
    async fn writes_named_files_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("out"));
        let machines = vec![MachineAssignment::new("local", Architecture::X86_64)];

        let written = writer
            .write(&[node("endpoint0"), node("endpoint1")], &machines)
            .await
            .unwrap();

        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "domain_endpoint0.xml",
                "user_data_endpoint0.yml",
                "domain_endpoint1.xml",
                "user_data_endpoint1.yml",
                "machines.json"
            ]
        );
        let xml = tokio::fs::read_to_string(writer.dir().join("domain_endpoint1.xml"))
            .await
            .unwrap();
        assert!(xml.contains("<name>endpoint1</name>"));

        let summary = tokio::fs::read_to_string(writer.dir().join(MACHINES_FILE))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(json[0]["machine"], "local");
    }

    #[tokio::test]
    async fn stale_artifacts_are_removed_other_files_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("domain_edge7.xml"), "old").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        ArtifactWriter::new(dir.path())
            .write(&[node("endpoint0")], &[])
            .await
            .unwrap();

        assert!(!dir.path().join("domain_edge7.xml").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("domain_endpoint0.xml").exists());
    }

    #[test]
    fn artifact_names() {
        assert!(is_artifact("domain_cloud0.xml"));
        assert!(is_artifact("user_data_base0.yml"));
        assert!(is_artifact("machines.json"));
        assert!(!is_artifact("domain_cloud0.xml.bak"));
        assert!(!is_artifact("inventory"));
    }
}
