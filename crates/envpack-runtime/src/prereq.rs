use crate::backend::ToolPaths;
use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

pub(crate) fn command_exists(name: &str) -> bool {
    if name.contains('/') {
        return std::path::Path::new(name).is_file();
    }
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check every external tool the conda backend invokes.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_packaging_prereqs(tools: &ToolPaths) -> Vec<MissingPrereq> {
    let checks: [(&str, &'static str, &'static str); 4] = [
        (
            tools.conda.as_str(),
            "exporting environments and locating envs_dirs",
            "install Miniconda or Anaconda and put `conda` on PATH",
        ),
        (
            tools.conda_pack.as_str(),
            "packing environments into relocatable archives",
            "conda install -c conda-forge conda-pack | pip install conda-pack",
        ),
        (
            tools.hdfs.as_str(),
            "staging and fetching archives on the distributed filesystem",
            "install a Hadoop client and put `hdfs` on PATH",
        ),
        (
            tools.tar.as_str(),
            "unpacking downloaded environments",
            "zypper install tar | apt install tar | dnf install tar",
        ),
    ];

    checks
        .into_iter()
        .filter(|(name, _, _)| !command_exists(name))
        .map(|(name, purpose, install_hint)| MissingPrereq {
            name: name.to_owned(),
            purpose,
            install_hint,
        })
        .collect()
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nenvpack requires these tools to package and fetch environments.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "conda-pack".to_owned(),
            purpose: "packing environments",
            install_hint: "pip install conda-pack",
        };
        let s = format!("{m}");
        assert!(s.contains("conda-pack"));
        assert!(s.contains("packing environments"));
        assert!(s.contains("pip install conda-pack"));
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items = vec![
            MissingPrereq {
                name: "hdfs".to_owned(),
                purpose: "staging",
                install_hint: "install a Hadoop client",
            },
            MissingPrereq {
                name: "conda".to_owned(),
                purpose: "export",
                install_hint: "install Miniconda",
            },
        ];
        let output = format_missing(&items);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("hdfs"));
        assert!(output.contains("conda"));
    }

    #[test]
    fn nonexistent_tools_are_reported() {
        let tools = ToolPaths {
            conda: "/nonexistent/conda".to_owned(),
            conda_pack: "no-such-conda-pack-xyz".to_owned(),
            hdfs: "/nonexistent/hdfs".to_owned(),
            tar: "/nonexistent/tar".to_owned(),
        };
        let missing = check_packaging_prereqs(&tools);
        assert_eq!(missing.len(), 4);
        assert_eq!(missing[1].name, "no-such-conda-pack-xyz");
    }

    #[test]
    fn absolute_tool_path_is_checked_directly() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tar");
        std::fs::write(&tool, "").unwrap();
        assert!(command_exists(&tool.to_string_lossy()));
        assert!(!command_exists(&dir.path().join("missing").to_string_lossy()));
    }
}
