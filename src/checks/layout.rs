//! Webmail installation layout

use crate::connection::within;
use crate::engine::{Check, CheckContext};
use crate::error::{FailureKind, Result};
use crate::report::Outcome;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Verifies that the install root is readable, contains the expected
/// directories, and that the config file can be opened.
#[derive(Debug, Clone)]
pub struct InstallLayoutCheck {
    id: String,
    target: String,
}

impl InstallLayoutCheck {
    #[must_use]
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Entry {
    path: PathBuf,
    kind: &'static str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    problem: Option<String>,
}

impl Entry {
    fn new(path: PathBuf, kind: &'static str, problem: Option<String>) -> Self {
        Self {
            path,
            kind,
            ok: problem.is_none(),
            problem,
        }
    }
}

async fn check_root(root: &Path) -> Option<String> {
    match tokio::fs::read_dir(root).await {
        Ok(_) => None,
        Err(e) => Some(format!("not readable: {e}")),
    }
}

async fn check_dir(path: &Path) -> Option<String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => None,
        Ok(_) => Some("not a directory".to_string()),
        Err(e) => Some(format!("missing: {e}")),
    }
}

async fn check_file(path: &Path) -> Option<String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if !meta.is_file() => return Some("not a regular file".to_string()),
        Ok(_) => {}
        Err(e) => return Some(format!("missing: {e}")),
    }
    tokio::fs::File::open(path)
        .await
        .err()
        .map(|e| format!("not readable: {e}"))
}

#[async_trait]
impl Check for InstallLayoutCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &str {
        &self.target
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome> {
        let root = ctx.targets.path(&self.target)?;
        let label = root.display().to_string();
        let config_file = root.join(&ctx.config.config_path);

        let inspect = async {
            let mut entries = vec![Entry::new(root.to_path_buf(), "root", check_root(root).await)];
            for dir in &ctx.config.layout_dirs {
                let path = root.join(dir);
                let problem = check_dir(&path).await;
                entries.push(Entry::new(path, "directory", problem));
            }
            let problem = check_file(&config_file).await;
            entries.push(Entry::new(config_file.clone(), "config", problem));
            entries
        };
        let entries = within(ctx.timeout(), &label, inspect).await?;

        let missing: Vec<String> = entries
            .iter()
            .filter(|e| !e.ok)
            .map(|e| e.path.display().to_string())
            .collect();
        debug!("Layout of {}: {} problems", label, missing.len());

        let data = json!({ "root": label, "entries": entries });
        if missing.is_empty() {
            Ok(Outcome::ok(format!("installation at {label} is complete")).with_data(data))
        } else {
            let detail = format!("missing or unreadable: {}", missing.join(", "));
            Ok(Outcome::failed(FailureKind::MissingPath, detail).with_data(data))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::report::Status;
    use crate::target::{Target, TargetSet};

    async fn run(root: &Path) -> Outcome {
        let targets = TargetSet::new().with("install", Target::Path(root.to_path_buf()));
        let config = ProbeConfig::default();
        let ctx = CheckContext {
            targets: &targets,
            config: &config,
        };
        InstallLayoutCheck::new("install.layout", "install")
            .run(&ctx)
            .await
            .unwrap()
    }

    fn scaffold(root: &Path) {
        for dir in ["program", "config", "skins", "plugins"] {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }
        std::fs::write(root.join("config/config.inc.php"), "<?php\n").unwrap();
    }

    #[tokio::test]
    async fn complete_installation_passes() {
        let dir = tempfile::tempdir().unwrap();
        scaffold(dir.path());
        let outcome = run(dir.path()).await;
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(outcome.data.unwrap()["entries"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn reports_each_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        scaffold(dir.path());
        std::fs::remove_dir(dir.path().join("skins")).unwrap();
        std::fs::remove_file(dir.path().join("config/config.inc.php")).unwrap();

        let outcome = run(dir.path()).await;
        assert_eq!(outcome.failure, Some(FailureKind::MissingPath));
        assert!(outcome.detail.contains("skins"));
        assert!(outcome.detail.contains("config.inc.php"));
        assert!(!outcome.detail.contains("plugins"));
    }

    #[tokio::test]
    async fn missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run(&dir.path().join("nowhere")).await;
        assert_eq!(outcome.status, Status::Failed);
    }
}
