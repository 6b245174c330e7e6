use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) {
        let path = self.root.path().join(".docker-make.yml");
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_dockerfile(&self, dir: &str, content: &str) -> PathBuf {
        let context = self.root.path().join(dir);
        fs::create_dir_all(&context).unwrap();
        let path = context.join("Dockerfile");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }
}
