use std::path::PathBuf;

use async_trait::async_trait;

use crate::file_reader::FileReader;

/// File source backed by a fixed local directory. Never changes.
pub struct DirectoryReader {
    path: PathBuf,
}

impl DirectoryReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl FileReader for DirectoryReader {
    async fn search_paths(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }

    async fn is_changed(&self) -> bool {
        false
    }

    fn idle_message(&self) -> String {
        format!("No compatible movies found in {}.", self.path.display())
    }
}
