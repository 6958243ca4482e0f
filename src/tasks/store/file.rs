use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::tasks::model::BatchTask;
use crate::tasks::store::{StoreError, TaskStore};

/// One `{task_id}.json` file per task.
///
/// Files are written to a temporary name and renamed into place so a crash
/// never leaves a half-written snapshot behind.
pub struct FileTaskStore {
    directory: PathBuf,
}

impl FileTaskStore {
    pub async fn new(directory: impl AsRef<Path>) -> Result<Self, StoreError> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    fn path_for(&self, task_id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", task_id))
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save(&self, task: &BatchTask) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(task)?;
        let path = self.path_for(&task.task_id);
        let tmp = self.directory.join(format!(".{}.json.tmp", task.task_id));

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<BatchTask>, StoreError> {
        let mut tasks = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<BatchTask>(&bytes) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable task snapshot");
                }
            }
        }

        Ok(tasks)
    }

    async fn remove(&self, task_id: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(task_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
