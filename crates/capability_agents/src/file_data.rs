use async_trait::async_trait;
use walkdir::WalkDir;

use message_bus::{
    CapabilityHandler, FileEntry, HandlerError, Message, MessageBus, Payload, ProjectSnapshot,
};

pub const FILE_DATA_REQUEST: &str = "FILE_DATA_REQUEST";

/// Scans a project directory and answers with a file-tree snapshot.
pub struct FileDataAgent {
    max_depth: usize,
}

impl FileDataAgent {
    pub fn new() -> Self {
        Self { max_depth: 16 }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    fn scan(&self, root: &str) -> ProjectSnapshot {
        let mut snapshot = ProjectSnapshot::new(root);

        for entry in WalkDir::new(root)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    log::debug!("[file_data] skipping unreadable entry: {}", error);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
        {
            let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            let path = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            snapshot.files.push(FileEntry { path, size });
        }

        snapshot.files.sort_by(|a, b| a.path.cmp(&b.path));
        snapshot
    }
}

impl Default for FileDataAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityHandler for FileDataAgent {
    fn name(&self) -> &str {
        "file_data_agent"
    }

    fn message_types(&self) -> Vec<String> {
        vec![FILE_DATA_REQUEST.to_string()]
    }

    async fn handle(&self, request: &Message, _bus: &MessageBus) -> Result<Message, HandlerError> {
        let root = request
            .payload
            .get_str("path")
            .ok_or_else(|| HandlerError::Failed("request payload is missing 'path'".to_string()))?;

        if !std::path::Path::new(root).is_dir() {
            return Err(HandlerError::Failed(format!(
                "'{}' is not a readable directory",
                root
            )));
        }

        let snapshot = self.scan(root);
        log::debug!(
            "[file_data] scanned '{}': {} file(s)",
            root,
            snapshot.files.len()
        );

        Ok(Message::response(
            request,
            self.name(),
            Payload::ProjectStructure(snapshot),
        ))
    }
}
