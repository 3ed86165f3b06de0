//! Deletes files and folders, emptying folders first.

use crate::context::JobContext;
use crate::variant::{FileContext, JobVariant, Traversal};
use async_trait::async_trait;
use core_vfs::{FileHandle, ResourceLocator, VfsResult};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DeleteJob {
    /// Folders whose listing changed
    touched: HashSet<ResourceLocator>,
}

impl DeleteJob {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobVariant for DeleteJob {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn traversal(&self) -> Traversal {
        Traversal::ChildrenFirst
    }

    async fn process_file(
        &mut self,
        _ctx: &JobContext,
        handle: &FileHandle,
        _file: &FileContext,
    ) -> VfsResult<bool> {
        handle.delete().await?;
        if let Some(parent) = handle.parent() {
            self.touched.insert(parent);
        }
        Ok(true)
    }

    fn status_message(&self, ctx: &JobContext) -> String {
        match ctx.current_file_name() {
            Some(name) => format!("Deleting {}", name),
            None => "Preparing deletion".to_string(),
        }
    }

    fn affects_folder(&self, folder: &ResourceLocator) -> bool {
        self.touched.contains(folder)
    }
}
