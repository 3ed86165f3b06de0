//! Ordered collections of handles that jobs operate on.

use crate::handle::FileHandle;
use crate::locator::ResourceLocator;

/// Ordered, duplicate-free set of handles sharing a base folder.
///
/// A job takes ownership of its `FileSet`, so the set cannot change while
/// the job runs.
#[derive(Debug, Clone)]
pub struct FileSet {
    base: ResourceLocator,
    files: Vec<FileHandle>,
}

impl FileSet {
    pub fn new(base: ResourceLocator) -> Self {
        Self {
            base,
            files: Vec::new(),
        }
    }

    /// Builds a set from handles, dropping duplicates after their first occurrence.
    pub fn from_handles(base: ResourceLocator, handles: impl IntoIterator<Item = FileHandle>) -> Self {
        let mut set = Self::new(base);
        set.extend(handles);
        set
    }

    /// Appends `handle` unless a handle with the same locator is present.
    pub fn push(&mut self, handle: FileHandle) -> bool {
        if self.contains(handle.locator()) {
            return false;
        }
        self.files.push(handle);
        true
    }

    pub fn contains(&self, locator: &ResourceLocator) -> bool {
        self.files.iter().any(|f| f.locator() == locator)
    }

    pub fn base(&self) -> &ResourceLocator {
        &self.base
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FileHandle> {
        self.files.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileHandle> {
        self.files.iter()
    }

    /// Sum of the sizes of the top-level entries; folders count as 0.
    pub fn total_known_size(&self) -> u64 {
        self.files.iter().map(|f| f.size()).sum()
    }

    /// Path of `handle` relative to the base folder, or its name when it
    /// lives elsewhere.
    pub fn relative_path(&self, handle: &FileHandle) -> String {
        handle
            .locator()
            .relative_to(&self.base)
            .unwrap_or_else(|| handle.name().to_string())
    }
}

impl Extend<FileHandle> for FileSet {
    fn extend<I: IntoIterator<Item = FileHandle>>(&mut self, iter: I) {
        for handle in iter {
            self.push(handle);
        }
    }
}

impl IntoIterator for FileSet {
    type Item = FileHandle;
    type IntoIter = std::vec::IntoIter<FileHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a FileHandle;
    type IntoIter = std::slice::Iter<'a, FileHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
