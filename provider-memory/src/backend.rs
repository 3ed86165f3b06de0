//! In-memory backend implementation

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use core_vfs::{
    BackendKind, CapabilityOperation, CapabilitySet, Credential, DirEntry, EntryStream,
    FileBackend, FileStat, ReadStream, ResourceLocator, VfsError, VfsResult, WriteStream,
};

use crate::streams::{MemoryReader, MemoryWriter};

/// Scheme conventionally registered for memory backends.
pub const MEMORY_SCHEME: &str = "mem";

pub(crate) type SharedTree = Arc<RwLock<BTreeMap<String, Node>>>;

pub(crate) enum NodeKind {
    File(Vec<u8>),
    Directory,
}

pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) modified: DateTime<Utc>,
}

impl Node {
    fn directory() -> Self {
        Self {
            kind: NodeKind::Directory,
            modified: Utc::now(),
        }
    }

    fn file(contents: Vec<u8>) -> Self {
        Self {
            kind: NodeKind::File(contents),
            modified: Utc::now(),
        }
    }

    fn stat(&self) -> FileStat {
        match &self.kind {
            NodeKind::File(contents) => FileStat::file(contents.len() as u64, Some(self.modified)),
            NodeKind::Directory => FileStat::directory(Some(self.modified)),
        }
    }
}

/// Failure to raise instead of performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Transient,
    PermissionDenied,
    Unavailable,
    Authentication,
}

impl InjectedFailure {
    fn to_error(self, locator: &ResourceLocator) -> VfsError {
        match self {
            InjectedFailure::Transient => VfsError::transient(locator, "injected I/O failure"),
            InjectedFailure::PermissionDenied => VfsError::PermissionDenied {
                locator: locator.without_credential(),
            },
            InjectedFailure::Unavailable => {
                VfsError::unavailable(locator.authority_key(), "injected outage")
            }
            InjectedFailure::Authentication => {
                VfsError::authentication(locator, Some("session expired".to_string()))
            }
        }
    }
}

struct FailurePlan {
    failure: InjectedFailure,
    remaining: u32,
}

/// In-memory folder tree served as a backend.
///
/// Cloning shares the tree.
#[derive(Clone)]
pub struct MemoryBackend {
    tree: SharedTree,
    capabilities: CapabilitySet,
    required_credential: Arc<RwLock<Option<Credential>>>,
    failures: Arc<Mutex<HashMap<(String, CapabilityOperation), FailurePlan>>>,
    /// Paths whose next read breaks off after this many bytes
    read_cutoffs: Arc<Mutex<HashMap<String, usize>>>,
    read_throttle: Option<(Duration, usize)>,
}

impl MemoryBackend {
    /// Empty tree with the capabilities of a typical remote share:
    /// sequential read/write, folders, listing and deletion.
    pub fn new() -> Self {
        let mut tree = BTreeMap::new();
        tree.insert("/".to_string(), Node::directory());

        Self {
            tree: Arc::new(RwLock::new(tree)),
            capabilities: [
                CapabilityOperation::Read,
                CapabilityOperation::Write,
                CapabilityOperation::Append,
                CapabilityOperation::CreateDirectory,
                CapabilityOperation::ListChildren,
                CapabilityOperation::Delete,
            ]
            .into_iter()
            .collect(),
            required_credential: Arc::new(RwLock::new(None)),
            failures: Arc::new(Mutex::new(HashMap::new())),
            read_cutoffs: Arc::new(Mutex::new(HashMap::new())),
            read_throttle: None,
        }
    }

    /// Restricts or widens the declared capabilities.
    ///
    /// Random access is never available; declaring it only changes what
    /// handles report, and the operations still fail as unsupported.
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Every operation then requires exactly this credential.
    pub fn with_required_credential(self, credential: Credential) -> Self {
        self.set_required_credential(credential);
        self
    }

    /// Changes the credential later operations require, the way a password
    /// changed on the server invalidates open sessions.
    pub fn set_required_credential(&self, credential: Credential) {
        *self.required_credential.write() = Some(credential);
    }

    /// Slows reads down to `max_chunk` bytes per `delay`.
    pub fn with_read_throttle(mut self, delay: Duration, max_chunk: usize) -> Self {
        self.read_throttle = Some((delay, max_chunk));
        self
    }

    /// Makes the next `times` attempts of `op` on `path` fail.
    pub fn fail_on(&self, path: &str, op: CapabilityOperation, failure: InjectedFailure, times: u32) {
        self.failures.lock().insert(
            (path.to_string(), op),
            FailurePlan {
                failure,
                remaining: times,
            },
        );
    }

    /// Makes every attempt of `op` on `path` fail.
    pub fn always_fail_on(&self, path: &str, op: CapabilityOperation, failure: InjectedFailure) {
        self.fail_on(path, op, failure, u32::MAX);
    }

    /// Makes the next read of `path` fail once `bytes` bytes were served.
    pub fn fail_read_after(&self, path: &str, bytes: usize) {
        self.read_cutoffs.lock().insert(path.to_string(), bytes);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
        self.read_cutoffs.lock().clear();
    }

    /// Creates a file (and missing parent folders) with `contents`.
    pub fn insert_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let mut tree = self.tree.write();
        Self::insert_parents(&mut tree, path);
        tree.insert(path.to_string(), Node::file(contents.into()));
    }

    /// Creates a folder and its missing parents.
    pub fn insert_directory(&self, path: &str) {
        let mut tree = self.tree.write();
        Self::insert_parents(&mut tree, path);
        tree.entry(path.to_string()).or_insert_with(Node::directory);
    }

    /// Contents of the file at `path`.
    pub fn read_file(&self, path: &str) -> Option<Bytes> {
        match self.tree.read().get(path).map(|node| &node.kind) {
            Some(NodeKind::File(contents)) => Some(Bytes::copy_from_slice(contents)),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.tree.read().contains_key(path)
    }

    /// Every path in the tree, in order.
    pub fn paths(&self) -> Vec<String> {
        self.tree.read().keys().cloned().collect()
    }

    fn insert_parents(tree: &mut BTreeMap<String, Node>, path: &str) {
        let mut current = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            current.push('/');
            current.push_str(segment);
            tree.entry(current.clone()).or_insert_with(Node::directory);
        }
    }

    fn parent_path(path: &str) -> Option<String> {
        if path == "/" {
            return None;
        }
        match path.rfind('/') {
            Some(0) => Some("/".to_string()),
            Some(idx) => Some(path[..idx].to_string()),
            None => None,
        }
    }

    fn child_prefix(path: &str) -> String {
        if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        }
    }

    fn authorize(&self, locator: &ResourceLocator) -> VfsResult<()> {
        let required = self.required_credential.read();
        let Some(required) = required.as_ref() else {
            return Ok(());
        };
        match locator.credential() {
            Some(given) if given == required => Ok(()),
            Some(_) => Err(VfsError::authentication(
                locator,
                Some("invalid login or password".to_string()),
            )),
            None => Err(VfsError::authentication(locator, None)),
        }
    }

    fn check_injected(&self, locator: &ResourceLocator, op: CapabilityOperation) -> VfsResult<()> {
        let mut failures = self.failures.lock();
        let key = (locator.path().to_string(), op);
        let Some(plan) = failures.get_mut(&key) else {
            return Ok(());
        };

        let failure = plan.failure;
        if plan.remaining != u32::MAX {
            plan.remaining -= 1;
        }
        if plan.remaining == 0 {
            failures.remove(&key);
        }
        debug!(path = %locator.path(), operation = %op, ?failure, "Injecting failure");
        Err(failure.to_error(locator))
    }

    fn prepare(&self, locator: &ResourceLocator, op: CapabilityOperation) -> VfsResult<()> {
        self.authorize(locator)?;
        self.check_injected(locator, op)
    }

    fn require_parent_directory(
        tree: &BTreeMap<String, Node>,
        locator: &ResourceLocator,
    ) -> VfsResult<()> {
        let parent = Self::parent_path(locator.path())
            .ok_or_else(|| VfsError::PermissionDenied {
                locator: locator.without_credential(),
            })?;
        match tree.get(&parent).map(|node| &node.kind) {
            Some(NodeKind::Directory) => Ok(()),
            _ => Err(VfsError::not_found(&locator.parent().unwrap_or_else(|| locator.clone()))),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.tree.read().len())
            .field("capabilities", &self.capabilities)
            .field("requires_credential", &self.required_credential.read().is_some())
            .finish()
    }
}

#[async_trait]
impl FileBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    async fn stat(&self, locator: &ResourceLocator) -> VfsResult<FileStat> {
        self.authorize(locator)?;
        Ok(self
            .tree
            .read()
            .get(locator.path())
            .map(Node::stat)
            .unwrap_or_else(FileStat::missing))
    }

    async fn open_read(&self, locator: &ResourceLocator) -> VfsResult<ReadStream> {
        self.prepare(locator, CapabilityOperation::Read)?;
        let data = match self.tree.read().get(locator.path()).map(|node| &node.kind) {
            Some(NodeKind::File(contents)) => Bytes::copy_from_slice(contents),
            Some(NodeKind::Directory) => {
                return Err(VfsError::transient(locator, "is a directory"))
            }
            None => return Err(VfsError::not_found(locator)),
        };
        let cutoff = self.read_cutoffs.lock().remove(locator.path());
        Ok(Box::new(
            MemoryReader::new(data, self.read_throttle).with_cutoff(cutoff),
        ))
    }

    async fn open_write(&self, locator: &ResourceLocator) -> VfsResult<WriteStream> {
        self.prepare(locator, CapabilityOperation::Write)?;
        let mut tree = self.tree.write();
        Self::require_parent_directory(&tree, locator)?;
        if let Some(Node {
            kind: NodeKind::Directory,
            ..
        }) = tree.get(locator.path())
        {
            return Err(VfsError::AlreadyExists {
                locator: locator.without_credential(),
            });
        }
        tree.insert(locator.path().to_string(), Node::file(Vec::new()));
        Ok(Box::new(MemoryWriter::new(
            self.tree.clone(),
            locator.path().to_string(),
        )))
    }

    async fn open_append(&self, locator: &ResourceLocator) -> VfsResult<WriteStream> {
        self.prepare(locator, CapabilityOperation::Append)?;
        let mut tree = self.tree.write();
        Self::require_parent_directory(&tree, locator)?;
        match tree.get(locator.path()).map(|node| &node.kind) {
            Some(NodeKind::Directory) => {
                return Err(VfsError::AlreadyExists {
                    locator: locator.without_credential(),
                })
            }
            Some(NodeKind::File(_)) => {}
            None => {
                tree.insert(locator.path().to_string(), Node::file(Vec::new()));
            }
        }
        Ok(Box::new(MemoryWriter::new(
            self.tree.clone(),
            locator.path().to_string(),
        )))
    }

    async fn create_directory(&self, locator: &ResourceLocator) -> VfsResult<()> {
        self.prepare(locator, CapabilityOperation::CreateDirectory)?;
        let mut tree = self.tree.write();
        if tree.contains_key(locator.path()) {
            return Err(VfsError::AlreadyExists {
                locator: locator.without_credential(),
            });
        }
        Self::require_parent_directory(&tree, locator)?;
        tree.insert(locator.path().to_string(), Node::directory());
        Ok(())
    }

    async fn list_children(&self, locator: &ResourceLocator) -> VfsResult<EntryStream> {
        self.prepare(locator, CapabilityOperation::ListChildren)?;
        let tree = self.tree.read();
        match tree.get(locator.path()).map(|node| &node.kind) {
            Some(NodeKind::Directory) => {}
            Some(NodeKind::File(_)) => {
                return Err(VfsError::transient(locator, "not a directory"))
            }
            None => return Err(VfsError::not_found(locator)),
        }

        let prefix = Self::child_prefix(locator.path());
        let mut entries = Vec::new();
        for (path, node) in tree.range(prefix.clone()..) {
            let Some(name) = path.strip_prefix(&prefix) else {
                break;
            };
            if name.is_empty() || name.contains('/') {
                continue;
            }
            entries.push(locator.join(name).map(|child| DirEntry {
                locator: child,
                stat: node.stat(),
            }));
        }

        Ok(stream::iter(entries).boxed())
    }

    async fn delete(&self, locator: &ResourceLocator) -> VfsResult<()> {
        self.prepare(locator, CapabilityOperation::Delete)?;
        let mut tree = self.tree.write();
        let path = locator.path();
        if path == "/" {
            return Err(VfsError::PermissionDenied {
                locator: locator.without_credential(),
            });
        }
        if !tree.contains_key(path) {
            return Err(VfsError::not_found(locator));
        }

        let prefix = Self::child_prefix(path);
        let has_children = tree
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(child, _)| child.starts_with(&prefix));
        if has_children {
            return Err(VfsError::transient(locator, "directory not empty"));
        }

        tree.remove(path);
        debug!(path = %path, "Deleted");
        Ok(())
    }

    async fn change_timestamp(
        &self,
        locator: &ResourceLocator,
        modified: DateTime<Utc>,
    ) -> VfsResult<()> {
        self.prepare(locator, CapabilityOperation::ChangeTimestamp)?;
        match self.tree.write().get_mut(locator.path()) {
            Some(node) => {
                node.modified = modified;
                Ok(())
            }
            None => Err(VfsError::not_found(locator)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_vfs::FileHandle;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn locator(path: &str) -> ResourceLocator {
        ResourceLocator::parse(&format!("mem://share{}", path)).unwrap()
    }

    async fn handle(backend: &MemoryBackend, path: &str) -> FileHandle {
        FileHandle::resolve(Arc::new(backend.clone()), locator(path))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let backend = MemoryBackend::new();
        backend.insert_directory("/docs");

        let file = handle(&backend, "/docs/a.txt").await;
        let mut writer = file.open_write().await.unwrap();
        writer.write_all(b"hello").await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(backend.read_file("/docs/a.txt").unwrap(), Bytes::from_static(b"hello"));

        let mut contents = Vec::new();
        handle(&backend, "/docs/a.txt")
            .await
            .open_read()
            .await
            .unwrap()
            .read_to_end(&mut contents)
            .await
            .unwrap();
        assert_eq!(contents, b"hello");
    }

    #[tokio::test]
    async fn test_random_access_is_unsupported() {
        let backend = MemoryBackend::new();
        backend.insert_file("/a.bin", vec![1, 2, 3]);
        let file = handle(&backend, "/a.bin").await;

        assert!(!file.supports(CapabilityOperation::RandomRead));
        assert!(matches!(
            file.open_random_write().await.err(),
            Some(VfsError::UnsupportedOperation {
                operation: CapabilityOperation::RandomWrite,
                ..
            })
        ));
        assert!(file.change_timestamp(Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_required_credential() {
        let backend =
            MemoryBackend::new().with_required_credential(Credential::new("carol", "pw"));
        backend.insert_file("/secret.txt", "x");
        let shared: Arc<dyn FileBackend> = Arc::new(backend);

        let err = FileHandle::resolve(shared.clone(), locator("/secret.txt"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            VfsError::AuthenticationFailure {
                locator: locator("/secret.txt"),
                reason: None
            }
        );

        let wrong = locator("/secret.txt").with_credential(Credential::new("carol", "nope"));
        assert!(FileHandle::resolve(shared.clone(), wrong).await.is_err());

        let right = locator("/secret.txt").with_credential(Credential::new("carol", "pw"));
        let file = FileHandle::resolve(shared, right).await.unwrap();
        assert_eq!(file.size(), 1);
    }

    #[tokio::test]
    async fn test_rotated_credential_rejects_old_sessions() {
        let backend =
            MemoryBackend::new().with_required_credential(Credential::new("carol", "pw"));
        backend.insert_file("/secret.txt", "x");
        let file = FileHandle::resolve(
            Arc::new(backend.clone()),
            locator("/secret.txt").with_credential(Credential::new("carol", "pw")),
        )
        .await
        .unwrap();
        assert!(file.open_read().await.is_ok());

        backend.set_required_credential(Credential::new("carol", "pw2"));
        let err = file.open_read().await.err().unwrap();
        assert!(err.is_authentication_failure());
    }

    #[tokio::test]
    async fn test_read_breaks_off_once() {
        let backend = MemoryBackend::new();
        backend.insert_file("/big.bin", vec![1u8; 100]);
        backend.fail_read_after("/big.bin", 40);
        let file = handle(&backend, "/big.bin").await;

        let mut reader = file.open_read().await.unwrap();
        let mut buffer = vec![0u8; 100];
        assert_eq!(reader.read(&mut buffer).await.unwrap(), 40);
        let err = reader.read(&mut buffer).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);

        let mut contents = Vec::new();
        file.open_read().await.unwrap().read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents.len(), 100);
    }

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let backend = MemoryBackend::new();
        backend.insert_file("/a.txt", "abc");
        backend.fail_on("/a.txt", CapabilityOperation::Read, InjectedFailure::Transient, 2);

        let file = handle(&backend, "/a.txt").await;
        assert!(matches!(
            file.open_read().await.err(),
            Some(VfsError::TransientIo { .. })
        ));
        assert!(file.open_read().await.is_err());
        assert!(file.open_read().await.is_ok());
    }

    #[tokio::test]
    async fn test_listing_and_non_recursive_delete() {
        let backend = MemoryBackend::new();
        backend.insert_file("/dir/b.txt", "b");
        backend.insert_file("/dir/a.txt", "a");
        backend.insert_file("/dir/sub/c.txt", "c");
        backend.insert_file("/dirx/other.txt", "o");

        let dir = handle(&backend, "/dir").await;
        let names: Vec<String> = dir
            .list_children()
            .await
            .unwrap()
            .map(|child| child.unwrap().name().to_string())
            .collect()
            .await;
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);

        assert!(handle(&backend, "/dir/sub").await.delete().await.is_err());
        handle(&backend, "/dir/sub/c.txt").await.delete().await.unwrap();
        handle(&backend, "/dir/sub").await.delete().await.unwrap();
        assert!(!backend.exists("/dir/sub"));
        assert!(backend.exists("/dirx/other.txt"));
    }

    #[tokio::test]
    async fn test_create_directory_requires_parent() {
        let backend = MemoryBackend::new();
        let missing_parent = handle(&backend, "/a/b").await;
        assert!(matches!(
            missing_parent.create_directory().await,
            Err(VfsError::NotFound { .. })
        ));

        handle(&backend, "/a").await.create_directory().await.unwrap();
        missing_parent.create_directory().await.unwrap();
        assert!(matches!(
            missing_parent.create_directory().await,
            Err(VfsError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_throttled_reader_returns_small_chunks() {
        let backend = MemoryBackend::new().with_read_throttle(Duration::from_millis(1), 4);
        backend.insert_file("/big.bin", vec![7u8; 10]);

        let mut reader = handle(&backend, "/big.bin").await.open_read().await.unwrap();
        let mut buf = [0u8; 64];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(n, 4);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest.len(), 6);
    }
}
