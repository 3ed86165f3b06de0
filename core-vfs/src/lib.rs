//! # Core VFS Module
//!
//! Uniform access to files and folders on heterogeneous storage backends.
//!
//! ## Overview
//!
//! - [`ResourceLocator`]: immutable, normalized address of a resource
//! - [`Credential`]: login/secret presented to authenticating backends
//! - [`CapabilityOperation`] / [`CapabilitySet`]: what a backend can do
//! - [`FileBackend`]: the trait storage protocols implement
//! - [`FileHandle`]: capability-gated operations on one resource
//! - [`FileSet`]: ordered, duplicate-free input of a job
//! - [`BackendRegistry`]: scheme to backend resolution
//! - [`VolumeLabelCache`]: display names of volumes, cleared on config changes

pub mod backend;
pub mod capability;
pub mod credential;
pub mod error;
pub mod fileset;
pub mod handle;
pub mod label_cache;
pub mod locator;
pub mod registry;

pub use backend::{
    BackendKind, DirEntry, EntryKind, EntryStream, FileBackend, FileStat, RandomAccessRead,
    RandomAccessWrite, RandomReadStream, RandomWriteStream, ReadStream, WriteStream,
};
pub use capability::{supports, CapabilityOperation, CapabilitySet};
pub use credential::Credential;
pub use error::{ErrorKind, VfsError, VfsResult};
pub use fileset::FileSet;
pub use handle::{ChildStream, FileHandle};
pub use label_cache::VolumeLabelCache;
pub use locator::ResourceLocator;
pub use registry::{BackendRegistry, Resolver};
