pub mod blob_storage;
pub mod fs_blob_storage;
pub mod transient_blob_storage;
