//! Collection services: persistence, file storage helpers, archives and the
//! business rules that tie them together.

pub mod archive;
pub mod collection_service;
pub mod repository;
pub mod storage;
pub mod worker;

pub use collection_service::{
    AddedFile, BulkAddError, BulkAddReport, CollectionIntegrity, CollectionService,
    DuplicateGroup, ExportSummary, FileIntegrity, ImportOptions, ImportReport, TemplateInstance,
};
pub use repository::{CollectionRepository, SqliteCollectionRepository};
pub use storage::StorageHelper;
pub use worker::CollectionWorker;
