pub mod collection;
pub mod error;
pub mod manifest;
pub mod settings;
pub mod template;

pub use collection::{CollectionUpdate, FileCollection, FileCollectionItem, NewCollection};
pub use error::{CollectionError, CollectionResult};
