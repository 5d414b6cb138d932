pub mod records;


pub use records::{ItemRecord, ItemUpdate, NewItem, ParentSuggestion, RecordStore, PARENT_LOOKUP_LIMIT};
