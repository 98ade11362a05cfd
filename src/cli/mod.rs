pub mod ask;
pub mod doctor;
pub mod ingest;
pub mod search;
pub mod tools;
