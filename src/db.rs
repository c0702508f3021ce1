pub mod catalog_repository;
pub mod file_repository;
pub mod models;
pub mod notification_repository;
pub mod repository;
pub mod review_repository;
pub mod token_repository;
pub mod user_repository;

/// Read the `count` of an aggregation row, whatever integer width Mongo chose.
pub fn count_field(row: &bson::Document) -> u64 {
    match row.get("count") {
        Some(bson::Bson::Int32(n)) => (*n).max(0) as u64,
        Some(bson::Bson::Int64(n)) => (*n).max(0) as u64,
        Some(bson::Bson::Double(n)) => n.max(0.0) as u64,
        _ => 0,
    }
}
