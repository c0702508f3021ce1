use bson::oid::ObjectId;
use bson::{doc, Bson, DateTime as BsonDateTime};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::auth::models::AuthenticatedUser;
use crate::db::repository::SearchQuery;
use crate::services::access;
use crate::services::pagination::PageRequest;

/// Query-string parameters of the document list.
///
/// Every value is taken as text and interpreted leniently: anything that
/// does not parse is ignored rather than rejected.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    /// `pending`, `completed` or `overdue`.
    pub review_status: Option<String>,
    pub overdue: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

impl DocumentQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::from_params(
            self.page.as_deref(),
            self.limit.as_deref(),
            self.skip.as_deref(),
        )
    }
}

const SORTABLE_FIELDS: [&str; 4] = ["title", "createdAt", "updatedAt", "opensForReview"];

/// Translate the query parameters into a MongoDB filter.
pub fn build_document_filter(query: &DocumentQuery, now: DateTime<Utc>) -> bson::Document {
    combine(document_conditions(query, now))
}

/// Sort order: a whitelisted field (default `createdAt`, newest
/// first) with `_id` as tiebreaker.
pub fn build_sort(query: &DocumentQuery) -> bson::Document {
    let field = query
        .sort_by
        .as_deref()
        .map(str::trim)
        .filter(|f| SORTABLE_FIELDS.contains(f))
        .unwrap_or("createdAt");

    let direction = match query.sort_order.as_deref().map(str::trim) {
        Some(order) if order.eq_ignore_ascii_case("asc") => 1,
        _ => -1,
    };

    doc! { field: direction, "_id": direction }
}

/// The complete search for `user`: query filter restricted to what the user
/// may read, plus ordering and pagination window.
pub fn build_search(
    query: &DocumentQuery,
    user: &AuthenticatedUser,
    now: DateTime<Utc>,
) -> SearchQuery {
    let mut conditions = document_conditions(query, now);
    if let Some(clause) = access::access_filter(user) {
        conditions.push(clause);
    }

    let page = query.page_request();
    SearchQuery {
        filter: combine(conditions),
        sort: build_sort(query),
        skip: page.skip,
        limit: page.limit as i64,
    }
}

/// Documents whose review is open and past due.
///
/// `opensForReview` wins when present; the legacy `reviewDate` is only
/// consulted for records that never got the new field.
pub fn overdue_condition(now: DateTime<Utc>) -> bson::Document {
    let now = BsonDateTime::from_chrono(now);
    doc! {
        "reviewCompleted": { "$ne": true },
        "$or": [
            { "opensForReview": { "$lt": now } },
            { "opensForReview": Bson::Null, "reviewDate": { "$lt": now } },
        ],
    }
}

fn document_conditions(query: &DocumentQuery, now: DateTime<Utc>) -> Vec<bson::Document> {
    let mut conditions = Vec::new();

    if let Some(text) = non_blank(&query.search) {
        let pattern = regex::escape(text);
        conditions.push(doc! {
            "$or": [
                { "title": { "$regex": pattern.as_str(), "$options": "i" } },
                { "description": { "$regex": pattern.as_str(), "$options": "i" } },
            ]
        });
    }

    if let Some(category) = object_id(&query.category) {
        conditions.push(doc! { "category": category });
    }

    if let Some(author) = object_id(&query.author) {
        conditions.push(doc! { "author": author });
    }

    let mut wants_overdue = query
        .overdue
        .as_deref()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

    match non_blank(&query.review_status).map(str::to_lowercase).as_deref() {
        Some("pending") => conditions.push(doc! { "reviewCompleted": { "$ne": true } }),
        Some("completed") => conditions.push(doc! { "reviewCompleted": true }),
        Some("overdue") => wants_overdue = true,
        Some(other) => tracing::debug!(status = other, "Ignoring unknown review status"),
        None => {}
    }

    if wants_overdue {
        conditions.push(overdue_condition(now));
    }

    let start = parse_day(&query.start_date).and_then(|d| d.and_hms_milli_opt(0, 0, 0, 0));
    let end = parse_day(&query.end_date).and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999));
    if start.is_some() || end.is_some() {
        let mut range = bson::Document::new();
        if let Some(start) = start {
            range.insert("$gte", BsonDateTime::from_chrono(start.and_utc()));
        }
        if let Some(end) = end {
            range.insert("$lte", BsonDateTime::from_chrono(end.and_utc()));
        }
        conditions.push(doc! { "createdAt": range });
    }

    conditions
}

/// No conditions match everything, one stands alone, several are ANDed.
fn combine(mut conditions: Vec<bson::Document>) -> bson::Document {
    match conditions.len() {
        0 => bson::Document::new(),
        1 => conditions.remove(0),
        _ => doc! { "$and": conditions },
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn object_id(value: &Option<String>) -> Option<ObjectId> {
    non_blank(value).and_then(|v| ObjectId::parse_str(v).ok())
}

/// `YYYY-MM-DD`, or the UTC day of an RFC 3339 timestamp.
fn parse_day(value: &Option<String>) -> Option<NaiveDate> {
    let raw = non_blank(value)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).date_naive())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: ObjectId::new(),
            email: "u@example.com".to_string(),
            role,
            token_id: "t".to_string(),
        }
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(build_document_filter(&DocumentQuery::default(), now()).is_empty());
    }

    #[test]
    fn test_single_condition_is_not_wrapped() {
        let category = ObjectId::new();
        let query = DocumentQuery {
            category: Some(category.to_hex()),
            ..Default::default()
        };
        assert_eq!(build_document_filter(&query, now()), doc! { "category": category });
    }

    #[test]
    fn test_multiple_conditions_are_anded() {
        let query = DocumentQuery {
            search: Some("manual".to_string()),
            category: Some(ObjectId::new().to_hex()),
            review_status: Some("completed".to_string()),
            ..Default::default()
        };
        let filter = build_document_filter(&query, now());
        let and = filter.get_array("$and").unwrap();
        assert_eq!(and.len(), 3);
    }

    #[test]
    fn test_search_text_is_escaped() {
        let query = DocumentQuery {
            search: Some("a.b*(c)".to_string()),
            ..Default::default()
        };
        let filter = build_document_filter(&query, now());
        let or = filter.get_array("$or").unwrap();
        let title = or[0].as_document().unwrap().get_document("title").unwrap();
        assert_eq!(title.get_str("$regex").unwrap(), r"a\.b\*\(c\)");
        assert_eq!(title.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn test_invalid_ids_are_dropped() {
        let query = DocumentQuery {
            category: Some("not-an-id".to_string()),
            author: Some("1234".to_string()),
            ..Default::default()
        };
        assert!(build_document_filter(&query, now()).is_empty());
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let query = DocumentQuery {
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-12-31".to_string()),
            ..Default::default()
        };
        let filter = build_document_filter(&query, now());
        let range = filter.get_document("createdAt").unwrap();

        let start = range.get_datetime("$gte").unwrap();
        let end = range.get_datetime("$lte").unwrap();
        assert_eq!(
            start.to_chrono(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            end.to_chrono(),
            Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap() + chrono::Duration::milliseconds(999)
        );
    }

    #[test]
    fn test_malformed_dates_are_ignored() {
        let query = DocumentQuery {
            start_date: Some("yesterday".to_string()),
            end_date: Some("2024-13-45".to_string()),
            ..Default::default()
        };
        assert!(build_document_filter(&query, now()).is_empty());
    }

    #[test]
    fn test_rfc3339_dates_use_their_day() {
        let query = DocumentQuery {
            start_date: Some("2024-03-10T17:45:00Z".to_string()),
            ..Default::default()
        };
        let filter = build_document_filter(&query, now());
        let start = filter
            .get_document("createdAt")
            .unwrap()
            .get_datetime("$gte")
            .unwrap();
        assert_eq!(
            start.to_chrono(),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_overdue_prefers_new_field() {
        let query = DocumentQuery {
            review_status: Some("overdue".to_string()),
            ..Default::default()
        };
        let filter = build_document_filter(&query, now());
        assert_eq!(filter, overdue_condition(now()));

        let or = filter.get_array("$or").unwrap();
        let legacy = or[1].as_document().unwrap();
        assert_eq!(legacy.get("opensForReview"), Some(&Bson::Null));
        assert!(legacy.contains_key("reviewDate"));
    }

    #[test]
    fn test_overdue_flag_and_status_add_one_condition() {
        let query = DocumentQuery {
            overdue: Some("true".to_string()),
            review_status: Some("overdue".to_string()),
            ..Default::default()
        };
        let filter = build_document_filter(&query, now());
        assert!(!filter.contains_key("$and"));
    }

    #[test]
    fn test_unknown_review_status_ignored() {
        let query = DocumentQuery {
            review_status: Some("archived".to_string()),
            ..Default::default()
        };
        assert!(build_document_filter(&query, now()).is_empty());
    }

    #[test]
    fn test_sort_whitelist() {
        let query = DocumentQuery {
            sort_by: Some("title".to_string()),
            sort_order: Some("asc".to_string()),
            ..Default::default()
        };
        assert_eq!(build_sort(&query), doc! { "title": 1, "_id": 1 });

        let query = DocumentQuery {
            sort_by: Some("passwordHash".to_string()),
            ..Default::default()
        };
        assert_eq!(build_sort(&query), doc! { "createdAt": -1, "_id": -1 });
    }

    #[test]
    fn test_non_admin_search_gets_access_clause() {
        let viewer = user(Role::Editor);
        let search = build_search(&DocumentQuery::default(), &viewer, now());

        let or = search.filter.get_array("$or").unwrap();
        let fields: Vec<&str> = or
            .iter()
            .map(|c| c.as_document().unwrap().keys().next().unwrap().as_str())
            .collect();
        assert_eq!(fields, vec!["author", "stakeholders", "owners"]);
        for clause in or {
            let clause = clause.as_document().unwrap();
            assert_eq!(clause.values().next().unwrap().as_object_id(), Some(viewer.user_id));
        }
    }

    #[test]
    fn test_admin_search_has_no_access_clause() {
        for role in [Role::Admin, Role::Superadmin] {
            let search = build_search(&DocumentQuery::default(), &user(role), now());
            assert!(search.filter.is_empty());
        }
    }

    #[test]
    fn test_access_clause_is_anded_with_query() {
        let query = DocumentQuery {
            search: Some("policy".to_string()),
            ..Default::default()
        };
        let search = build_search(&query, &user(Role::Viewer), now());
        let and = search.filter.get_array("$and").unwrap();
        assert_eq!(and.len(), 2);
    }

    #[test]
    fn test_search_window() {
        let query = DocumentQuery {
            page: Some("3".to_string()),
            limit: Some("20".to_string()),
            ..Default::default()
        };
        let search = build_search(&query, &user(Role::Admin), now());
        assert_eq!(search.skip, 40);
        assert_eq!(search.limit, 20);
    }
}
