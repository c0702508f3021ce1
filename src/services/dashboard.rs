use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{doc, DateTime as BsonDateTime};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::Serialize;

use crate::auth::models::{AuthenticatedUser, Role};
use crate::clock::Clock;
use crate::db::count_field;
use crate::db::models::DocumentView;
use crate::db::notification_repository::NotificationRepository;
use crate::db::repository::{DocumentRepository, SearchQuery};
use crate::db::review_repository::ReviewRepository;
use crate::db::user_repository::UserRepository;
use crate::error::AppError;
use crate::services::access;
use crate::services::cache::{ClearScope, TtlCache};
use crate::services::query::overdue_condition;

pub const ANALYTICS_KEY: &str = "analytics:global";
const RECENT_DOCUMENTS: i64 = 5;

pub fn dashboard_key(user: ObjectId) -> String {
    format!("dashboard:{}", user.to_hex())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub recent_documents: Vec<DocumentView>,
    pub total_documents: u64,
    pub pending_reviews: u64,
    pub overdue_reviews: u64,
    pub unread_notifications: u64,
    pub assigned_reviews: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: Option<String>,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthCount {
    /// `YYYY-MM`.
    pub month: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCount {
    pub role: Role,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatusSplit {
    pub completed: u64,
    pub pending: u64,
    pub overdue: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_documents: u64,
    pub documents_by_category: Vec<CategoryCount>,
    pub review_status: ReviewStatusSplit,
    pub documents_per_month: Vec<MonthCount>,
    pub users_by_role: Vec<RoleCount>,
    pub generated_at: DateTime<Utc>,
}

/// Response caches of the dashboard and analytics endpoints.
pub struct DashboardCaches {
    pub dashboards: TtlCache<DashboardData>,
    pub analytics: TtlCache<AnalyticsSummary>,
}

impl DashboardCaches {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration, sweep_threshold: usize) -> Self {
        Self {
            dashboards: TtlCache::new(clock.clone(), ttl).with_sweep_threshold(sweep_threshold),
            analytics: TtlCache::new(clock, ttl).with_sweep_threshold(sweep_threshold),
        }
    }

    /// Forget everything derived from documents.
    pub fn invalidate_documents(&self) {
        let removed = self.clear(&ClearScope::Pattern("dashboard:*".into()))
            + self.clear(&ClearScope::Pattern("analytics:*".into()));
        if removed > 0 {
            tracing::debug!(removed, "Invalidated dashboard caches");
        }
    }

    pub fn clear(&self, scope: &ClearScope) -> usize {
        self.dashboards.clear(scope) + self.analytics.clear(scope)
    }
}

pub struct DashboardService<'a> {
    pub documents: &'a dyn DocumentRepository,
    pub users: &'a dyn UserRepository,
    pub notifications: &'a dyn NotificationRepository,
    pub reviews: &'a dyn ReviewRepository,
    pub caches: &'a DashboardCaches,
    pub clock: &'a dyn Clock,
}

fn scoped(access: &Option<bson::Document>, condition: bson::Document) -> bson::Document {
    match access {
        Some(access) => doc! { "$and": [access.clone(), condition] },
        None => condition,
    }
}

/// First day of the month eleven months before `now`'s month.
fn twelve_month_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|first| first.checked_sub_months(Months::new(11)))
        .and_then(|start| start.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc())
        .unwrap_or(now - Duration::days(365))
}

impl DashboardService<'_> {
    /// Overview for the calling user, cached per user.
    pub async fn user_dashboard_data(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<DashboardData, AppError> {
        self.caches
            .dashboards
            .get_or_try_insert_with(&dashboard_key(user.user_id), || self.fetch_dashboard(user))
            .await
    }

    async fn fetch_dashboard(&self, user: &AuthenticatedUser) -> Result<DashboardData, AppError> {
        let now = self.clock.now();
        let access = access::access_filter(user);

        let recent = SearchQuery {
            filter: access.clone().unwrap_or_default(),
            sort: doc! { "createdAt": -1, "_id": -1 },
            skip: 0,
            limit: RECENT_DOCUMENTS,
        };

        let pending = scoped(&access, doc! { "reviewCompleted": { "$ne": true } });
        let overdue = scoped(&access, overdue_condition(now));
        let ((recent_documents, total_documents), pending_reviews, overdue_reviews, unread, assigned) =
            futures::try_join!(
                self.documents.search(&recent),
                self.documents.count(pending),
                self.documents.count(overdue),
                self.notifications.count_unread(user.user_id),
                self.reviews.count_pending_for_reviewer(user.user_id),
            )?;

        Ok(DashboardData {
            recent_documents: recent_documents.into_iter().map(DocumentView::from).collect(),
            total_documents,
            pending_reviews,
            overdue_reviews,
            unread_notifications: unread,
            assigned_reviews: assigned,
            generated_at: now,
        })
    }

    /// Global figures for administrators, cached under a single key.
    pub async fn optimized_analytics(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<AnalyticsSummary, AppError> {
        user.require(Role::Admin)?;

        self.caches
            .analytics
            .get_or_try_insert_with(ANALYTICS_KEY, || self.fetch_analytics())
            .await
    }

    async fn fetch_analytics(&self) -> Result<AnalyticsSummary, AppError> {
        let now = self.clock.now();
        let window_start = BsonDateTime::from_chrono(twelve_month_window_start(now));

        let by_category = vec![
            doc! { "$group": { "_id": "$category", "count": { "$sum": 1 } } },
            doc! { "$lookup": {
                "from": "categories",
                "localField": "_id",
                "foreignField": "_id",
                "as": "category",
            } },
            doc! { "$project": {
                "count": 1,
                "name": { "$ifNull": [{ "$arrayElemAt": ["$category.name", 0] }, "Uncategorized"] },
            } },
            doc! { "$sort": { "count": -1, "name": 1 } },
        ];

        let per_month = vec![
            doc! { "$match": { "createdAt": { "$gte": window_start } } },
            doc! { "$group": {
                "_id": { "$dateToString": { "format": "%Y-%m", "date": "$createdAt" } },
                "count": { "$sum": 1 },
            } },
            doc! { "$sort": { "_id": 1 } },
        ];

        let (total, category_rows, month_rows, completed, pending, overdue, roles) =
            futures::try_join!(
                self.documents.count(doc! {}),
                self.documents.aggregate(by_category),
                self.documents.aggregate(per_month),
                self.documents.count(doc! { "reviewCompleted": true }),
                self.documents.count(doc! { "reviewCompleted": { "$ne": true } }),
                self.documents.count(overdue_condition(now)),
                self.users.count_by_role(),
            )?;

        let documents_by_category = category_rows
            .iter()
            .map(|row| CategoryCount {
                category: row.get_object_id("_id").ok().map(|id| id.to_hex()),
                name: row.get_str("name").unwrap_or("Uncategorized").to_string(),
                count: count_field(row),
            })
            .collect();

        let documents_per_month = month_rows
            .iter()
            .filter_map(|row| {
                Some(MonthCount {
                    month: row.get_str("_id").ok()?.to_string(),
                    count: count_field(row),
                })
            })
            .collect();

        Ok(AnalyticsSummary {
            total_documents: total,
            documents_by_category,
            review_status: ReviewStatusSplit {
                completed,
                pending,
                overdue,
            },
            documents_per_month,
            users_by_role: roles
                .into_iter()
                .map(|(role, count)| RoleCount { role, count })
                .collect(),
            generated_at: now,
        })
    }

    /// Drop cached responses. Superadmin only.
    pub fn clear_cache(
        &self,
        user: &AuthenticatedUser,
        scope: &ClearScope,
    ) -> Result<usize, AppError> {
        user.require(Role::Superadmin)?;
        let removed = self.caches.clear(scope);
        tracing::info!(user = %user.user_id, ?scope, removed, "Cache cleared");
        Ok(removed)
    }
}
