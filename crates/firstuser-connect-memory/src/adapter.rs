// HashMap-based store implementing the core Adapter trait.
//
// All mutation happens under a single write lock, so conditional updates are
// atomic and uniqueness checks cannot race with the insert they guard.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use firstuser_connect_core::db::adapter::{
    Adapter, AdapterResult, FindManyQuery, Operator, SortDirection, WhereClause,
};
use firstuser_connect_core::db::schema::ConnectSchema;
use firstuser_connect_core::error::ConnectError;

/// Type alias for the in-memory store.
type Store = HashMap<String, Vec<serde_json::Value>>;

/// In-memory storage adapter.
///
/// Data is lost when the adapter is dropped. Clones share the same store.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    schema: Arc<ConnectSchema>,
    store: Arc<RwLock<Store>>,
}

impl MemoryAdapter {
    /// Create an empty adapter enforcing the given schema's constraints.
    pub fn new(schema: ConnectSchema) -> Self {
        Self {
            schema: Arc::new(schema),
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get a snapshot of all data (for debugging/testing).
    pub async fn snapshot(&self) -> Store {
        self.store.read().await.clone()
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    /// Record count for a specific model.
    pub async fn model_count(&self, model: &str) -> usize {
        self.store
            .read()
            .await
            .get(model)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Check the candidate record against the model's unique and
    /// unique-together constraints. `skip_idx` excludes the record being
    /// updated from the comparison. Must be called with the write lock held.
    fn check_unique(
        &self,
        store: &Store,
        model: &str,
        candidate: &serde_json::Value,
        skip_idx: Option<usize>,
    ) -> Result<(), ConnectError> {
        let Some(table) = self.schema.get(model) else {
            return Ok(());
        };
        let empty = Vec::new();
        let existing = store.get(model).unwrap_or(&empty);

        for (name, field) in &table.fields {
            if !field.unique {
                continue;
            }
            let Some(value) = candidate.get(name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            for (i, record) in existing.iter().enumerate() {
                if Some(i) == skip_idx {
                    continue;
                }
                if record.get(name) == Some(value) {
                    return Err(ConnectError::Duplicate(format!("{model}.{name}")));
                }
            }
        }

        for group in &table.unique_together {
            let values: Vec<Option<&serde_json::Value>> =
                group.iter().map(|f| candidate.get(f)).collect();
            if values.iter().any(|v| v.is_none() || v.unwrap().is_null()) {
                continue;
            }
            for (i, record) in existing.iter().enumerate() {
                if Some(i) == skip_idx {
                    continue;
                }
                let all_match = group
                    .iter()
                    .zip(&values)
                    .all(|(f, v)| record.get(f) == *v);
                if all_match {
                    return Err(ConnectError::Duplicate(format!(
                        "{model}.({})",
                        group.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Check if a record matches a set of WHERE clauses (AND-ed).
fn matches_where(record: &serde_json::Value, clauses: &[WhereClause]) -> bool {
    clauses
        .iter()
        .all(|clause| match_operator(record.get(&clause.field), &clause.value, &clause.operator))
}

/// Match a single operator condition.
fn match_operator(
    field_val: Option<&serde_json::Value>,
    target: &serde_json::Value,
    op: &Operator,
) -> bool {
    let null = serde_json::Value::Null;
    let field_val = field_val.unwrap_or(&null);
    match op {
        Operator::Eq => field_val == target,
        Operator::Ne => field_val != target,
        Operator::Lt => compare_json(field_val, target).map_or(false, |c| c < 0),
        Operator::Lte => compare_json(field_val, target).map_or(false, |c| c <= 0),
        Operator::Gt => compare_json(field_val, target).map_or(false, |c| c > 0),
        Operator::Gte => compare_json(field_val, target).map_or(false, |c| c >= 0),
        Operator::In => {
            if let serde_json::Value::Array(arr) = target {
                arr.contains(field_val)
            } else {
                false
            }
        }
        Operator::IsNull => field_val.is_null(),
    }
}

/// Compare two JSON values numerically or lexicographically.
///
/// String pairs that both parse as RFC 3339 timestamps compare as instants,
/// so the staleness and retry-due queries work across fractional-second
/// precisions.
fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> Option<i8> {
    fn ord_to_i8(o: std::cmp::Ordering) -> i8 {
        match o {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }
    }

    match (a, b) {
        (serde_json::Value::Number(an), serde_json::Value::Number(bn)) => {
            let af = an.as_f64()?;
            let bf = bn.as_f64()?;
            af.partial_cmp(&bf).map(ord_to_i8)
        }
        (serde_json::Value::String(a_s), serde_json::Value::String(b_s)) => {
            if let (Ok(a_t), Ok(b_t)) = (
                chrono::DateTime::parse_from_rfc3339(a_s),
                chrono::DateTime::parse_from_rfc3339(b_s),
            ) {
                return Some(ord_to_i8(a_t.cmp(&b_t)));
            }
            Some(ord_to_i8(a_s.cmp(b_s)))
        }
        _ => None,
    }
}

/// Apply sorting to records.
fn sort_records(records: &mut [serde_json::Value], query: &FindManyQuery) {
    if let Some(ref sort) = query.sort_by {
        records.sort_by(|a, b| {
            let av = a.get(&sort.field);
            let bv = b.get(&sort.field);
            let cmp = match (av, bv) {
                (Some(av), Some(bv)) => compare_json(av, bv).unwrap_or(0),
                (Some(_), None) => 1,
                (None, Some(_)) => -1,
                (None, None) => 0,
            };
            match sort.direction {
                SortDirection::Asc => cmp.cmp(&0),
                SortDirection::Desc => cmp.cmp(&0).reverse(),
            }
        });
    }
}

/// Merge update data into an existing record.
fn merge_update(record: &mut serde_json::Value, data: &serde_json::Value) {
    if let (Some(rec_obj), Some(data_obj)) = (record.as_object_mut(), data.as_object()) {
        for (k, v) in data_obj {
            rec_obj.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn schema(&self) -> &ConnectSchema {
        &self.schema
    }

    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let mut record = data;
        if !record.is_object() {
            return Err(ConnectError::Database(format!(
                "create on {model} requires an object record"
            )));
        }

        // Auto-generate id if absent
        if record.get("id").map_or(true, |v| v.is_null()) {
            record
                .as_object_mut()
                .unwrap()
                .insert("id".to_string(), serde_json::Value::String(nanoid::nanoid!()));
        }

        let mut store = self.store.write().await;
        self.check_unique(&store, model, &record, None)?;
        store
            .entry(model.to_string())
            .or_default()
            .push(record.clone());

        Ok(record)
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        let store = self.store.read().await;
        Ok(store
            .get(model)
            .and_then(|recs| recs.iter().find(|r| matches_where(r, where_clauses)).cloned()))
    }

    async fn find_many(
        &self,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>> {
        let store = self.store.read().await;
        let empty = Vec::new();
        let records = store.get(model).unwrap_or(&empty);

        let mut result: Vec<serde_json::Value> = records
            .iter()
            .filter(|r| matches_where(r, &query.where_clauses))
            .cloned()
            .collect();

        sort_records(&mut result, &query);

        if let Some(offset) = query.offset {
            if (offset as usize) < result.len() {
                result = result.split_off(offset as usize);
            } else {
                result.clear();
            }
        }

        if let Some(limit) = query.limit {
            result.truncate(limit as usize);
        }

        Ok(result)
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let store = self.store.read().await;
        let empty = Vec::new();
        let records = store.get(model).unwrap_or(&empty);
        Ok(records.iter().filter(|r| matches_where(r, where_clauses)).count() as i64)
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        let mut store = self.store.write().await;

        let idx = store
            .get(model)
            .and_then(|recs| recs.iter().position(|r| matches_where(r, where_clauses)));
        let Some(idx) = idx else {
            return Ok(None);
        };

        let mut candidate = store.get(model).unwrap()[idx].clone();
        merge_update(&mut candidate, &data);
        self.check_unique(&store, model, &candidate, Some(idx))?;

        let record = &mut store.get_mut(model).unwrap()[idx];
        *record = candidate;
        Ok(Some(record.clone()))
    }

    async fn update_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<i64> {
        let mut store = self.store.write().await;
        let mut count = 0i64;

        if let Some(recs) = store.get_mut(model) {
            for record in recs.iter_mut() {
                if matches_where(record, where_clauses) {
                    merge_update(record, &data);
                    count += 1;
                }
            }
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firstuser_connect_core::db::adapter::SortBy;
    use firstuser_connect_core::db::schema::{
        integration_schema, ConnectTable, SchemaField, ACCESS_CODE_TABLE, IDENTITY_LINK_TABLE,
    };
    use serde_json::json;

    fn adapter() -> MemoryAdapter {
        MemoryAdapter::new(integration_schema())
    }

    #[tokio::test]
    async fn test_create_and_find_one() {
        let db = adapter();
        db.create("firstuserUser", json!({"id": "u1", "membershipStatus": "pending"}))
            .await
            .unwrap();

        let found = db
            .find_one("firstuserUser", &[WhereClause::eq("id", "u1")])
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap()["membershipStatus"], "pending");
    }

    #[tokio::test]
    async fn test_create_generates_id() {
        let db = adapter();
        let created = db
            .create("firstuserUser", json!({"membershipStatus": "pending"}))
            .await
            .unwrap();
        assert!(created["id"].is_string());
    }

    #[tokio::test]
    async fn test_unique_field_rejected() {
        let db = adapter();
        db.create(ACCESS_CODE_TABLE, json!({"id": "c1", "codeHash": "h1", "integrationAppId": "a1"}))
            .await
            .unwrap();

        let dup = db
            .create(ACCESS_CODE_TABLE, json!({"id": "c2", "codeHash": "h1", "integrationAppId": "a1"}))
            .await;
        assert!(matches!(dup, Err(ConnectError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_unique_together_rejected_both_directions() {
        let db = adapter();
        db.create(
            IDENTITY_LINK_TABLE,
            json!({"id": "l1", "integrationAppId": "a1", "externalUserId": "ext_1", "firstuserUserId": "u1"}),
        )
        .await
        .unwrap();

        // Same external id, different platform user
        let dup_ext = db
            .create(
                IDENTITY_LINK_TABLE,
                json!({"id": "l2", "integrationAppId": "a1", "externalUserId": "ext_1", "firstuserUserId": "u2"}),
            )
            .await;
        assert!(matches!(dup_ext, Err(ConnectError::Duplicate(_))));

        // Same platform user, different external id
        let dup_user = db
            .create(
                IDENTITY_LINK_TABLE,
                json!({"id": "l3", "integrationAppId": "a1", "externalUserId": "ext_2", "firstuserUserId": "u1"}),
            )
            .await;
        assert!(matches!(dup_user, Err(ConnectError::Duplicate(_))));

        // Different app is fine
        let other_app = db
            .create(
                IDENTITY_LINK_TABLE,
                json!({"id": "l4", "integrationAppId": "a2", "externalUserId": "ext_1", "firstuserUserId": "u1"}),
            )
            .await;
        assert!(other_app.is_ok());
    }

    #[tokio::test]
    async fn test_conditional_update_is_single_winner() {
        let db = adapter();
        db.create(
            ACCESS_CODE_TABLE,
            json!({"id": "c1", "codeHash": "h1", "integrationAppId": "a1", "status": "issued"}),
        )
        .await
        .unwrap();

        let cas = [
            WhereClause::eq("codeHash", "h1"),
            WhereClause::eq("status", "issued"),
        ];

        let first = db
            .update(ACCESS_CODE_TABLE, &cas, json!({"status": "redeemed"}))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = db
            .update(ACCESS_CODE_TABLE, &cas, json!({"status": "redeemed"}))
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_find_many_sort_and_limit() {
        let db = adapter();
        for (id, at) in [("s1", "2026-01-01T00:00:00Z"), ("s2", "2026-01-03T00:00:00Z"), ("s3", "2026-01-02T00:00:00Z")] {
            db.create(
                "integrationUsageSession",
                json!({"id": id, "integrationAppId": "a1", "externalUserId": "e", "firstuserUserId": "u", "startedAt": at, "lastSeenAt": at}),
            )
            .await
            .unwrap();
        }

        let rows = db
            .find_many(
                "integrationUsageSession",
                FindManyQuery {
                    where_clauses: vec![WhereClause::eq("integrationAppId", "a1")],
                    sort_by: Some(SortBy::desc("startedAt")),
                    limit: Some(1),
                    offset: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "s2");
    }

    #[tokio::test]
    async fn test_is_null_operator() {
        let db = adapter();
        db.create(
            "integrationUsageSession",
            json!({"id": "open", "integrationAppId": "a1", "externalUserId": "e", "firstuserUserId": "u", "endedAt": null}),
        )
        .await
        .unwrap();
        db.create(
            "integrationUsageSession",
            json!({"id": "closed", "integrationAppId": "a1", "externalUserId": "e2", "firstuserUserId": "u2", "endedAt": "2026-01-01T00:00:00Z"}),
        )
        .await
        .unwrap();

        let open = db
            .find_many(
                "integrationUsageSession",
                FindManyQuery {
                    where_clauses: vec![WhereClause::is_null("endedAt")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0]["id"], "open");
    }

    #[tokio::test]
    async fn test_lte_on_timestamps() {
        let db = adapter();
        db.create(
            "integrationWebhookDelivery",
            json!({"id": "d1", "integrationAppId": "a1", "status": "pending", "nextRetryAt": "2026-01-01T00:00:00Z"}),
        )
        .await
        .unwrap();

        let due = db
            .count(
                "integrationWebhookDelivery",
                &[
                    WhereClause::eq("status", "pending"),
                    WhereClause::lte("nextRetryAt", "2026-01-02T00:00:00Z"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(due, 1);

        let not_due = db
            .count(
                "integrationWebhookDelivery",
                &[
                    WhereClause::eq("status", "pending"),
                    WhereClause::lte("nextRetryAt", "2025-12-31T00:00:00Z"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(not_due, 0);
    }

    #[tokio::test]
    async fn test_update_cannot_violate_unique() {
        let schema = ConnectSchema::new().table(
            ConnectTable::new("widget")
                .field("id", SchemaField::required_string().with_unique())
                .field("slug", SchemaField::required_string().with_unique()),
        );
        let db = MemoryAdapter::new(schema);
        db.create("widget", json!({"id": "w1", "slug": "one"})).await.unwrap();
        db.create("widget", json!({"id": "w2", "slug": "two"})).await.unwrap();

        let result = db
            .update("widget", &[WhereClause::eq("id", "w2")], json!({"slug": "one"}))
            .await;
        assert!(matches!(result, Err(ConnectError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_update_many_counts() {
        let db = adapter();
        for id in ["d1", "d2"] {
            db.create(
                "integrationWebhookDelivery",
                json!({"id": id, "integrationAppId": "a1", "status": "pending"}),
            )
            .await
            .unwrap();
        }
        let n = db
            .update_many(
                "integrationWebhookDelivery",
                &[WhereClause::eq("status", "pending")],
                json!({"status": "failed"}),
            )
            .await
            .unwrap();
        assert_eq!(n, 2);
    }
}
