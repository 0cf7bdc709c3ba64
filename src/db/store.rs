//! Generic CRUD over one table per entity kind.
//!
//! Every document-like entity (clients, projects, bookings, blog posts, ...)
//! goes through [`EntityStore`]. Entities describe their table through the
//! [`Entity`] trait; create and update payloads describe the columns they
//! write through [`NewRecord`] and [`PatchRecord`]. Column names only ever come
//! from those `'static` descriptions, never from request input.

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Sqlite};
use std::marker::PhantomData;

use super::DbPool;
use crate::error::{CoreError, CoreResult};

/// Default page size for list queries
pub const DEFAULT_LIMIT: i64 = 20;
/// Maximum page size for list queries
pub const MAX_LIMIT: i64 = 100;

/// A value bound into a query
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Int(Option<i64>),
    Bool(bool),
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(Some(v))
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(Some(v.to_string()))
    }
}

impl From<Option<String>> for FieldValue {
    fn from(v: Option<String>) -> Self {
        FieldValue::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(Some(v))
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(v: Option<i64>) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// Column/value pairs written by a create or update
pub type Fields = Vec<(&'static str, FieldValue)>;

/// Describes the table behind an entity kind
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static {
    const TABLE: &'static str;
    /// Human-readable kind used in error messages ("Client", "Blog")
    const KIND: &'static str;
    /// Column holding the natural key (slug, email), if any
    const UNIQUE_KEY: Option<&'static str> = None;
    /// Columns matched by the free-text search
    const SEARCH_COLUMNS: &'static [&'static str] = &[];
    /// Columns a caller may sort by
    const SORT_COLUMNS: &'static [&'static str] = &["created_at", "updated_at"];
    const DEFAULT_SORT: &'static str = "created_at";
    const DEFAULT_ORDER: SortOrder = SortOrder::Desc;
    /// Boolean column gating public visibility, if the entity has one
    const PUBLISH_FLAG: Option<&'static str> = None;

    fn id(&self) -> &str;
}

/// Payload for `EntityStore::create`
pub trait NewRecord: Send {
    type Entity: Entity;

    /// Reject absent or malformed required fields
    fn validate(&self) -> CoreResult<()>;

    /// Value of the entity's unique key carried by this payload
    fn unique_value(&self) -> Option<String> {
        None
    }

    /// Columns to insert, with entity-specific defaults applied.
    /// `id`, `created_at` and `updated_at` are added by the store.
    fn into_fields(self) -> CoreResult<Fields>;
}

/// Payload for `EntityStore::update`; only supplied fields are written
pub trait PatchRecord: Send {
    type Entity: Entity;

    fn validate(&self) -> CoreResult<()> {
        Ok(())
    }

    fn unique_value(&self) -> Option<String> {
        None
    }

    fn into_fields(self) -> CoreResult<Fields>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// A predicate on a single column
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(&'static str, FieldValue),
    /// Case-insensitive equality on a text column
    EqIgnoreCase(&'static str, String),
}

/// Filter, search, sort and paging for `EntityStore::list`
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<FieldValue>) -> Self {
        self.filter(Filter::Eq(column, value.into()))
    }

    pub fn search(mut self, term: Option<String>) -> Self {
        self.search = term.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn paginate(mut self, page: Option<i64>, limit: Option<i64>) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    pub fn sort_by(mut self, column: Option<String>, order: Option<SortOrder>) -> Self {
        self.sort = column;
        self.order = order;
        self
    }

    fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: FieldValue) {
    match value {
        FieldValue::Text(v) => builder.push_bind(v),
        FieldValue::Int(v) => builder.push_bind(v),
        FieldValue::Bool(v) => builder.push_bind(v),
    };
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("%{}%", escaped)
}

fn push_where(
    builder: &mut QueryBuilder<'_, Sqlite>,
    filters: &[Filter],
    search: Option<&str>,
    search_columns: &[&'static str],
) {
    let mut first = true;
    let mut next_clause = |builder: &mut QueryBuilder<'_, Sqlite>| {
        builder.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    for filter in filters {
        next_clause(builder);
        match filter {
            Filter::Eq(column, value) => {
                builder.push(*column).push(" = ");
                push_value(builder, value.clone());
            }
            Filter::EqIgnoreCase(column, value) => {
                builder.push(*column).push(" = ");
                builder.push_bind(value.clone());
                builder.push(" COLLATE NOCASE");
            }
        }
    }

    if let Some(term) = search {
        if !search_columns.is_empty() {
            next_clause(builder);
            let pattern = escape_like(term.trim());
            builder.push("(");
            for (i, column) in search_columns.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder.push(*column).push(" LIKE ");
                builder.push_bind(pattern.clone());
                builder.push(" ESCAPE '\\'");
            }
            builder.push(")");
        }
    }
}

/// CRUD access to the table behind `E`
pub struct EntityStore<E> {
    pool: DbPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityStore<E> {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn conflict(&self) -> CoreError {
        CoreError::Conflict(format!(
            "A {} with this {} already exists",
            E::KIND.to_lowercase(),
            E::UNIQUE_KEY.unwrap_or("identifier")
        ))
    }

    fn map_write_error(&self, err: sqlx::Error) -> CoreError {
        match CoreError::from(err) {
            CoreError::Conflict(_) => self.conflict(),
            other => other,
        }
    }

    /// Validate, apply defaults and insert; returns the stored entity
    pub async fn create<N>(&self, new: N) -> CoreResult<E>
    where
        N: NewRecord<Entity = E>,
    {
        new.validate()?;

        if let Some(key) = new.unique_value() {
            if self.get_by_unique_key(&key).await?.is_some() {
                return Err(self.conflict());
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let mut fields = new.into_fields()?;
        fields.push(("id", FieldValue::from(id.clone())));
        fields.push(("created_at", FieldValue::from(now.clone())));
        fields.push(("updated_at", FieldValue::from(now)));

        let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO ");
        builder.push(E::TABLE).push(" (");
        let mut columns = builder.separated(", ");
        for (column, _) in &fields {
            columns.push(*column);
        }
        builder.push(") VALUES (");
        let mut values = builder.separated(", ");
        for (_, value) in fields {
            match value {
                FieldValue::Text(v) => values.push_bind(v),
                FieldValue::Int(v) => values.push_bind(v),
                FieldValue::Bool(v) => values.push_bind(v),
            };
        }
        builder.push(")");

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_write_error(e))?;

        tracing::debug!(table = E::TABLE, id = %id, "Record created");

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| CoreError::Persistence(format!("{} vanished after insert", E::KIND)))
    }

    pub async fn get_by_id(&self, id: &str) -> CoreResult<Option<E>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
        builder.push(E::TABLE).push(" WHERE id = ");
        builder.push_bind(id.to_string());

        Ok(builder
            .build_query_as::<E>()
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Look up by slug/email. Text columns declared `COLLATE NOCASE` compare
    /// case-insensitively.
    pub async fn get_by_unique_key(&self, key: &str) -> CoreResult<Option<E>> {
        let Some(column) = E::UNIQUE_KEY else {
            return Ok(None);
        };

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
        builder.push(E::TABLE).push(" WHERE ").push(column).push(" = ");
        builder.push_bind(key.to_string());

        Ok(builder
            .build_query_as::<E>()
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Exact count of rows matching `filters`
    pub async fn count(&self, filters: &[Filter]) -> CoreResult<i64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
        builder.push(E::TABLE);
        push_where(&mut builder, filters, None, E::SEARCH_COLUMNS);

        Ok(builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?)
    }

    /// Offset-paginated listing; `total` is counted under the same predicate
    pub async fn list(&self, query: &ListQuery) -> CoreResult<Page<E>> {
        let page = query.page();
        let limit = query.limit();
        let offset = (page - 1) * limit;
        let search = query.search.as_deref();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
        count.push(E::TABLE);
        push_where(&mut count, &query.filters, search, E::SEARCH_COLUMNS);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let sort_column = query
            .sort
            .as_deref()
            .and_then(|requested| E::SORT_COLUMNS.iter().find(|c| **c == requested))
            .copied()
            .unwrap_or(E::DEFAULT_SORT);
        let order = query.order.unwrap_or(E::DEFAULT_ORDER).as_sql();

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
        select.push(E::TABLE);
        push_where(&mut select, &query.filters, search, E::SEARCH_COLUMNS);
        select
            .push(" ORDER BY ")
            .push(sort_column)
            .push(" ")
            .push(order)
            .push(", rowid ")
            .push(order)
            .push(" LIMIT ");
        select.push_bind(limit);
        select.push(" OFFSET ");
        select.push_bind(offset);

        let items = select.build_query_as::<E>().fetch_all(&self.pool).await?;

        Ok(Page {
            items,
            pagination: Pagination::new(page, limit, total),
        })
    }

    /// Partial update. Returns `false` when no row has this id.
    pub async fn update<P>(&self, id: &str, patch: P) -> CoreResult<bool>
    where
        P: PatchRecord<Entity = E>,
    {
        self.update_if(id, &[], patch).await
    }

    /// Partial update applied only while every `guard` still holds for the
    /// row. Returns `false` when no row matched.
    pub async fn update_if<P>(&self, id: &str, guards: &[Filter], patch: P) -> CoreResult<bool>
    where
        P: PatchRecord<Entity = E>,
    {
        patch.validate()?;

        if let Some(key) = patch.unique_value() {
            if let Some(existing) = self.get_by_unique_key(&key).await? {
                if existing.id() != id {
                    return Err(self.conflict());
                }
            }
        }

        let mut fields = patch.into_fields()?;
        fields.push(("updated_at", FieldValue::from(chrono::Utc::now().to_rfc3339())));

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ");
        builder.push(E::TABLE).push(" SET ");
        for (i, (column, value)) in fields.into_iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(column).push(" = ");
            push_value(&mut builder, value);
        }
        let mut filters = vec![Filter::Eq("id", FieldValue::from(id))];
        filters.extend(guards.iter().cloned());
        push_where(&mut builder, &filters, None, &[]);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_write_error(e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Hard delete. Returns `false` when no row has this id.
    pub async fn delete(&self, id: &str) -> CoreResult<bool> {
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        builder.push(E::TABLE).push(" WHERE id = ");
        builder.push_bind(id.to_string());

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() > 0 {
            tracing::debug!(table = E::TABLE, id = %id, "Record deleted");
        }
        Ok(result.rows_affected() > 0)
    }

    /// Add one to an integer counter column without touching `updated_at`
    pub async fn increment(&self, id: &str, column: &'static str) -> CoreResult<()> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ");
        builder
            .push(E::TABLE)
            .push(" SET ")
            .push(column)
            .push(" = ")
            .push(column)
            .push(" + 1 WHERE id = ");
        builder.push_bind(id.to_string());

        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_in_memory, Category, CategoryPatch, Client, NewCategory, NewClient};

    fn new_client(name: &str, email: &str) -> NewClient {
        NewClient {
            name: name.to_string(),
            email: email.to_string(),
            company_name: Some("Acme".to_string()),
            password: None,
        }
    }

    #[test]
    fn test_pagination_pages_is_ceiling() {
        assert_eq!(Pagination::new(1, 10, 0).pages, 0);
        assert_eq!(Pagination::new(1, 10, 1).pages, 1);
        assert_eq!(Pagination::new(1, 10, 10).pages, 1);
        assert_eq!(Pagination::new(1, 10, 11).pages, 2);
        assert_eq!(Pagination::new(3, 7, 50).pages, 8);
    }

    #[test]
    fn test_list_query_clamps_page_and_limit() {
        let q = ListQuery::new().paginate(Some(0), Some(1000));
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), MAX_LIMIT);
        let q = ListQuery::new();
        assert_eq!(q.limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "%50\\%\\_off%");
        assert_eq!(escape_like("plain"), "%plain%");
    }

    #[tokio::test]
    async fn test_create_applies_defaults_and_reads_back() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<Client>::new(pool);

        let client = store.create(new_client("Ada", "ada@example.com")).await.unwrap();
        assert!(!client.id.is_empty());
        assert_eq!(client.created_at, client.updated_at);

        let fetched = store.get_by_id(&client.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "ada@example.com");
        assert!(store.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_missing_required_fields() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<Client>::new(pool);

        let err = store.create(new_client("", "ada@example.com")).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unique_key_is_case_insensitive_and_conflicts() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<Client>::new(pool);

        store.create(new_client("Ada", "ada@example.com")).await.unwrap();
        let found = store.get_by_unique_key("ADA@Example.com").await.unwrap();
        assert!(found.is_some());

        let err = store.create(new_client("Other", "Ada@Example.com")).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_paginates_with_exact_total() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<Client>::new(pool);

        for i in 0..7 {
            store
                .create(new_client(&format!("Client {}", i), &format!("c{}@example.com", i)))
                .await
                .unwrap();
        }

        let page = store
            .list(&ListQuery::new().paginate(Some(2), Some(3)))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.pagination.total, 7);
        assert_eq!(page.pagination.pages, 3);
        assert_eq!(page.pagination.page, 2);

        let last = store
            .list(&ListQuery::new().paginate(Some(3), Some(3)))
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        // Newest first by default
        assert_eq!(last.items[0].name, "Client 0");
    }

    #[tokio::test]
    async fn test_list_search_and_filters() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<Client>::new(pool);

        store.create(new_client("Ada Lovelace", "ada@example.com")).await.unwrap();
        store.create(new_client("Grace Hopper", "grace@navy.mil")).await.unwrap();

        let page = store
            .list(&ListQuery::new().search(Some("navy".into())))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Grace Hopper");

        let page = store
            .list(&ListQuery::new().filter(Filter::EqIgnoreCase("email", "ADA@EXAMPLE.COM".into())))
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);

        // Unknown sort columns fall back to the default
        let page = store
            .list(&ListQuery::new().sort_by(Some("password_hash".into()), Some(SortOrder::Asc)))
            .await
            .unwrap();
        assert_eq!(page.items[0].name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_update_is_partial_and_stamps_updated_at() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<Category>::new(pool);

        let category = store
            .create(NewCategory {
                name: "Engineering".into(),
                slug: "engineering".into(),
                description: Some("Posts about building things".into()),
            })
            .await
            .unwrap();

        let updated = store
            .update(
                &category.id,
                CategoryPatch {
                    name: Some("Software Engineering".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let fetched = store.get_by_id(&category.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Software Engineering");
        assert_eq!(fetched.slug, "engineering");
        assert_eq!(fetched.description.as_deref(), Some("Posts about building things"));
        assert!(fetched.updated_at >= category.updated_at);

        let missing = store
            .update("nope", CategoryPatch::default())
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn test_update_rejects_slug_taken_by_another_record() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<Category>::new(pool);

        store
            .create(NewCategory {
                name: "A".into(),
                slug: "a".into(),
                description: None,
            })
            .await
            .unwrap();
        let b = store
            .create(NewCategory {
                name: "B".into(),
                slug: "b".into(),
                description: None,
            })
            .await
            .unwrap();

        let err = store
            .update(
                &b.id,
                CategoryPatch {
                    slug: Some("a".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        // Re-saving its own slug is fine
        assert!(store
            .update(
                &b.id,
                CategoryPatch {
                    slug: Some("b".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_if_skips_row_when_guard_fails() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<Category>::new(pool);

        let category = store
            .create(NewCategory {
                name: "Design".into(),
                slug: "design".into(),
                description: None,
            })
            .await
            .unwrap();

        let stale = store
            .update_if(
                &category.id,
                &[Filter::Eq("slug", FieldValue::from("branding"))],
                CategoryPatch {
                    name: Some("Branding".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!stale);
        assert_eq!(store.get_by_id(&category.id).await.unwrap().unwrap().name, "Design");

        let applied = store
            .update_if(
                &category.id,
                &[Filter::Eq("slug", FieldValue::from("design"))],
                CategoryPatch {
                    name: Some("Product Design".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(
            store.get_by_id(&category.id).await.unwrap().unwrap().name,
            "Product Design"
        );
    }

    #[tokio::test]
    async fn test_delete_is_hard() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<Client>::new(pool);

        let client = store.create(new_client("Ada", "ada@example.com")).await.unwrap();
        assert!(store.delete(&client.id).await.unwrap());
        assert!(store.get_by_id(&client.id).await.unwrap().is_none());
        assert!(!store.delete(&client.id).await.unwrap());
        assert_eq!(store.count(&[]).await.unwrap(), 0);
    }
}
