//! Database Infrastructure Layer
//!
//! Handles database connection, schema initialization, and provides
//! data access methods for users, lookup tables and orders.

use std::{ops::Deref, str::FromStr};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

use crate::{
    date_window::DateWindow,
    models::{
        CreateOrderRequest, CreateUserRequest, LookupKind, Order, OrderFilter, UpdateOrderRequest,
    },
    search::{OrderQuery, Page, SELECT_ORDERS},
    store::OrderStore,
};

#[derive(Debug)]
pub enum DatabaseError {
    Connection(sqlx::Error),
    Query(sqlx::Error),
    InvalidData(String),
    NotFound(String),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseError::Connection(err) => write!(f, "Database connection error: {}", err),
            DatabaseError::Query(err) => write!(f, "Database query error: {}", err),
            DatabaseError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatabaseError::Connection(err) | DatabaseError::Query(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::Query(err)
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

fn lookup_name(kind: LookupKind, name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DatabaseError::InvalidData(format!("{} name is empty", kind)));
    }
    Ok(name)
}

/// Database row for users table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub department: Option<String>,
    pub created_at: String,
}

/// Database row for any of the lookup tables
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LookupRow {
    pub id: i64,
    pub name: String,
}

/// Database row for orders, with lookup ids resolved to names
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub doc_type: String,
    pub kind_of_doc: String,
    pub doc_label: String,
    pub reg_date: chrono::NaiveDate,
    pub reg_number: String,
    pub description: String,
    /// Missing once the author's account is deleted
    pub author: Option<String>,
    pub file_original: String,
    pub file_copy: String,
    pub current: bool,
}

const SELECT_USERS: &str = r#"
    SELECT u.id, u.username, u.email, u.is_admin, d.name AS department, u.created_at
    FROM users u
    LEFT JOIN departments d ON d.id = u.department_id
"#;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Deref for Database {
    type Target = SqlitePool;
    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let database_config = SqliteConnectOptions::from_str(database_url)
            .map_err(DatabaseError::Connection)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_lazy_with(database_config);

        let db = Self { pool };
        db.initialize_tables().await?;

        info!("Database initialized at {}", database_url);
        Ok(db)
    }

    /// A private in-memory database. Kept on a single connection that never
    /// expires, since every SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let database_config = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DatabaseError::Connection)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(database_config)
            .await
            .map_err(DatabaseError::Connection)?;

        let db = Self { pool };
        db.initialize_tables().await?;
        Ok(db)
    }

    async fn initialize_tables(&self) -> Result<()> {
        // Lookup tables
        for kind in LookupKind::ALL {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE
                )
                "#,
                kind.table()
            ))
            .execute(&self.pool)
            .await?;
        }

        // Users table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                department_id INTEGER,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (department_id) REFERENCES departments(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Orders table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_type_id INTEGER NOT NULL,
                kind_of_doc_id INTEGER NOT NULL,
                doc_label_id INTEGER NOT NULL,
                reg_date TEXT NOT NULL,
                reg_number TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                user_id INTEGER,
                file_original TEXT NOT NULL DEFAULT '',
                file_copy TEXT NOT NULL DEFAULT '',
                current INTEGER NOT NULL DEFAULT 1,
                FOREIGN KEY (doc_type_id) REFERENCES doc_types(id),
                FOREIGN KEY (kind_of_doc_id) REFERENCES kinds_of_doc(id),
                FOREIGN KEY (doc_label_id) REFERENCES doc_labels(id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create indexes for performance
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_reg_date ON orders(reg_date)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ========== Lookup Operations ==========

    pub async fn create_lookup(&self, kind: LookupKind, name: &str) -> Result<i64> {
        let name = lookup_name(kind, name)?;

        let result = sqlx::query(&format!("INSERT INTO {} (name) VALUES (?)", kind.table()))
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Inserts `name` unless it already exists, returning its id either way.
    pub async fn ensure_lookup(&self, kind: LookupKind, name: &str) -> Result<i64> {
        let name = lookup_name(kind, name)?;

        sqlx::query(&format!(
            "INSERT INTO {} (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            kind.table()
        ))
        .bind(name)
        .execute(&self.pool)
        .await?;

        self.lookup_id(kind, name).await
    }

    pub async fn rename_lookup(&self, kind: LookupKind, id: i64, name: &str) -> Result<()> {
        let name = lookup_name(kind, name)?;

        let result = sqlx::query(&format!("UPDATE {} SET name = ? WHERE id = ?", kind.table()))
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("{} with id {} not found", kind, id)));
        }
        Ok(())
    }

    /// Fails with `InvalidData` while orders or users still reference the entry.
    pub async fn delete_lookup(&self, kind: LookupKind, id: i64) -> Result<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", kind.table()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    DatabaseError::InvalidData(format!("{} with id {} is still in use", kind, id))
                }
                e => DatabaseError::Query(e),
            })?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("{} with id {} not found", kind, id)));
        }
        Ok(())
    }

    pub async fn list_lookup(&self, kind: LookupKind) -> Result<Vec<LookupRow>> {
        sqlx::query_as::<_, LookupRow>(&format!(
            "SELECT id, name FROM {} ORDER BY name",
            kind.table()
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn lookup_id(&self, kind: LookupKind, name: &str) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as(&format!("SELECT id FROM {} WHERE name = ?", kind.table()))
                .bind(name.trim())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id,)| id)
            .ok_or_else(|| DatabaseError::InvalidData(format!("Unknown {} '{}'", kind, name)))
    }

    /// Case-insensitive substring match over a lookup table.
    ///
    /// Filtering happens here rather than in SQL because SQLite's `LOWER` only
    /// folds ASCII, and the reference values are Cyrillic.
    pub async fn suggest_lookup(&self, kind: LookupKind, fragment: &str) -> Result<Vec<LookupRow>> {
        let needle = fragment.trim().to_lowercase();
        let rows = self.list_lookup(kind).await?;

        Ok(rows
            .into_iter()
            .filter(|row| row.name.to_lowercase().contains(&needle))
            .collect())
    }

    // ========== User Operations ==========

    pub async fn create_user(&self, req: &CreateUserRequest) -> Result<i64> {
        let department_id = match req.department.as_deref() {
            Some(name) if !name.trim().is_empty() => {
                Some(self.lookup_id(LookupKind::Department, name).await?)
            }
            _ => None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, is_admin, department_id)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(req.username.trim())
        .bind(&req.email)
        .bind(req.is_admin)
        .bind(department_id)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Overwrites everything but the username.
    pub async fn update_user(&self, id: i64, req: &CreateUserRequest) -> Result<()> {
        let department_id = match req.department.as_deref() {
            Some(name) if !name.trim().is_empty() => {
                Some(self.lookup_id(LookupKind::Department, name).await?)
            }
            _ => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE users SET email = ?, is_admin = ?, department_id = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.email)
        .bind(req.is_admin)
        .bind(department_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User with id {} not found", id)));
        }
        Ok(())
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<UserRow> {
        sqlx::query_as::<_, UserRow>(&format!("{} WHERE u.username = ?", SELECT_USERS))
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    DatabaseError::NotFound(format!("User '{}' not found", username))
                }
                e => DatabaseError::Query(e),
            })
    }

    pub async fn list_users(&self) -> Result<Vec<UserRow>> {
        sqlx::query_as::<_, UserRow>(&format!("{} ORDER BY u.username", SELECT_USERS))
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User with id {} not found", id)));
        }
        Ok(())
    }

    // ========== Order Operations ==========

    pub async fn create_order(&self, req: &CreateOrderRequest, author: &str) -> Result<i64> {
        let doc_type_id = self.lookup_id(LookupKind::DocType, &req.doc_type).await?;
        let kind_of_doc_id = self.lookup_id(LookupKind::KindOfDoc, &req.kind_of_doc).await?;
        let doc_label_id = self.lookup_id(LookupKind::DocLabel, &req.doc_label).await?;
        let user_id = self.author_id(author).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO orders (doc_type_id, kind_of_doc_id, doc_label_id, reg_date, reg_number,
                                description, user_id, file_original, file_copy, current)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc_type_id)
        .bind(kind_of_doc_id)
        .bind(doc_label_id)
        .bind(req.reg_date)
        .bind(&req.reg_number)
        .bind(&req.description)
        .bind(user_id)
        .bind(&req.file_original)
        .bind(&req.file_copy)
        .bind(req.current)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_order(&self, id: i64) -> Result<OrderRow> {
        sqlx::query_as::<_, OrderRow>(&format!("{} WHERE o.id = ?", SELECT_ORDERS))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    DatabaseError::NotFound(format!("Order with id {} not found", id))
                }
                e => DatabaseError::Query(e),
            })
    }

    pub async fn update_order(&self, id: i64, req: &UpdateOrderRequest) -> Result<()> {
        let doc_type_id = self.lookup_id(LookupKind::DocType, &req.doc_type).await?;
        let kind_of_doc_id = self.lookup_id(LookupKind::KindOfDoc, &req.kind_of_doc).await?;
        let doc_label_id = self.lookup_id(LookupKind::DocLabel, &req.doc_label).await?;
        let user_id = self.author_id(&req.author).await?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                doc_type_id = ?, kind_of_doc_id = ?, doc_label_id = ?,
                reg_date = ?, reg_number = ?, description = ?, user_id = ?,
                file_original = COALESCE(?, file_original),
                file_copy = COALESCE(?, file_copy),
                current = ?
            WHERE id = ?
            "#,
        )
        .bind(doc_type_id)
        .bind(kind_of_doc_id)
        .bind(doc_label_id)
        .bind(req.reg_date)
        .bind(&req.reg_number)
        .bind(&req.description)
        .bind(user_id)
        .bind(req.file_original.as_deref().filter(|path| !path.is_empty()))
        .bind(req.file_copy.as_deref().filter(|path| !path.is_empty()))
        .bind(req.current)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Order with id {} not found", id)));
        }
        Ok(())
    }

    pub async fn delete_order(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Order with id {} not found", id)));
        }
        Ok(())
    }

    async fn author_id(&self, username: &str) -> Result<i64> {
        match self.get_user_by_username(username).await {
            Ok(user) => Ok(user.id),
            Err(DatabaseError::NotFound(_)) => Err(DatabaseError::InvalidData(format!(
                "Unknown author '{}'",
                username
            ))),
            Err(e) => Err(e),
        }
    }

    async fn fetch_orders(&self, query: OrderQuery, page: Option<Page>) -> Result<Vec<Order>> {
        let mut builder = query.select(page);
        let rows = builder
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn count(&self, query: OrderQuery) -> Result<i64> {
        let mut builder = query.count();
        let (count,) = builder
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        Ok(count)
    }
}

impl OrderStore for Database {
    async fn count_orders_in_window(&self, window: &DateWindow, owner: Option<&str>) -> Result<i64> {
        self.count(OrderQuery::new(*window).owner(owner)).await
    }

    async fn list_orders_page(
        &self,
        window: &DateWindow,
        page: Page,
        owner: Option<&str>,
    ) -> Result<Vec<Order>> {
        self.fetch_orders(OrderQuery::new(*window).owner(owner), Some(page))
            .await
    }

    async fn search_orders(
        &self,
        window: &DateWindow,
        filter: &OrderFilter,
        page: Option<Page>,
    ) -> Result<Vec<Order>> {
        self.fetch_orders(OrderQuery::new(*window).filter(filter), page)
            .await
    }

    async fn count_search_orders(&self, window: &DateWindow, filter: &OrderFilter) -> Result<i64> {
        self.count(OrderQuery::new(*window).filter(filter)).await
    }
}
