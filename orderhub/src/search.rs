//! Filtered Order Query Builder
//!
//! Every order query (plain listing, search, counts) is one `SELECT` over the
//! orders table joined with its lookup tables. The WHERE clause always starts
//! with the registration date range and is followed by one equality predicate
//! per constraint, joined with `AND`. Values are bound, never interpolated.

use sqlx::{QueryBuilder, Sqlite};

use crate::{
    date_window::DateWindow,
    models::{FilterField, OrderFilter},
};

pub(crate) const SELECT_ORDERS: &str = r#"
    SELECT o.id,
           t.name AS doc_type,
           k.name AS kind_of_doc,
           l.name AS doc_label,
           o.reg_date,
           o.reg_number,
           o.description,
           u.username AS author,
           o.file_original,
           o.file_copy,
           o.current
    FROM orders o
    JOIN doc_types t ON t.id = o.doc_type_id
    JOIN kinds_of_doc k ON k.id = o.kind_of_doc_id
    JOIN doc_labels l ON l.id = o.doc_label_id
    LEFT JOIN users u ON u.id = o.user_id
"#;

const COUNT_ORDERS: &str = r#"
    SELECT COUNT(*)
    FROM orders o
    JOIN doc_types t ON t.id = o.doc_type_id
    JOIN kinds_of_doc k ON k.id = o.kind_of_doc_id
    JOIN doc_labels l ON l.id = o.doc_label_id
    LEFT JOIN users u ON u.id = o.user_id
"#;

/// LIMIT/OFFSET pair of one listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit,
            offset: offset.max(0),
        }
    }
}

impl FilterField {
    pub fn column(&self) -> &'static str {
        match self {
            FilterField::DocType => "t.name",
            FilterField::KindOfDoc => "k.name",
            FilterField::DocLabel => "l.name",
            FilterField::RegNumber => "o.reg_number",
            FilterField::Description => "o.description",
            FilterField::Author => "u.username",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderQuery {
    window: DateWindow,
    predicates: Vec<(&'static str, String)>,
}

impl OrderQuery {
    pub fn new(window: DateWindow) -> Self {
        Self {
            window,
            predicates: Vec::new(),
        }
    }

    /// Restricts the query to orders authored by `owner`.
    pub fn owner(mut self, owner: Option<&str>) -> Self {
        if let Some(owner) = owner.map(str::trim).filter(|o| !o.is_empty()) {
            self.predicates
                .push((FilterField::Author.column(), owner.to_string()));
        }
        self
    }

    pub fn filter(mut self, filter: &OrderFilter) -> Self {
        self.predicates.extend(
            filter
                .supplied()
                .map(|(field, value)| (field.column(), value.to_string())),
        );
        self
    }

    pub fn predicates(&self) -> &[(&'static str, String)] {
        &self.predicates
    }

    pub fn select(&self, page: Option<Page>) -> QueryBuilder<'static, Sqlite> {
        let mut builder = QueryBuilder::new(SELECT_ORDERS);
        self.push_where(&mut builder);
        builder.push(" ORDER BY o.reg_date DESC, o.id DESC");
        if let Some(page) = page {
            builder.push(" LIMIT ");
            builder.push_bind(page.limit);
            builder.push(" OFFSET ");
            builder.push_bind(page.offset);
        }
        builder
    }

    pub fn count(&self) -> QueryBuilder<'static, Sqlite> {
        let mut builder = QueryBuilder::new(COUNT_ORDERS);
        self.push_where(&mut builder);
        builder
    }

    fn push_where(&self, builder: &mut QueryBuilder<'static, Sqlite>) {
        builder.push(" WHERE o.reg_date >= ");
        builder.push_bind(self.window.start);
        builder.push(" AND o.reg_date <= ");
        builder.push_bind(self.window.end);

        for (column, value) in &self.predicates {
            builder.push(" AND ");
            builder.push(*column);
            builder.push(" = ");
            builder.push_bind(value.clone());
        }
    }
}
