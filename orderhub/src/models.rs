//! Domain Models
//!
//! Business entities that represent the core domain.
//! These are independent of the database layer.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::database::{LookupRow, OrderRow, UserRow};

/// An administrative document (decree, directive) tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub doc_type: String,
    pub kind_of_doc: String,
    pub doc_label: String,
    pub reg_date: NaiveDate,
    pub reg_number: String,
    pub description: String,
    pub author: String,
    pub file_original: String,
    pub file_copy: String,
    pub current: bool,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            doc_type: row.doc_type,
            kind_of_doc: row.kind_of_doc,
            doc_label: row.doc_label,
            reg_date: row.reg_date,
            reg_number: row.reg_number,
            description: row.description,
            author: row.author.unwrap_or_default(),
            file_original: row.file_original,
            file_copy: row.file_copy,
            current: row.current,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub department: Option<String>,
    pub created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            is_admin: row.is_admin,
            department: row.department,
            created_at: row.created_at,
        }
    }
}

/// The reference tables used to normalize categorical order fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookupKind {
    DocType,
    KindOfDoc,
    DocLabel,
    Department,
}

impl LookupKind {
    pub const ALL: [LookupKind; 4] = [
        LookupKind::DocType,
        LookupKind::KindOfDoc,
        LookupKind::DocLabel,
        LookupKind::Department,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            LookupKind::DocType => "doc_types",
            LookupKind::KindOfDoc => "kinds_of_doc",
            LookupKind::DocLabel => "doc_labels",
            LookupKind::Department => "departments",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::DocType => "doc-type",
            LookupKind::KindOfDoc => "kind-of-doc",
            LookupKind::DocLabel => "doc-label",
            LookupKind::Department => "department",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            LookupKind::DocType => "Тип документа",
            LookupKind::KindOfDoc => "Вид документа",
            LookupKind::DocLabel => "Пометка",
            LookupKind::Department => "Отдел",
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LookupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "doc-type" => Ok(LookupKind::DocType),
            "kind-of-doc" => Ok(LookupKind::KindOfDoc),
            "doc-label" => Ok(LookupKind::DocLabel),
            "department" => Ok(LookupKind::Department),
            _ => Err(format!("Invalid lookup table: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub id: i64,
    pub name: String,
}

impl From<LookupRow> for LookupEntry {
    fn from(row: LookupRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

/// Optional equality constraints of the order search form.
///
/// Every field left empty is unconstrained; it never means "match the empty
/// string".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderFilter {
    pub doc_type: String,
    pub kind_of_doc: String,
    pub doc_label: String,
    pub reg_number: String,
    pub description: String,
    pub author: String,
}

impl OrderFilter {
    pub fn is_empty(&self) -> bool {
        self.supplied().next().is_none()
    }

    /// The non-empty fields, in the fixed order the query composes them.
    pub fn supplied(&self) -> impl Iterator<Item = (FilterField, &str)> {
        [
            (FilterField::DocType, self.doc_type.as_str()),
            (FilterField::KindOfDoc, self.kind_of_doc.as_str()),
            (FilterField::DocLabel, self.doc_label.as_str()),
            (FilterField::RegNumber, self.reg_number.as_str()),
            (FilterField::Description, self.description.as_str()),
            (FilterField::Author, self.author.as_str()),
        ]
        .into_iter()
        .map(|(field, value)| (field, value.trim()))
        .filter(|(_, value)| !value.is_empty())
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.supplied().all(|(field, value)| field.value_of(order) == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    DocType,
    KindOfDoc,
    DocLabel,
    RegNumber,
    Description,
    Author,
}

impl FilterField {
    pub fn value_of<'a>(&self, order: &'a Order) -> &'a str {
        match self {
            FilterField::DocType => &order.doc_type,
            FilterField::KindOfDoc => &order.kind_of_doc,
            FilterField::DocLabel => &order.doc_label,
            FilterField::RegNumber => &order.reg_number,
            FilterField::Description => &order.description,
            FilterField::Author => &order.author,
        }
    }
}

// DTOs for creating entities
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub doc_type: String,
    pub kind_of_doc: String,
    pub doc_label: String,
    pub reg_date: NaiveDate,
    pub reg_number: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to the submitting user
    pub author: Option<String>,
    #[serde(default)]
    pub file_original: String,
    #[serde(default)]
    pub file_copy: String,
    #[serde(default = "default_current")]
    pub current: bool,
}

fn default_current() -> bool {
    true
}

/// Replaces every field of an order. File paths are only replaced when a new
/// one is submitted.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderRequest {
    pub doc_type: String,
    pub kind_of_doc: String,
    pub doc_label: String,
    pub reg_date: NaiveDate,
    pub reg_number: String,
    #[serde(default)]
    pub description: String,
    pub author: String,
    pub file_original: Option<String>,
    pub file_copy: Option<String>,
    pub current: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    pub department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLookupRequest {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order {
            id: 1,
            doc_type: "приказ".to_string(),
            kind_of_doc: "По личному составу".to_string(),
            doc_label: "ДСП".to_string(),
            reg_date: NaiveDate::from_ymd_opt(2023, 4, 5).unwrap(),
            reg_number: "12".to_string(),
            description: "О работе в ГИС ОГ".to_string(),
            author: "ivanova".to_string(),
            file_original: String::new(),
            file_copy: String::new(),
            current: true,
        }
    }

    #[test]
    fn test_filter_supplied_skips_blank_fields() {
        let filter = OrderFilter {
            kind_of_doc: "По личному составу".to_string(),
            reg_number: "   ".to_string(),
            author: " ivanova ".to_string(),
            ..Default::default()
        };

        let supplied: Vec<_> = filter.supplied().collect();
        assert_eq!(
            supplied,
            vec![
                (FilterField::KindOfDoc, "По личному составу"),
                (FilterField::Author, "ivanova"),
            ]
        );
        assert!(!filter.is_empty());
        assert!(OrderFilter::default().is_empty());
    }

    #[test]
    fn test_filter_matches() {
        let order = order();
        assert!(OrderFilter::default().matches(&order));

        let filter = OrderFilter {
            doc_type: "приказ".to_string(),
            ..Default::default()
        };
        assert!(filter.matches(&order));

        let filter = OrderFilter {
            doc_type: "приказ".to_string(),
            doc_label: "ПД".to_string(),
            ..Default::default()
        };
        assert!(!filter.matches(&order));
    }

    #[test]
    fn test_lookup_kind_round_trip() {
        for kind in LookupKind::ALL {
            assert_eq!(kind.as_str().parse::<LookupKind>(), Ok(kind));
        }
        assert!("orders".parse::<LookupKind>().is_err());
    }
}
