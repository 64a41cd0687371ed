//! Demo data: the reference values every registry starts with, plus random
//! orders spread over 2019-2021.

use chrono::{Days, NaiveDate};
use orderhub::{CreateOrderRequest, CreateUserRequest, Database, DatabaseError, LookupKind};
use rand::{Rng, seq::IndexedRandom};
use tracing::info;

const DOC_TYPES: [&str; 3] = ["приказ", "распоряжение", "постановление"];

const KINDS_OF_DOC: [&str; 3] = [
    "По основной (профильной) деятельности",
    "По личному составу",
    "По административно-хозяйственным вопросам",
];

const DOC_LABELS: [&str; 3] = ["ПД", "ДСП", "Свободный доступ (для общего пользования)"];

const DESCRIPTION: &str = "О работе в ГИС ОГ";

/// Inserts the reference values and `count` random orders authored by
/// `author`, creating that user when missing. Returns the number of orders.
pub async fn seed(db: &Database, author: &str, count: usize) -> Result<usize, DatabaseError> {
    for (kind, names) in [
        (LookupKind::DocType, &DOC_TYPES),
        (LookupKind::KindOfDoc, &KINDS_OF_DOC),
        (LookupKind::DocLabel, &DOC_LABELS),
    ] {
        for name in names {
            db.ensure_lookup(kind, name).await?;
        }
    }

    if let Err(DatabaseError::NotFound(_)) = db.get_user_by_username(author).await {
        let req = CreateUserRequest {
            username: author.to_string(),
            email: format!("{}@localhost", author),
            is_admin: false,
            department: None,
        };
        db.create_user(&req).await?;
        info!(username = author, "Created seed author");
    }

    let orders = random_orders(&mut rand::rng(), count);
    for order in &orders {
        db.create_order(order, author).await?;
    }

    info!(count = orders.len(), author, "Seeded orders");
    Ok(orders.len())
}

fn random_orders(rng: &mut impl Rng, count: usize) -> Vec<CreateOrderRequest> {
    let first = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default();
    let span = NaiveDate::from_ymd_opt(2021, 12, 31)
        .unwrap_or_default()
        .signed_duration_since(first)
        .num_days() as u64;

    (0..count)
        .map(|_| CreateOrderRequest {
            doc_type: pick(rng, &DOC_TYPES),
            kind_of_doc: pick(rng, &KINDS_OF_DOC),
            doc_label: pick(rng, &DOC_LABELS),
            reg_date: first + Days::new(rng.random_range(0..=span)),
            reg_number: rng.random_range(0..900).to_string(),
            description: DESCRIPTION.to_string(),
            author: None,
            file_original: String::new(),
            file_copy: String::new(),
            current: true,
        })
        .collect()
}

fn pick(rng: &mut impl Rng, values: &[&str]) -> String {
    values.choose(rng).copied().unwrap_or_default().to_string()
}
