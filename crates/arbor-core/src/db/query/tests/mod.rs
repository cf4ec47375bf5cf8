mod translate;

use crate::{
    db::row::Row,
    key::{Key, KeyId},
};

pub(super) fn key(kind: &str, id: u64) -> Key {
    Key::new(kind, id).expect("valid key")
}

pub(super) fn person(id: u64, age: i64) -> Row {
    Row::new(key("Person", id)).with("age", age)
}

/// The three-person fixture: ages 30, 20, 40.
pub(super) fn people() -> Vec<Row> {
    vec![person(1, 30), person(2, 20), person(3, 40)]
}

pub(super) fn ids(rows: &[Row]) -> Vec<u64> {
    rows.iter()
        .map(|row| match row.key().id() {
            Some(KeyId::Id(id)) => *id,
            other => panic!("unexpected id {other:?}"),
        })
        .collect()
}
