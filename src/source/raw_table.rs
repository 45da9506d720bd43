use rusqlite::types::ValueRef;

/// One raw row, every cell held as text in selected-column order.
///
/// SQLite columns carry no enforced type, so a numeric column can hold
/// integers, reals, or strings depending on the row. Cells are normalized to
/// `Option<String>` here and typed later by the cleaning steps.
pub type RawRow = Vec<Option<String>>;

/// SQLite value → text cell. NULL stays `None`; blobs are decoded lossily.
pub fn cell_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}
