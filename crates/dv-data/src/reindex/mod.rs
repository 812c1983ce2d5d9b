//! Reindexing against an explicit key sequence

use dv_core::{Row, Space, Value};

use crate::frame::{DataFrame, DataFrameGroup};
use crate::DataError;

fn single_key(key: &Space) -> Result<&str, DataError> {
    match key.dims() {
        [dim] => Ok(dim.as_str()),
        _ => Err(DataError::Precondition(format!(
            "reindex supports single-key data only, got {key}"
        ))),
    }
}

/// Rows of `frame` in `index` order. Keys missing from the frame become rows
/// holding the key and a null for every other field.
pub fn reindex(frame: &DataFrame, index: &[Value]) -> Result<DataFrame, DataError> {
    let dim = single_key(frame.key())?;
    let mut result = DataFrame::new(frame.key().clone());

    for key in index {
        let mut key_row = Row::new();
        key_row.insert(dim.to_string(), key.clone());

        let row = match frame.get(&key_row) {
            Some(row) => row.clone(),
            None => {
                let mut empty: Row = frame.fields().map(|field| (field.clone(), Value::Null)).collect();
                empty.insert(dim.to_string(), key.clone());
                empty
            }
        };
        result.set(row);
    }
    Ok(result)
}

/// Members of `group` in `index` order. Keys missing from the group get an
/// empty member.
pub fn reindex_group(group: &DataFrameGroup, index: &[Value]) -> Result<DataFrameGroup, DataError> {
    let dim = single_key(group.key())?;
    let mut result = DataFrameGroup::new(group.key().clone(), group.descendant_keys().to_vec());

    for key in index {
        let mut key_row = Row::new();
        key_row.insert(dim.to_string(), key.clone());
        let key_str = result.key_fn(&key_row);

        match group.get(&key_str) {
            Some(member) => result.set(key_str, member.clone()),
            None => {
                result.create_member(&key_str);
            }
        }
    }
    Ok(result)
}
