use std::collections::HashMap;
use std::future::Future;

use validator::ValidationErrors;

/// Validate a dto, check a uniqueness precondition, then insert.
/// The duplicate error `e` is returned when `find_unique` hits.
/// Injected closures take owned values so their futures borrow nothing
/// from this frame.
pub async fn create<T, DTO, E, FA, FB>(
    validate: impl FnOnce(&DTO) -> Result<(), E>,
    find_unique: impl FnOnce(T) -> FA,
    insert: impl FnOnce(T) -> FB,
    mapper: impl FnOnce(&DTO) -> T,
    dto: &DTO,
    e: E,
) -> Result<T, E>
where
    T: Clone,
    FA: Future<Output = Result<Option<T>, E>>,
    FB: Future<Output = Result<(), E>>,
{
    validate(dto)?;
    let item = mapper(dto);
    let maybe_existing = find_unique(item.clone()).await?;
    match maybe_existing {
        Some(_) => Err(e),
        None => {
            insert(item.clone()).await?;
            Ok(item)
        }
    }
}

/// Fetch-or-insert under the caller's transaction. The bool reports whether
/// the row was newly created.
pub async fn get_or_create<T, E, FA, FB>(
    find: impl FnOnce() -> FA,
    insert: impl FnOnce(T) -> FB,
    make: impl FnOnce() -> T,
) -> Result<(T, bool), E>
where
    T: Clone,
    FA: Future<Output = Result<Option<T>, E>>,
    FB: Future<Output = Result<(), E>>,
{
    match find().await? {
        Some(existing) => Ok((existing, false)),
        None => {
            let item = make();
            insert(item.clone()).await?;
            Ok((item, true))
        }
    }
}

pub fn field_names_without_id(fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .map(|x| x.to_string())
        .filter(|x| x != "id")
        .collect()
}

/// Flattens `validator` output into field -> joined-messages, the shape the
/// *Invalid error variants carry to callers.
pub fn hash_map_from_validation_errors(e: ValidationErrors) -> HashMap<String, String> {
    e.field_errors()
        .into_iter()
        .map(|(field, msgs)| {
            let msg = msgs.iter().fold("".to_string(), |acc, x| {
                if acc.is_empty() {
                    x.to_string()
                } else {
                    format!("{}, {}", acc, x)
                }
            });
            (field.to_string(), msg)
        })
        .collect()
}

pub fn hash_map_to_string(hash_map: HashMap<String, String>) -> String {
    hash_map.into_iter().fold("".to_string(), |acc, (k, v)| {
        let new_msg = format!("{}: {}", k, v);
        if acc.is_empty() {
            new_msg
        } else {
            format!("{}, {}", acc, new_msg)
        }
    })
}
