//! Helpers for interpreting raw command replies.

use crate::db::driver::{Driver, DriverError, DriverResult};
use mongodb::bson::{Bson, Document, doc};

/// Read a numeric field regardless of its BSON width.
pub fn get_number(reply: &Document, key: &str) -> Option<i64> {
    match reply.get(key)? {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) => Some(*n as i64),
        _ => None,
    }
}

/// Fail on `writeErrors` / `writeConcernError`, which come back with `ok: 1`.
pub fn check_write_errors(reply: &Document) -> DriverResult<()> {
    if let Ok(errors) = reply.get_array("writeErrors") {
        if let Some(Bson::Document(first)) = errors.first() {
            return Err(server_error(first));
        }
    }
    if let Ok(concern) = reply.get_document("writeConcernError") {
        return Err(server_error(concern));
    }
    Ok(())
}

fn server_error(detail: &Document) -> DriverError {
    let code = get_number(detail, "code").unwrap_or_default() as i32;
    let code_name = detail.get_str("codeName").unwrap_or_default();
    let message = detail.get_str("errmsg").unwrap_or("unknown write error");
    DriverError::command(code, code_name, message)
}

/// Collect every document of a cursor reply, issuing `getMore` until the
/// server reports cursor id 0.
pub async fn drain_cursor<D: Driver + ?Sized>(
    driver: &D,
    database: &str,
    reply: Document,
) -> DriverResult<Vec<Document>> {
    let mut cursor = take_cursor(reply)?;
    let mut documents = batch(&cursor, "firstBatch");

    let collection = cursor
        .get_str("ns")
        .ok()
        .and_then(|ns| ns.split_once('.'))
        .map(|(_, coll)| coll.to_string())
        .unwrap_or_default();

    loop {
        let id = get_number(&cursor, "id").unwrap_or_default();
        if id == 0 {
            break;
        }
        let reply = driver
            .run_command(
                database,
                doc! { "getMore": id, "collection": collection.as_str() },
            )
            .await?;
        cursor = take_cursor(reply)?;
        documents.extend(batch(&cursor, "nextBatch"));
    }

    Ok(documents)
}

fn take_cursor(mut reply: Document) -> DriverResult<Document> {
    match reply.remove("cursor") {
        Some(Bson::Document(cursor)) => Ok(cursor),
        _ => Err(DriverError::other("command reply did not contain a cursor")),
    }
}

fn batch(cursor: &Document, key: &str) -> Vec<Document> {
    cursor
        .get_array(key)
        .map(|docs| {
            docs.iter()
                .filter_map(|d| d.as_document().cloned())
                .collect()
        })
        .unwrap_or_default()
}
