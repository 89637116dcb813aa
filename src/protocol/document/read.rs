use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::command::{Command, arg_str, blocking, wrong_arity};
use crate::protocol::resp::Value;
use crate::store::Store;

/// DOC.READ collection resource
pub struct ReadCmd;

#[async_trait]
impl Command for ReadCmd {
    async fn execute(&self, args: &[Vec<u8>], store: &Arc<Store>) -> Value {
        let [_, collection, resource] = args else {
            return wrong_arity("doc.read");
        };
        let (collection, resource) = (arg_str(collection), arg_str(resource));

        let result = blocking(store, move |store| {
            match store.read::<serde_json::Value>(&collection, &resource) {
                Err(e) if e.is_not_found() => Ok(None),
                other => other.map(Some),
            }
        })
        .await;

        match result {
            Ok(Some(document)) => match serde_json::to_vec(&document) {
                Ok(body) => Value::bulk(body),
                Err(e) => Value::error(format!("ERR {}", e)),
            },
            // Null bulk string for resource not found
            Ok(None) => Value::BulkString(None),
            Err(reply) => reply,
        }
    }
}
