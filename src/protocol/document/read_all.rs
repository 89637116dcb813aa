use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::command::{Command, arg_str, blocking, wrong_arity};
use crate::protocol::resp::Value;
use crate::store::Store;

/// DOC.READALL collection
///
/// Replies with the raw stored text of every resource. Order follows the
/// directory listing and is not stable.
pub struct ReadAllCmd;

#[async_trait]
impl Command for ReadAllCmd {
    async fn execute(&self, args: &[Vec<u8>], store: &Arc<Store>) -> Value {
        let [_, collection] = args else {
            return wrong_arity("doc.readall");
        };
        let collection = arg_str(collection);

        let result = blocking(store, move |store| match store.read_all(&collection) {
            Err(e) if e.is_not_found() => Ok(None),
            other => other.map(Some),
        })
        .await;

        match result {
            Ok(Some(records)) => Value::Array(Some(records.into_iter().map(Value::bulk).collect())),
            Ok(None) => Value::Array(None),
            Err(reply) => reply,
        }
    }
}
