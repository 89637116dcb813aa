use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::command::{Command, arg_str, blocking, wrong_arity};
use crate::protocol::resp::Value;
use crate::store::Store;

/// DOC.DEL collection [resource]
///
/// Without a resource the whole collection is removed. Replies `:1` when
/// something was deleted and `:0` when nothing matched.
pub struct DeleteCmd;

#[async_trait]
impl Command for DeleteCmd {
    async fn execute(&self, args: &[Vec<u8>], store: &Arc<Store>) -> Value {
        let (collection, resource) = match args {
            [_, collection] => (arg_str(collection), String::new()),
            [_, collection, resource] => (arg_str(collection), arg_str(resource)),
            _ => return wrong_arity("doc.del"),
        };

        let result = blocking(store, move |store| match store.delete(&collection, &resource) {
            Ok(()) => Ok(1_i64),
            Err(e) if e.is_not_found() => Ok(0),
            Err(e) => Err(e),
        })
        .await;

        match result {
            Ok(count) => Value::Integer(count),
            Err(reply) => reply,
        }
    }
}
