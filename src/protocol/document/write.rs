use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::command::{Command, arg_str, blocking, wrong_arity};
use crate::protocol::resp::Value;
use crate::store::Store;

/// Parameters for DOC.WRITE
#[derive(Debug, Clone, PartialEq)]
pub struct WriteParams {
    pub collection: String,
    pub resource: String,
    pub document: serde_json::Value,
}

impl WriteParams {
    /// Parse `DOC.WRITE collection resource json`
    fn parse(args: &[Vec<u8>]) -> Result<Self, Value> {
        let [_, collection, resource, body] = args else {
            return Err(wrong_arity("doc.write"));
        };

        let document = serde_json::from_slice(body)
            .map_err(|e| Value::error(format!("ERR invalid json: {}", e)))?;

        Ok(WriteParams {
            collection: arg_str(collection),
            resource: arg_str(resource),
            document,
        })
    }
}

/// DOC.WRITE command executor
pub struct WriteCmd;

#[async_trait]
impl Command for WriteCmd {
    async fn execute(&self, args: &[Vec<u8>], store: &Arc<Store>) -> Value {
        let params = match WriteParams::parse(args) {
            Ok(params) => params,
            Err(reply) => return reply,
        };

        let result = blocking(store, move |store| {
            store.write(&params.collection, &params.resource, &params.document)
        })
        .await;

        match result {
            Ok(()) => Value::ok(),
            Err(reply) => reply,
        }
    }
}
