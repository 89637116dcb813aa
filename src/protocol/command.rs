use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::error::StoreError;
use crate::protocol::document::{DeleteCmd, ReadAllCmd, ReadCmd, WriteCmd};
use crate::protocol::resp::Value;
use crate::store::Store;

/// A command executor. `args[0]` is the command name as sent by the client.
#[async_trait]
pub trait Command: Send + Sync {
    async fn execute(&self, args: &[Vec<u8>], store: &Arc<Store>) -> Value;
}

/// Maps upper-cased command names to executors
pub struct CommandFactory {
    commands: HashMap<&'static str, Box<dyn Command>>,
}

impl CommandFactory {
    /// Register every supported command
    pub fn init() -> Self {
        let mut commands: HashMap<&'static str, Box<dyn Command>> = HashMap::new();
        commands.insert("PING", Box::new(PingCmd));
        commands.insert("DOC.WRITE", Box::new(WriteCmd));
        commands.insert("DOC.READ", Box::new(ReadCmd));
        commands.insert("DOC.READALL", Box::new(ReadAllCmd));
        commands.insert("DOC.DEL", Box::new(DeleteCmd));
        Self { commands }
    }

    /// Parse and execute a RESP command frame against the store
    pub async fn execute(&self, value: Value, store: &Arc<Store>) -> Value {
        let args = match command_args(value) {
            Some(args) => args,
            None => return Value::error("ERR failed to parse command"),
        };

        let name = String::from_utf8_lossy(&args[0]).to_uppercase();
        match self.commands.get(name.as_str()) {
            Some(cmd) => cmd.execute(&args, store).await,
            None => Value::error(format!("ERR unknown command '{}'", name)),
        }
    }
}

/// Flatten a command frame into its string arguments
fn command_args(value: Value) -> Option<Vec<Vec<u8>>> {
    let items = match value {
        Value::Array(Some(items)) if !items.is_empty() => items,
        _ => return None,
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::BulkString(Some(data)) => Some(data),
            Value::SimpleString(s) => Some(s.into_bytes()),
            _ => None,
        })
        .collect()
}

/// Lossy UTF-8 view of an argument
pub(crate) fn arg_str(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

pub(crate) fn wrong_arity(name: &str) -> Value {
    Value::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_lowercase()
    ))
}

pub(crate) fn error_reply(err: &StoreError) -> Value {
    Value::error(format!("ERR {}", err))
}

/// Run a store call on the blocking pool, turning failures into replies
pub(crate) async fn blocking<T, F>(store: &Arc<Store>, f: F) -> Result<T, Value>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || f(&store)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(error_reply(&e)),
        Err(e) => {
            error!("store task failed: {}", e);
            Err(Value::error("ERR internal error"))
        }
    }
}

/// PING [message]
pub struct PingCmd;

#[async_trait]
impl Command for PingCmd {
    async fn execute(&self, args: &[Vec<u8>], _store: &Arc<Store>) -> Value {
        match args {
            [_] => Value::SimpleString("PONG".to_string()),
            [_, message] => Value::bulk(message.clone()),
            _ => wrong_arity("ping"),
        }
    }
}
