//! Document commands
//!
//! `DOC.WRITE`, `DOC.READ`, `DOC.READALL` and `DOC.DEL` map one to one onto
//! the store operations. A missing resource or collection is a null reply
//! (or `:0` for deletes), not an error.

pub mod delete;
pub mod read;
pub mod read_all;
pub mod write;

pub use delete::DeleteCmd;
pub use read::ReadCmd;
pub use read_all::ReadAllCmd;
pub use write::WriteCmd;
