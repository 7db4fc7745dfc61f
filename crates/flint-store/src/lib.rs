mod connection;
mod error;
mod ident;
mod param;
mod row;
mod scope;

pub use connection::{ConnectOptions, JournalMode, SqliteConnection};
pub use error::StoreError;
pub use ident::quote_identifier;
pub use param::Param;
pub use row::{Cell, DocRow};
pub use scope::SqlScope;
