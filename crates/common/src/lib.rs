//! Common types shared across the live sheet dashboard services.

pub mod models;

pub use models::{
    ColumnValue, CustomColumn, SheetSnapshot, SheetTable, TableId, User, UserId,
};
