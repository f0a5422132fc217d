pub mod iter;
pub mod list;
pub mod protocol;
pub mod str;
pub mod r#type;

pub use iter::ValueIter;
pub use list::List;
pub use protocol::{ObjectProtocol, RefStack};
pub use r#type::Type;
