//! External service integrations and file-backed datasets.

pub mod services {
    pub use crate::services::*;
}

pub mod table_storage {
    pub use crate::table_storage::*;
}

pub mod directory {
    pub use crate::directory::*;
}
