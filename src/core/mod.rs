// Domain-layer modules and shared errors/models
pub mod enrichment {
    pub use crate::enrichment::*;
}

pub mod batch {
    pub use crate::batch::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod table {
    pub use crate::table::*;
}

pub mod errors {
    pub use crate::errors::*;
}
