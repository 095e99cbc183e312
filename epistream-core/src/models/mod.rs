pub mod capability;
pub mod episode;
pub mod provider;

pub use capability::*;
pub use episode::*;
pub use provider::*;
