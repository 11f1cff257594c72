mod account;
mod entry;
mod money;
mod transfer;

pub use account::*;
pub use entry::*;
pub use money::*;
pub use transfer::*;
