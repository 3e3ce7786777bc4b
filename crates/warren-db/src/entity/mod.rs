mod account;
mod bunny;
mod ztamp;

pub use account::{Account, AccountRecord, DEFAULT_ACCESS};
pub use bunny::{Bunny, BunnyRecord};
pub use ztamp::{Ztamp, ZtampRecord};
