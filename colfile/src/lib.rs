use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod common;
pub mod encoder;
pub mod schema;
pub mod table;
pub mod view;
