mod import;
mod serve;

pub use import::import_polling_places;
pub use serve::serve;
