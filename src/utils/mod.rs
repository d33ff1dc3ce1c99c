pub mod filetype;
pub mod idgen;
pub mod progress_reader;
