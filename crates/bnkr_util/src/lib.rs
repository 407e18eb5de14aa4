pub mod block;
pub mod parse;

pub use block::Block;
pub use parse::{parse_int, parse_size, ParseError};
