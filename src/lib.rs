pub mod conv;
pub mod error;
pub mod expr;
pub mod grammar;
pub mod oracle;
pub mod parse;
pub mod point;
pub mod search;
pub mod synth;
pub mod tree;
