pub mod atom;
pub mod body;
pub mod cluster;
pub mod element;
pub mod ids;
pub mod tuples;
