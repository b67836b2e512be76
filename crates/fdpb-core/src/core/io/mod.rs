pub mod deck;
pub mod pdb;
pub mod util;
