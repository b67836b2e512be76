pub mod atom;
pub mod params;
