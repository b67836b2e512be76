pub mod features;
pub mod io;
pub mod models;
pub mod sites;
